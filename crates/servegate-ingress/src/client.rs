//! Cluster access for the ingress reconciler

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, DynamicObject, PostParams};
use kube::{Client, Resource, ResourceExt};
use servegate_common::config::{
    domain_config_namespace, domains_from_config_map, DOMAIN_CONFIG_MAP_NAME,
};
use servegate_common::crd::VirtualService;
use servegate_common::kube_utils::knative_service_api_resource;
use servegate_common::Error;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting the Kubernetes operations the ingress reconciler needs
///
/// Getters return `Ok(None)` for objects that do not exist. Updates replace
/// the whole object and are rejected with a conflict when its
/// `resourceVersion` is stale.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IngressKubeClient: Send + Sync {
    /// Get a VirtualService by name and namespace
    async fn get_virtual_service(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<VirtualService>, Error>;

    /// Create a VirtualService
    async fn create_virtual_service(&self, vs: &VirtualService) -> Result<(), Error>;

    /// Replace an existing VirtualService
    async fn update_virtual_service(&self, vs: &VirtualService) -> Result<(), Error>;

    /// Get a core Service by name and namespace
    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error>;

    /// Create a core Service
    async fn create_service(&self, service: &Service) -> Result<(), Error>;

    /// Replace an existing core Service
    async fn update_service(&self, service: &Service) -> Result<(), Error>;

    /// Check whether a Knative Service exists
    async fn knative_service_exists(&self, name: &str, namespace: &str) -> Result<bool, Error>;

    /// Base ingress domains known to the cluster, sorted
    async fn list_ingress_domains(&self) -> Result<Vec<String>, Error>;
}

/// Real Kubernetes client implementation
pub struct IngressKubeClientImpl {
    client: Client,
}

impl IngressKubeClientImpl {
    /// Create a new IngressKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespace_of<K: Resource>(obj: &K) -> Result<String, Error> {
        obj.meta().namespace.clone().ok_or_else(|| {
            Error::validation_for_field(
                "metadata.namespace",
                format!("{} has no namespace", obj.meta().name.as_deref().unwrap_or_default()),
            )
        })
    }
}

#[async_trait]
impl IngressKubeClient for IngressKubeClientImpl {
    async fn get_virtual_service(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<VirtualService>, Error> {
        let api: Api<VirtualService> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await.map_err(Error::from) {
            Ok(vs) => Ok(Some(vs)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_virtual_service(&self, vs: &VirtualService) -> Result<(), Error> {
        let namespace = Self::namespace_of(vs)?;
        let api: Api<VirtualService> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), vs).await?;
        Ok(())
    }

    async fn update_virtual_service(&self, vs: &VirtualService) -> Result<(), Error> {
        let namespace = Self::namespace_of(vs)?;
        let api: Api<VirtualService> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&vs.name_any(), &PostParams::default(), vs).await?;
        Ok(())
    }

    async fn get_service(&self, name: &str, namespace: &str) -> Result<Option<Service>, Error> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await.map_err(Error::from) {
            Ok(svc) => Ok(Some(svc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_service(&self, service: &Service) -> Result<(), Error> {
        let namespace = Self::namespace_of(service)?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn update_service(&self, service: &Service) -> Result<(), Error> {
        let namespace = Self::namespace_of(service)?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&service.name_any(), &PostParams::default(), service)
            .await?;
        Ok(())
    }

    async fn knative_service_exists(&self, name: &str, namespace: &str) -> Result<bool, Error> {
        let ar = knative_service_api_resource();
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn list_ingress_domains(&self) -> Result<Vec<String>, Error> {
        let api: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &domain_config_namespace());
        Ok(api
            .get_opt(DOMAIN_CONFIG_MAP_NAME)
            .await?
            .map(|cm| domains_from_config_map(&cm))
            .unwrap_or_default())
    }
}
