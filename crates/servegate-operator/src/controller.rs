//! InferenceService controller
//!
//! Runs the ingress reconciler for each InferenceService event and persists
//! the resulting status through the status subresource.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use servegate_common::config::OperatorConfig;
use servegate_common::crd::{InferenceService, InferenceServiceStatus};
use servegate_common::{Error, FIELD_MANAGER};
use servegate_ingress::{IngressKubeClientImpl, IngressOutcome, IngressReconciler};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

/// Requeue interval for skipped services and retryable errors
pub const REQUEUE_INTERVAL: Duration = Duration::from_secs(30);

/// Trait abstracting InferenceService status writes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusKubeClient: Send + Sync {
    /// Merge-patch the status of an InferenceService
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &InferenceServiceStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct StatusKubeClientImpl {
    client: Client,
}

impl StatusKubeClientImpl {
    /// Create a new StatusKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusKubeClient for StatusKubeClientImpl {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &InferenceServiceStatus,
    ) -> Result<(), Error> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

/// Shared controller state
pub struct Context {
    /// Status writer
    pub status: Arc<dyn StatusKubeClient>,
    /// Ingress reconciler
    pub ingress: IngressReconciler,
}

impl Context {
    /// Build the context from a kube client and the loaded configuration
    pub fn from_client(client: Client, config: OperatorConfig) -> Self {
        Self {
            status: Arc::new(StatusKubeClientImpl::new(client.clone())),
            ingress: IngressReconciler::new(
                Arc::new(IngressKubeClientImpl::new(client)),
                config.ingress,
                config.deploy,
            ),
        }
    }
}

/// Reconcile one InferenceService
///
/// The status is patched only when the ingress reconciler changed it, also
/// when the reconciler failed after recording a condition.
#[instrument(skip(isvc, ctx), fields(isvc = %isvc.name_any()))]
pub async fn reconcile(isvc: Arc<InferenceService>, ctx: Arc<Context>) -> Result<Action, Error> {
    if ctx.ingress.ingress_config().disable_ingress_creation {
        debug!("ingress creation disabled");
        return Ok(Action::await_change());
    }

    let mut updated = (*isvc).clone();
    let result = ctx.ingress.reconcile(&mut updated).await;

    if updated.status != isvc.status {
        if let Some(status) = updated.status.as_ref() {
            let namespace = isvc.namespace().unwrap_or_default();
            info!(url = ?status.url, "publishing status");
            ctx.status
                .patch_status(&isvc.name_any(), &namespace, status)
                .await?;
        }
    }

    match result? {
        IngressOutcome::Reconciled => Ok(Action::await_change()),
        IngressOutcome::Skipped => Ok(Action::requeue(REQUEUE_INTERVAL)),
    }
}

/// Error policy for the controller
pub fn error_policy(isvc: Arc<InferenceService>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(isvc = %isvc.name_any(), "stale object on write, requeueing");
        return Action::requeue(REQUEUE_INTERVAL);
    }

    error!(
        ?error,
        isvc = %isvc.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(REQUEUE_INTERVAL)
    } else {
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use servegate_common::config::{DeployConfig, IngressConfig};
    use servegate_common::crd::{
        ComponentStatus, ComponentType, Condition, ConditionStatus, InferenceServiceSpec,
        INGRESS_READY, PREDICTOR_READY,
    };
    use servegate_ingress::IngressKubeClient;

    /// Cluster where the alias and the VirtualService are created on demand
    struct EmptyCluster;

    #[async_trait]
    impl IngressKubeClient for EmptyCluster {
        async fn get_virtual_service(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<servegate_common::crd::VirtualService>, Error> {
            Ok(None)
        }
        async fn create_virtual_service(
            &self,
            _: &servegate_common::crd::VirtualService,
        ) -> Result<(), Error> {
            Ok(())
        }
        async fn update_virtual_service(
            &self,
            _: &servegate_common::crd::VirtualService,
        ) -> Result<(), Error> {
            Ok(())
        }
        async fn get_service(&self, _: &str, _: &str) -> Result<Option<Service>, Error> {
            Ok(None)
        }
        async fn create_service(&self, _: &Service) -> Result<(), Error> {
            Ok(())
        }
        async fn update_service(&self, _: &Service) -> Result<(), Error> {
            Ok(())
        }
        async fn knative_service_exists(&self, _: &str, _: &str) -> Result<bool, Error> {
            Ok(false)
        }
        async fn list_ingress_domains(&self) -> Result<Vec<String>, Error> {
            Ok(Vec::new())
        }
    }

    fn ingress_config() -> IngressConfig {
        IngressConfig {
            ingress_gateway: "knative-serving/knative-ingress-gateway".to_string(),
            local_gateway: "knative-serving/knative-local-gateway".to_string(),
            local_gateway_service_name: "knative-local-gateway.istio-system.svc.cluster.local"
                .to_string(),
            ..IngressConfig::default()
        }
    }

    fn context(status: MockStatusKubeClient, ingress: IngressConfig) -> Arc<Context> {
        Arc::new(Context {
            status: Arc::new(status),
            ingress: IngressReconciler::new(Arc::new(EmptyCluster), ingress, DeployConfig::default()),
        })
    }

    fn isvc(predictor_ready: bool) -> Arc<InferenceService> {
        let mut isvc = InferenceService::new("iris", InferenceServiceSpec::default());
        isvc.metadata.namespace = Some("ns".to_string());
        isvc.metadata.uid = Some("uid-1".to_string());
        let status = isvc.status_mut();
        status.conditions.push(Condition::new(
            PREDICTOR_READY,
            if predictor_ready {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            },
        ));
        status.components.insert(
            ComponentType::Predictor,
            ComponentStatus {
                url: Some("http://iris-predictor.ns.example.com".to_string()),
                ..Default::default()
            },
        );
        Arc::new(isvc)
    }

    #[tokio::test]
    async fn reconciled_service_publishes_status_and_waits() {
        let mut status = MockStatusKubeClient::new();
        status
            .expect_patch_status()
            .withf(|name, ns, status| {
                name == "iris"
                    && ns == "ns"
                    && status.url.as_deref() == Some("http://iris.ns.example.com")
                    && status.is_condition_ready(INGRESS_READY)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(isvc(true), context(status, ingress_config()))
            .await
            .expect("reconcile should succeed");
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn unready_service_records_condition_and_requeues() {
        let mut status = MockStatusKubeClient::new();
        status
            .expect_patch_status()
            .withf(|_, _, status| {
                status
                    .condition(INGRESS_READY)
                    .is_some_and(|c| c.status == ConditionStatus::False)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(isvc(false), context(status, ingress_config()))
            .await
            .expect("reconcile should succeed");
        assert_eq!(action, Action::requeue(REQUEUE_INTERVAL));
    }

    #[tokio::test]
    async fn unchanged_status_is_not_patched() {
        let mut ready = (*isvc(false)).clone();
        ready.status_mut().conditions.push(
            Condition::new(INGRESS_READY, ConditionStatus::False)
                .with_reason("Predictor ingress not created"),
        );

        let mut status = MockStatusKubeClient::new();
        status.expect_patch_status().never();

        reconcile(Arc::new(ready), context(status, ingress_config()))
            .await
            .expect("reconcile should succeed");
    }

    #[tokio::test]
    async fn disabled_ingress_creation_does_nothing() {
        let mut status = MockStatusKubeClient::new();
        status.expect_patch_status().never();
        let config = IngressConfig {
            disable_ingress_creation: true,
            ..ingress_config()
        };

        let action = reconcile(isvc(true), context(status, config))
            .await
            .expect("reconcile should succeed");
        assert_eq!(action, Action::await_change());
    }

    #[test]
    fn permanent_errors_wait_for_change() {
        let status = MockStatusKubeClient::new();
        let ctx = context(status, ingress_config());
        let err = Error::validation_for_field("ingress", "bad config");
        assert_eq!(error_policy(isvc(true), &err, ctx.clone()), Action::await_change());

        let err = Error::internal_with_context("status", "apiserver unavailable");
        assert_eq!(error_policy(isvc(true), &err, ctx), Action::requeue(REQUEUE_INTERVAL));
    }

    #[test]
    fn wrapped_conflicts_are_requeued() {
        let status = MockStatusKubeClient::new();
        let ctx = context(status, ingress_config());
        let err = Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }))
        .wrap("fails to create or update ingress");
        assert_eq!(error_policy(isvc(true), &err, ctx), Action::requeue(REQUEUE_INTERVAL));
    }
}
