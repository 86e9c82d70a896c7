//! Ingress reconciliation for one InferenceService
//!
//! One call resolves the public host and URL, compiles and applies the
//! VirtualService (plus the ExternalName alias) when virtual hosts are
//! enabled, and publishes status. Nothing is cached between calls; every run
//! reads fresh state. Writes never retry: conflicts and API failures are
//! returned so the controller can requeue.

use std::sync::Arc;

use kube::{Resource, ResourceExt};
use servegate_common::config::{DeployConfig, IngressConfig};
use servegate_common::crd::{ComponentType, InferenceService, VirtualService};
use servegate_common::naming::default_component_service_name;
use servegate_common::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::client::IngressKubeClient;
use crate::equality::route_semantic_equals;
use crate::external_service::reconcile_external_service;
use crate::host::{service_host, service_url};
use crate::routes::{build_virtual_service, DesiredIngress};
use crate::status::{host_prefix, publish_status};

/// Terminal state of one reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Nothing to publish yet: no URL, a component not ready, or a broken path template
    Skipped,
    /// Routing applied (when enabled) and status published
    Reconciled,
}

/// Result of an existence check used only to pick the backend naming convention
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// The probed object exists
    Exists,
    /// The probed object does not exist
    Absent,
    /// The check failed; treated as absent
    Indeterminate,
}

impl Probe {
    fn from_result(result: Result<bool, Error>, kind: &str, name: &str) -> Self {
        match result {
            Ok(true) => Probe::Exists,
            Ok(false) => Probe::Absent,
            Err(e) => {
                warn!(error = %e, %kind, %name, "naming probe failed, assuming legacy names are not in use");
                Probe::Indeterminate
            }
        }
    }

    /// True only when the object was seen
    pub fn exists(self) -> bool {
        self == Probe::Exists
    }
}

/// Reconciles the ingress of InferenceServices
pub struct IngressReconciler {
    client: Arc<dyn IngressKubeClient>,
    ingress: IngressConfig,
    deploy: DeployConfig,
}

impl IngressReconciler {
    /// Create a reconciler over the given client and configuration
    pub fn new(client: Arc<dyn IngressKubeClient>, ingress: IngressConfig, deploy: DeployConfig) -> Self {
        Self {
            client,
            ingress,
            deploy,
        }
    }

    /// Ingress configuration in use
    pub fn ingress_config(&self) -> &IngressConfig {
        &self.ingress
    }

    /// Reconcile routing for `isvc` and update its status in place
    ///
    /// The caller persists `isvc.status` afterwards. A `Skipped` outcome may
    /// still have recorded an `IngressReady` condition naming the component
    /// that is not ready.
    #[instrument(
        skip(self, isvc),
        fields(namespace = %isvc.namespace().unwrap_or_default(), name = %isvc.name_any())
    )]
    pub async fn reconcile(&self, isvc: &mut InferenceService) -> Result<IngressOutcome, Error> {
        let (Some(host), Some(url)) = (service_host(isvc), service_url(isvc, &self.ingress)) else {
            debug!("service host or url not resolved yet");
            return Ok(IngressOutcome::Skipped);
        };

        let prefix = if self.ingress.disable_istio_virtual_host {
            let use_default = self.probe_default_service(isvc).await.exists();
            host_prefix(isvc, true, use_default)
        } else {
            let use_default = self.probe_default_knative_service(isvc).await.exists();
            let domains = self.known_domains().await;
            let desired = match build_virtual_service(
                isvc,
                &host,
                use_default,
                &self.ingress,
                &domains,
                &self.deploy,
            ) {
                DesiredIngress::Ready(vs) => *vs,
                DesiredIngress::ComponentNotReady(condition) => {
                    debug!(reason = ?condition.reason, "ingress not created");
                    isvc.status_mut().set_condition(condition);
                    return Ok(IngressOutcome::Skipped);
                }
                DesiredIngress::PathTemplateFailed(e) => {
                    error!(error = %e, "failed to generate URL from path template");
                    return Ok(IngressOutcome::Skipped);
                }
            };

            reconcile_external_service(self.client.as_ref(), isvc, &self.ingress)
                .await
                .map_err(|e| e.wrap("fails to reconcile external name service"))?;

            let desired = with_controller_owner(desired, isvc)
                .map_err(|e| e.wrap("fails to set owner reference for ingress"))?;

            self.apply_virtual_service(desired)
                .await
                .map_err(|e| e.wrap("fails to create or update ingress"))?;

            host_prefix(isvc, false, false)
        };

        publish_status(isvc, &url, &prefix)?;
        Ok(IngressOutcome::Reconciled)
    }

    /// Create the VirtualService, or replace the live one when it drifted
    async fn apply_virtual_service(&self, desired: VirtualService) -> Result<(), Error> {
        let name = desired.name_any();
        let namespace = desired.namespace().unwrap_or_default();

        match self.client.get_virtual_service(&name, &namespace).await? {
            None => {
                info!(%namespace, %name, "creating ingress");
                self.client.create_virtual_service(&desired).await
            }
            Some(existing) if route_semantic_equals(&desired, &existing) => {
                debug!(%namespace, %name, "ingress up to date");
                Ok(())
            }
            Some(mut existing) => {
                info!(%namespace, %name, "updating ingress");
                existing.spec = desired.spec;
                existing.metadata.labels = desired.metadata.labels;
                existing.metadata.annotations = desired.metadata.annotations;
                self.client.update_virtual_service(&existing).await
            }
        }
    }

    /// Knative Service `{name}-predictor-default`, the marker of legacy naming
    async fn probe_default_knative_service(&self, isvc: &InferenceService) -> Probe {
        let name = default_component_service_name(&isvc.name_any(), ComponentType::Predictor);
        let namespace = isvc.namespace().unwrap_or_default();
        let result = self.client.knative_service_exists(&name, &namespace).await;
        Probe::from_result(result, "knative service", &name)
    }

    /// Core Service `{name}-predictor-default`, the marker of legacy naming without Knative
    async fn probe_default_service(&self, isvc: &InferenceService) -> Probe {
        let name = default_component_service_name(&isvc.name_any(), ComponentType::Predictor);
        let namespace = isvc.namespace().unwrap_or_default();
        let result = self
            .client
            .get_service(&name, &namespace)
            .await
            .map(|svc| svc.is_some());
        Probe::from_result(result, "service", &name)
    }

    async fn known_domains(&self) -> Vec<String> {
        match self.client.list_ingress_domains().await {
            Ok(domains) => domains,
            Err(e) => {
                warn!(error = %e, "failed to read ingress domains, skipping additional hosts");
                Vec::new()
            }
        }
    }
}

fn with_controller_owner(
    mut vs: VirtualService,
    isvc: &InferenceService,
) -> Result<VirtualService, Error> {
    let owner = isvc.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "virtual_service",
            format!("InferenceService {} has no uid", isvc.name_any()),
        )
    })?;
    vs.metadata.owner_references = Some(vec![owner]);
    Ok(vs)
}
