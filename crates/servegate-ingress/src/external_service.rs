//! ExternalName alias Service
//!
//! Every routed InferenceService gets a Service of the same name that
//! aliases the shared local gateway, so `{name}.{namespace}.svc` resolves
//! inside the cluster and lands on the VirtualService.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use servegate_common::config::IngressConfig;
use servegate_common::crd::InferenceService;
use servegate_common::Error;
use tracing::{debug, info};

use crate::client::IngressKubeClient;
use crate::equality::string_map_equals;

/// Service type of the alias
pub const EXTERNAL_NAME_TYPE: &str = "ExternalName";

/// Session affinity of the alias
pub const SESSION_AFFINITY_NONE: &str = "None";

/// Desired alias Service, owned by the InferenceService
pub fn desired_external_service(
    isvc: &InferenceService,
    config: &IngressConfig,
) -> Result<Service, Error> {
    let owner = isvc.controller_owner_ref(&()).ok_or_else(|| {
        Error::internal_with_context(
            "external_service",
            format!("InferenceService {} has no uid", isvc.name_any()),
        )
    })?;

    Ok(Service {
        metadata: ObjectMeta {
            name: Some(isvc.name_any()),
            namespace: isvc.namespace(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(EXTERNAL_NAME_TYPE.to_string()),
            external_name: Some(config.local_gateway_service_name.clone()),
            session_affinity: Some(SESSION_AFFINITY_NONE.to_string()),
            ..Default::default()
        }),
        status: None,
    })
}

/// Create the alias Service, or bring an existing one back to the desired state
pub async fn reconcile_external_service<C: IngressKubeClient + ?Sized>(
    client: &C,
    isvc: &InferenceService,
    config: &IngressConfig,
) -> Result<(), Error> {
    let desired = desired_external_service(isvc, config)?;
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    let Some(mut existing) = client.get_service(&name, &namespace).await? else {
        info!(%namespace, %name, "creating external name service");
        return client.create_service(&desired).await;
    };

    if external_service_equals(&desired, &existing) {
        debug!(%namespace, %name, "external name service up to date");
        return Ok(());
    }

    let diff = describe_drift(&desired, &existing);
    info!(%namespace, %name, %diff, "updating external name service");
    existing.spec = desired.spec;
    existing.metadata.labels = desired.metadata.labels;
    existing.metadata.annotations = desired.metadata.annotations;
    client
        .update_service(&existing)
        .await
        .map_err(|e| e.wrap("fails to update external name service"))
}

/// Compare the fields the alias owns: type, target, session affinity, labels, annotations
///
/// Fields the API server fills in on its own (cluster IPs, ports, traffic
/// policies) are ignored.
pub fn external_service_equals(desired: &Service, existing: &Service) -> bool {
    owned_spec_fields(desired) == owned_spec_fields(existing)
        && string_map_equals(
            desired.metadata.labels.as_ref(),
            existing.metadata.labels.as_ref(),
        )
        && string_map_equals(
            desired.metadata.annotations.as_ref(),
            existing.metadata.annotations.as_ref(),
        )
}

fn owned_spec_fields(service: &Service) -> [Option<&str>; 3] {
    let spec = service.spec.as_ref();
    [
        spec.and_then(|s| s.type_.as_deref()),
        spec.and_then(|s| s.external_name.as_deref()),
        spec.and_then(|s| s.session_affinity.as_deref()),
    ]
}

/// Human readable list of owned fields that differ, `field: desired -> observed`
pub fn describe_drift(desired: &Service, existing: &Service) -> String {
    const FIELDS: [&str; 3] = ["spec.type", "spec.externalName", "spec.sessionAffinity"];

    let mut changes: Vec<String> = FIELDS
        .iter()
        .zip(owned_spec_fields(desired).into_iter().zip(owned_spec_fields(existing)))
        .filter(|(_, (want, have))| want != have)
        .map(|(field, (want, have))| format!("{}: {:?} -> {:?}", field, want, have))
        .collect();

    for (field, want, have) in [
        ("metadata.labels", &desired.metadata.labels, &existing.metadata.labels),
        (
            "metadata.annotations",
            &desired.metadata.annotations,
            &existing.metadata.annotations,
        ),
    ] {
        if !string_map_equals(want.as_ref(), have.as_ref()) {
            changes.push(format!(
                "{}: {:?} -> {:?}",
                field,
                want.as_ref().unwrap_or(&BTreeMap::new()),
                have.as_ref().unwrap_or(&BTreeMap::new())
            ));
        }
    }

    changes.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockIngressKubeClient;
    use servegate_common::crd::InferenceServiceSpec;

    const GATEWAY_SERVICE: &str = "knative-local-gateway.istio-system.svc.cluster.local";

    fn isvc() -> InferenceService {
        let mut isvc = InferenceService::new("iris", InferenceServiceSpec::default());
        isvc.metadata.namespace = Some("ns".to_string());
        isvc.metadata.uid = Some("uid-1234".to_string());
        isvc
    }

    fn config() -> IngressConfig {
        IngressConfig {
            local_gateway_service_name: GATEWAY_SERVICE.to_string(),
            ..IngressConfig::default()
        }
    }

    /// The desired Service as the API server would return it
    fn live(desired: &Service) -> Service {
        let mut live = desired.clone();
        live.metadata.resource_version = Some("7".to_string());
        if let Some(spec) = live.spec.as_mut() {
            spec.internal_traffic_policy = Some("Cluster".to_string());
        }
        live
    }

    #[test]
    fn desired_alias_points_at_local_gateway() {
        let svc = desired_external_service(&isvc(), &config()).expect("desired service");
        let spec = svc.spec.expect("spec should be set");
        assert_eq!(svc.metadata.name.as_deref(), Some("iris"));
        assert_eq!(svc.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(spec.type_.as_deref(), Some("ExternalName"));
        assert_eq!(spec.external_name.as_deref(), Some(GATEWAY_SERVICE));
        assert_eq!(spec.session_affinity.as_deref(), Some("None"));

        let owner = &svc.metadata.owner_references.expect("owner reference")[0];
        assert_eq!(owner.kind, "InferenceService");
        assert_eq!(owner.uid, "uid-1234");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn missing_uid_is_an_error() {
        let mut isvc = isvc();
        isvc.metadata.uid = None;
        assert!(desired_external_service(&isvc, &config()).is_err());
    }

    #[test]
    fn server_defaults_are_not_drift() {
        let desired = desired_external_service(&isvc(), &config()).expect("desired service");
        assert!(external_service_equals(&desired, &live(&desired)));
    }

    #[test]
    fn drift_names_changed_fields() {
        let desired = desired_external_service(&isvc(), &config()).expect("desired service");
        let mut existing = live(&desired);
        if let Some(spec) = existing.spec.as_mut() {
            spec.external_name = Some("elsewhere.svc.cluster.local".to_string());
        }
        existing
            .labels_mut()
            .insert("team".to_string(), "ml".to_string());

        assert!(!external_service_equals(&desired, &existing));
        let diff = describe_drift(&desired, &existing);
        assert!(diff.contains("spec.externalName"), "{}", diff);
        assert!(diff.contains("metadata.labels"), "{}", diff);
        assert!(!diff.contains("spec.type"), "{}", diff);
    }

    #[tokio::test]
    async fn creates_missing_alias() {
        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service().returning(|_, _| Ok(None));
        mock.expect_create_service()
            .withf(|svc| svc.name_any() == "iris")
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_update_service().never();

        reconcile_external_service(&mock, &isvc(), &config())
            .await
            .expect("reconcile should succeed");
    }

    #[tokio::test]
    async fn up_to_date_alias_is_left_alone() {
        let desired = desired_external_service(&isvc(), &config()).expect("desired service");
        let existing = live(&desired);

        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service()
            .returning(move |_, _| Ok(Some(existing.clone())));
        mock.expect_create_service().never();
        mock.expect_update_service().never();

        reconcile_external_service(&mock, &isvc(), &config())
            .await
            .expect("reconcile should succeed");
    }

    #[tokio::test]
    async fn drifted_alias_is_updated_in_place() {
        let desired = desired_external_service(&isvc(), &config()).expect("desired service");
        let mut existing = live(&desired);
        if let Some(spec) = existing.spec.as_mut() {
            spec.external_name = Some("old-gateway".to_string());
        }

        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service()
            .returning(move |_, _| Ok(Some(existing.clone())));
        mock.expect_update_service()
            .withf(|svc| {
                svc.metadata.resource_version.as_deref() == Some("7")
                    && svc.spec.as_ref().and_then(|s| s.external_name.as_deref())
                        == Some(GATEWAY_SERVICE)
            })
            .times(1)
            .returning(|_| Ok(()));

        reconcile_external_service(&mock, &isvc(), &config())
            .await
            .expect("reconcile should succeed");
    }

    #[tokio::test]
    async fn fetch_error_is_propagated() {
        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service()
            .returning(|_, _| Err(Error::internal_with_context("kube", "connection refused")));
        mock.expect_create_service().never();

        assert!(reconcile_external_service(&mock, &isvc(), &config())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn create_failure_is_propagated() {
        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service().returning(|_, _| Ok(None));
        mock.expect_create_service()
            .times(1)
            .returning(|_| Err(Error::internal_with_context("kube", "admission denied")));
        mock.expect_update_service().never();

        let err = reconcile_external_service(&mock, &isvc(), &config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("admission denied"));
    }

    #[tokio::test]
    async fn update_failure_is_wrapped() {
        let desired = desired_external_service(&isvc(), &config()).expect("desired service");
        let mut existing = live(&desired);
        existing.metadata.labels = Some(BTreeMap::from([("a".to_string(), "b".to_string())]));

        let mut mock = MockIngressKubeClient::new();
        mock.expect_get_service()
            .returning(move |_, _| Ok(Some(existing.clone())));
        mock.expect_update_service()
            .returning(|_| Err(Error::internal_with_context("kube", "conflict")));

        let err = reconcile_external_service(&mock, &isvc(), &config())
            .await
            .unwrap_err();
        assert_eq!(err.context(), Some("fails to update external name service"));
    }
}
