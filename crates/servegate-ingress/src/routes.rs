//! VirtualService compilation
//!
//! Builds the desired Istio VirtualService for an InferenceService. Every
//! route forwards to the shared local gateway service and rewrites the
//! `Host` header to the in-cluster hostname of the backing component, so the
//! gateway (not this document) picks the workload.
//!
//! Route order matters, first match wins:
//! 1. explain route (explainer configured), matching the explain URI regex
//! 2. catch-all predict route
//! 3. path-template route (path template configured), public gateway only

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use servegate_common::config::{DeployConfig, IngressConfig};
use servegate_common::crd::{
    ComponentType, Condition, ConditionStatus, Headers, HttpMatchRequest, HttpRewrite, HttpRoute,
    HttpRouteDestination, InferenceService, StringMatch, VirtualService, VirtualServiceSpec,
    INGRESS_READY,
};
use servegate_common::naming::{
    backend_service_name, ingress_not_created_reason, CLUSTER_LOCAL_VISIBILITY,
    COMMON_DEFAULT_HTTP_PORT, EXPLAIN_PREFIX, ISTIO_MESH_GATEWAY, VISIBILITY_LABEL,
};
use servegate_common::network::{host_regexp, service_hostname};
use servegate_common::template::generate_url_path;
use servegate_common::Error;

use crate::domains::additional_hosts;
use crate::equality::match_request_equals;

/// Result of compiling the desired VirtualService
#[derive(Debug)]
pub enum DesiredIngress {
    /// All required components are ready
    Ready(Box<VirtualService>),
    /// A required component is not ready; carries the IngressReady condition to record
    ComponentNotReady(Condition),
    /// The path template could not be rendered
    PathTemplateFailed(Error),
}

/// Compile the VirtualService for `isvc`
///
/// `service_host` is the resolved public host, `use_default` selects the
/// legacy `-default` backend names and `known_domains` are the cluster's
/// base ingress domains.
pub fn build_virtual_service(
    isvc: &InferenceService,
    service_host: &str,
    use_default: bool,
    config: &IngressConfig,
    known_domains: &[String],
    deploy: &DeployConfig,
) -> DesiredIngress {
    if let Some(condition) = readiness_blocker(isvc) {
        return DesiredIngress::ComponentNotReady(condition);
    }

    let name = isvc.name_any();
    let namespace = isvc.namespace().unwrap_or_default();
    let internal_host = service_hostname(&name, &namespace);
    let is_internal = is_cluster_local(isvc) || service_host == internal_host;

    let backend_host = service_hostname(
        &backend_service_name(&name, isvc.routed_component(), use_default),
        &namespace,
    );
    let extra_hosts = if is_internal {
        Vec::new()
    } else {
        additional_hosts(known_domains, service_host, config)
    };

    let mut http = Vec::new();
    if isvc.has_explainer() {
        let explainer_host = service_hostname(
            &backend_service_name(&name, ComponentType::Explainer, use_default),
            &namespace,
        );
        http.push(gateway_route(
            match_requests(
                Some(StringMatch::Regex(EXPLAIN_PREFIX.to_string())),
                service_host,
                &internal_host,
                &extra_hosts,
                is_internal,
                config,
            ),
            explainer_host,
            config,
        ));
    }
    http.push(gateway_route(
        match_requests(None, service_host, &internal_host, &extra_hosts, is_internal, config),
        backend_host.clone(),
        config,
    ));

    let mut hosts = vec![internal_host];
    let mut gateways = vec![config.local_gateway.clone(), ISTIO_MESH_GATEWAY.to_string()];
    if !is_internal {
        hosts.push(service_host.to_string());
        gateways.push(config.ingress_gateway.clone());
    }

    if config.has_path_template() {
        let path = match generate_url_path(&name, &namespace, config) {
            Ok(path) => path,
            Err(e) => return DesiredIngress::PathTemplateFailed(e),
        };
        http.push(path_template_route(&path, backend_host, config));
        push_unique(&mut hosts, config.ingress_domain.clone());
    }

    if !is_internal {
        let mut seen: HashSet<String> = hosts.iter().cloned().collect();
        for host in extra_hosts {
            if seen.insert(host.clone()) {
                hosts.push(host);
            }
        }
    }

    let annotations = isvc
        .metadata
        .annotations
        .as_ref()
        .map(|annotations| deploy.filter_annotations(annotations))
        .filter(|annotations| !annotations.is_empty());

    DesiredIngress::Ready(Box::new(VirtualService {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: isvc.metadata.labels.clone(),
            annotations,
            ..Default::default()
        },
        spec: VirtualServiceSpec {
            hosts,
            gateways,
            http,
            unmodeled: BTreeMap::new(),
        },
    }))
}

/// IngressReady condition for the first required component that is not ready
///
/// The routed component (transformer when configured, predictor otherwise)
/// is checked first, then the explainer when configured.
pub fn readiness_blocker(isvc: &InferenceService) -> Option<Condition> {
    let mut required = vec![isvc.routed_component()];
    if isvc.has_explainer() {
        required.push(ComponentType::Explainer);
    }

    let status = isvc.status.as_ref();
    required.into_iter().find_map(|component| {
        let condition_type = component.ready_condition();
        if status.is_some_and(|s| s.is_condition_ready(condition_type)) {
            return None;
        }
        let unknown = status.map_or(true, |s| s.is_condition_unknown(condition_type));
        let condition_status = if unknown {
            ConditionStatus::Unknown
        } else {
            ConditionStatus::False
        };
        Some(
            Condition::new(INGRESS_READY, condition_status)
                .with_reason(ingress_not_created_reason(component)),
        )
    })
}

/// True when the visibility label restricts the service to the mesh
pub fn is_cluster_local(isvc: &InferenceService) -> bool {
    isvc.labels()
        .get(VISIBILITY_LABEL)
        .is_some_and(|v| v == CLUSTER_LOCAL_VISIBILITY)
}

/// Match predicates for one route
///
/// The internal host always matches under the local and mesh gateways. For
/// public services the target host and every additional host also match
/// under the ingress gateway; additional hosts equal to an existing
/// predicate are not repeated.
fn match_requests(
    uri: Option<StringMatch>,
    target_host: &str,
    internal_host: &str,
    extra_hosts: &[String],
    is_internal: bool,
    config: &IngressConfig,
) -> Vec<HttpMatchRequest> {
    let mut matches = vec![HttpMatchRequest {
        uri: uri.clone(),
        authority: Some(StringMatch::Regex(host_regexp(internal_host))),
        gateways: vec![config.local_gateway.clone(), ISTIO_MESH_GATEWAY.to_string()],
        ..Default::default()
    }];
    if is_internal {
        return matches;
    }

    matches.push(public_match(uri.clone(), target_host, config));
    for host in extra_hosts {
        let candidate = public_match(uri.clone(), host, config);
        if !matches.iter().any(|m| match_request_equals(m, &candidate)) {
            matches.push(candidate);
        }
    }
    matches
}

fn public_match(uri: Option<StringMatch>, host: &str, config: &IngressConfig) -> HttpMatchRequest {
    HttpMatchRequest {
        uri,
        authority: Some(StringMatch::Regex(host_regexp(host))),
        gateways: vec![config.ingress_gateway.clone()],
        ..Default::default()
    }
}

fn gateway_route(
    matches: Vec<HttpMatchRequest>,
    host_header: String,
    config: &IngressConfig,
) -> HttpRoute {
    HttpRoute {
        match_: matches,
        route: vec![HttpRouteDestination::to_service(
            config.local_gateway_service_name.clone(),
            COMMON_DEFAULT_HTTP_PORT,
        )],
        headers: Some(Headers::set_host(host_header)),
        ..Default::default()
    }
}

/// Route for `{ingressDomain}{path}`: prefix `path/` and exact `path`, rewritten to `/`
fn path_template_route(path: &str, host_header: String, config: &IngressConfig) -> HttpRoute {
    let path = path.strip_suffix('/').unwrap_or(path);
    let authority = StringMatch::Regex(host_regexp(&config.ingress_domain));
    let path_match = |uri: StringMatch| HttpMatchRequest {
        uri: Some(uri),
        authority: Some(authority.clone()),
        gateways: vec![config.ingress_gateway.clone()],
        ..Default::default()
    };

    HttpRoute {
        match_: vec![
            path_match(StringMatch::Prefix(format!("{}/", path))),
            path_match(StringMatch::Exact(path.to_string())),
        ],
        rewrite: Some(HttpRewrite {
            uri: "/".to_string(),
            ..Default::default()
        }),
        ..gateway_route(Vec::new(), host_header, config)
    }
}

fn push_unique(hosts: &mut Vec<String>, host: String) {
    if !hosts.contains(&host) {
        hosts.push(host);
    }
}
