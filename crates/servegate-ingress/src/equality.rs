//! Semantic equality for VirtualServices
//!
//! The reconciler only writes when the desired and the live VirtualService
//! differ in a field this controller owns. Equality is spelled out field by
//! field instead of relying on derived `PartialEq`, so the rules are fixed:
//!
//! - list order is significant (hosts, gateways, routes, match predicates)
//! - an absent map and an empty map are equal (labels, annotations, header sets)
//! - an absent `headers`/`rewrite` and an empty one are equal
//! - fields the builder never sets but that exist on the live object are
//!   compared too, so foreign edits show up as drift

use std::collections::BTreeMap;

use servegate_common::crd::{
    Destination, HeaderOperations, Headers, HttpMatchRequest, HttpRewrite, HttpRoute,
    HttpRouteDestination, StringMatch, VirtualService, VirtualServiceSpec,
};

/// Fields a live object carries beyond what the builder models
type Unmodeled = BTreeMap<String, serde_json::Value>;

/// True when `existing` already matches `desired` in spec, labels and annotations
pub fn route_semantic_equals(desired: &VirtualService, existing: &VirtualService) -> bool {
    spec_equals(&desired.spec, &existing.spec)
        && string_map_equals(
            desired.metadata.labels.as_ref(),
            existing.metadata.labels.as_ref(),
        )
        && string_map_equals(
            desired.metadata.annotations.as_ref(),
            existing.metadata.annotations.as_ref(),
        )
}

/// Field-by-field VirtualService spec equality
pub fn spec_equals(a: &VirtualServiceSpec, b: &VirtualServiceSpec) -> bool {
    a.hosts == b.hosts
        && a.gateways == b.gateways
        && slice_equals(&a.http, &b.http, http_route_equals)
        && a.unmodeled == b.unmodeled
}

fn http_route_equals(a: &HttpRoute, b: &HttpRoute) -> bool {
    slice_equals(&a.match_, &b.match_, |x, y| {
        match_request_equals(x, y) && x.unmodeled == y.unmodeled
    }) && slice_equals(&a.route, &b.route, route_destination_equals)
        && rewrite_equals(a.rewrite.as_ref(), b.rewrite.as_ref())
        && headers_equals(a.headers.as_ref(), b.headers.as_ref())
        && a.unmodeled == b.unmodeled
}

/// Two match predicates are equal iff authority, gateways and URI are equal
///
/// This is the identity used to deduplicate predicates while building routes;
/// drift comparison additionally checks the predicate's unmodeled fields.
pub fn match_request_equals(a: &HttpMatchRequest, b: &HttpMatchRequest) -> bool {
    string_match_equals(a.authority.as_ref(), b.authority.as_ref())
        && a.gateways == b.gateways
        && string_match_equals(a.uri.as_ref(), b.uri.as_ref())
}

/// Both absent, or the same kind of matcher with the same value
pub fn string_match_equals(a: Option<&StringMatch>, b: Option<&StringMatch>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(StringMatch::Exact(x)), Some(StringMatch::Exact(y))) => x == y,
        (Some(StringMatch::Prefix(x)), Some(StringMatch::Prefix(y))) => x == y,
        (Some(StringMatch::Regex(x)), Some(StringMatch::Regex(y))) => x == y,
        _ => false,
    }
}

fn route_destination_equals(a: &HttpRouteDestination, b: &HttpRouteDestination) -> bool {
    destination_equals(&a.destination, &b.destination)
        && a.weight == b.weight
        && a.unmodeled == b.unmodeled
}

fn destination_equals(a: &Destination, b: &Destination) -> bool {
    a.host == b.host
        && a.port.as_ref().map(|p| p.number) == b.port.as_ref().map(|p| p.number)
        && map_equals(port_unmodeled(a), port_unmodeled(b))
        && a.unmodeled == b.unmodeled
}

fn port_unmodeled(destination: &Destination) -> Option<&Unmodeled> {
    destination.port.as_ref().map(|p| &p.unmodeled)
}

fn rewrite_equals(a: Option<&HttpRewrite>, b: Option<&HttpRewrite>) -> bool {
    rewrite_uri(a) == rewrite_uri(b)
        && map_equals(a.map(|r| &r.unmodeled), b.map(|r| &r.unmodeled))
}

fn rewrite_uri(rewrite: Option<&HttpRewrite>) -> &str {
    rewrite.map(|r| r.uri.as_str()).unwrap_or_default()
}

fn headers_equals(a: Option<&Headers>, b: Option<&Headers>) -> bool {
    let request_a = request_operations(a);
    let request_b = request_operations(b);
    string_map_equals(request_a.map(|r| &r.set), request_b.map(|r| &r.set))
        && map_equals(request_a.map(|r| &r.unmodeled), request_b.map(|r| &r.unmodeled))
        && map_equals(a.map(|h| &h.unmodeled), b.map(|h| &h.unmodeled))
}

fn request_operations(headers: Option<&Headers>) -> Option<&HeaderOperations> {
    headers.and_then(|h| h.request.as_ref())
}

/// Map equality where an absent map equals an empty one
pub fn string_map_equals(
    a: Option<&BTreeMap<String, String>>,
    b: Option<&BTreeMap<String, String>>,
) -> bool {
    map_equals(a, b)
}

fn map_equals<V: PartialEq>(
    a: Option<&BTreeMap<String, V>>,
    b: Option<&BTreeMap<String, V>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (Some(m), None) | (None, Some(m)) => m.is_empty(),
        (None, None) => true,
    }
}

fn slice_equals<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(authority: &str) -> HttpRoute {
        HttpRoute {
            match_: vec![HttpMatchRequest {
                uri: None,
                authority: Some(StringMatch::Regex(authority.to_string())),
                gateways: vec!["mesh".to_string()],
                ..Default::default()
            }],
            route: vec![HttpRouteDestination::to_service("gw.istio-system.svc.cluster.local", 80)],
            headers: Some(Headers::set_host("iris-predictor.ns.svc.cluster.local")),
            ..Default::default()
        }
    }

    fn virtual_service(routes: Vec<HttpRoute>) -> VirtualService {
        VirtualService::new(
            "iris",
            VirtualServiceSpec {
                hosts: vec!["iris.ns.svc.cluster.local".to_string()],
                gateways: vec!["mesh".to_string()],
                http: routes,
                unmodeled: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn identical_documents_are_equal() {
        let a = virtual_service(vec![route("^a$")]);
        assert!(route_semantic_equals(&a, &a.clone()));
    }

    #[test]
    fn route_order_matters() {
        let a = virtual_service(vec![route("^a$"), route("^b$")]);
        let b = virtual_service(vec![route("^b$"), route("^a$")]);
        assert!(!route_semantic_equals(&a, &b));
    }

    #[test]
    fn empty_labels_equal_absent_labels() {
        let a = virtual_service(vec![route("^a$")]);
        let mut b = a.clone();
        b.metadata.labels = Some(BTreeMap::new());
        b.metadata.annotations = Some(BTreeMap::new());
        assert!(route_semantic_equals(&a, &b));

        b.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert("team".to_string(), "ml".to_string());
        assert!(!route_semantic_equals(&a, &b));
    }

    #[test]
    fn server_side_metadata_is_ignored() {
        let a = virtual_service(vec![route("^a$")]);
        let mut b = a.clone();
        b.metadata.resource_version = Some("42".to_string());
        b.metadata.uid = Some("uid-1".to_string());
        assert!(route_semantic_equals(&a, &b));
    }

    #[test]
    fn foreign_route_fields_are_drift() {
        let a = virtual_service(vec![route("^a$")]);
        let mut b = a.clone();
        b.spec.http[0]
            .unmodeled
            .insert("timeout".to_string(), serde_json::json!("30s"));
        assert!(!route_semantic_equals(&a, &b));
    }

    #[test]
    fn matcher_kind_is_significant() {
        assert!(!string_match_equals(
            Some(&StringMatch::Prefix("/a".to_string())),
            Some(&StringMatch::Exact("/a".to_string())),
        ));
        assert!(string_match_equals(None, None));
        assert!(!string_match_equals(None, Some(&StringMatch::Regex("^a$".to_string()))));
    }

    #[test]
    fn empty_header_set_equals_no_headers() {
        let empty = Headers {
            request: Some(HeaderOperations::default()),
            ..Default::default()
        };
        assert!(headers_equals(None, Some(&empty)));
        assert!(!headers_equals(None, Some(&Headers::set_host("x"))));
    }

    #[test]
    fn match_requests_compare_gateways() {
        let a = HttpMatchRequest {
            uri: None,
            authority: Some(StringMatch::Regex("^a$".to_string())),
            gateways: vec!["mesh".to_string()],
            ..Default::default()
        };
        let mut b = a.clone();
        assert!(match_request_equals(&a, &b));
        b.gateways.push("knative-serving/knative-ingress-gateway".to_string());
        assert!(!match_request_equals(&a, &b));
    }

    #[test]
    fn nested_foreign_fields_are_drift() {
        let desired = virtual_service(vec![route("^a$")]);
        let mut live = serde_json::to_value(&desired).expect("serialize virtual service");
        live["spec"]["http"][0]["match"][0]["ignoreUriCase"] = serde_json::json!(true);
        live["spec"]["http"][0]["match"][0]["headers"] =
            serde_json::json!({"x-user": {"exact": "admin"}});
        live["spec"]["http"][0]["route"][0]["destination"]["subset"] = serde_json::json!("v2");
        live["spec"]["http"][0]["headers"]["request"]["add"] = serde_json::json!({"x-a": "1"});
        live["spec"]["http"][0]["headers"]["response"] = serde_json::json!({"set": {"x-b": "2"}});

        let live: VirtualService = serde_json::from_value(live).expect("deserialize live");
        assert!(!route_semantic_equals(&desired, &live));

        let round_tripped: VirtualService =
            serde_json::from_value(serde_json::to_value(&desired).expect("serialize"))
                .expect("deserialize");
        assert!(route_semantic_equals(&desired, &round_tripped));
    }

    #[test]
    fn each_nested_edit_is_drift_on_its_own() {
        let desired = virtual_service(vec![route("^a$")]);
        let edits: [fn(&mut HttpRoute); 5] = [
            |r| {
                r.match_[0]
                    .unmodeled
                    .insert("ignoreUriCase".to_string(), serde_json::json!(true));
            },
            |r| {
                r.route[0]
                    .destination
                    .unmodeled
                    .insert("subset".to_string(), serde_json::json!("v2"));
            },
            |r| {
                r.route[0]
                    .unmodeled
                    .insert("mirror".to_string(), serde_json::json!({"host": "m"}));
            },
            |r| {
                if let Some(headers) = r.headers.as_mut() {
                    headers
                        .unmodeled
                        .insert("response".to_string(), serde_json::json!({"set": {}}));
                }
            },
            |r| {
                if let Some(request) = r.headers.as_mut().and_then(|h| h.request.as_mut()) {
                    request
                        .unmodeled
                        .insert("remove".to_string(), serde_json::json!(["x-a"]));
                }
            },
        ];
        for edit in edits {
            let mut live = desired.clone();
            edit(&mut live.spec.http[0]);
            assert!(!route_semantic_equals(&desired, &live));
        }
    }

    #[test]
    fn dedup_identity_ignores_unmodeled_fields() {
        let a = HttpMatchRequest {
            authority: Some(StringMatch::Regex("^a$".to_string())),
            gateways: vec!["mesh".to_string()],
            ..Default::default()
        };
        let mut b = a.clone();
        b.unmodeled
            .insert("ignoreUriCase".to_string(), serde_json::json!(true));
        assert!(match_request_equals(&a, &b));
    }
}
