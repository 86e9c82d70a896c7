//! Istio VirtualService wire types
//!
//! `networking.istio.io/v1beta1 VirtualService`, reduced to the fields the
//! ingress route builder produces. Anything else found on a live object is
//! kept in `unmodeled` so that semantic equality can see it as drift instead
//! of silently dropping it on deserialization.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// VirtualService spec: hosts, gateways and ordered HTTP routes
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "networking.istio.io",
    version = "v1beta1",
    kind = "VirtualService",
    plural = "virtualservices",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Hostnames this document applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Gateways (and `mesh`) the routes are bound to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// HTTP routes, first match wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// One route rule of a VirtualService
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Match predicates; any one matching selects this route
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub match_: Vec<HttpMatchRequest>,

    /// Weighted backend destinations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,

    /// URI rewrite applied before forwarding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<HttpRewrite>,

    /// Header manipulation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// Request match predicate
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    /// URI matcher; absent matches any path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,

    /// Authority (Host header) matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<StringMatch>,

    /// Gateways this predicate applies under
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// String matcher, serialized as `{"exact": ..}`, `{"prefix": ..}` or `{"regex": ..}`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StringMatch {
    /// Exact string match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// RE2 regular expression match
    Regex(String),
}

/// Weighted destination
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteDestination {
    /// Backend service
    pub destination: Destination,

    /// Share of traffic (0-100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// Backend service address
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Service hostname
    pub host: String,

    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// Port selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PortSelector {
    /// Port number
    pub number: u32,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// URI rewrite
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HttpRewrite {
    /// Replacement URI (prefix)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// Header operations
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Headers {
    /// Operations on the request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderOperations>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

/// Header set operations
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HeaderOperations {
    /// Headers to overwrite
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,

    /// Fields present on the live object that the builder never sets
    #[serde(flatten)]
    pub unmodeled: BTreeMap<String, serde_json::Value>,
}

impl Headers {
    /// Headers that force the request `Host` header to the given value
    pub fn set_host(host: impl Into<String>) -> Self {
        let mut set = BTreeMap::new();
        set.insert("Host".to_string(), host.into());
        Self {
            request: Some(HeaderOperations {
                set,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl HttpRouteDestination {
    /// A single destination carrying all traffic
    pub fn to_service(host: impl Into<String>, port: u32) -> Self {
        Self {
            destination: Destination {
                host: host.into(),
                port: Some(PortSelector {
                    number: port,
                    ..Default::default()
                }),
                ..Default::default()
            },
            weight: Some(100),
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_serializes_to_istio_wire_shape() {
        let route = HttpRoute {
            match_: vec![HttpMatchRequest {
                uri: Some(StringMatch::Prefix("/serving/ns/iris/".to_string())),
                authority: Some(StringMatch::Regex("^example\\.com(:[0-9]{1,5})?$".to_string())),
                gateways: vec!["knative-serving/knative-ingress-gateway".to_string()],
                ..Default::default()
            }],
            route: vec![HttpRouteDestination::to_service(
                "knative-local-gateway.istio-system.svc.cluster.local",
                80,
            )],
            rewrite: Some(HttpRewrite {
                uri: "/".to_string(),
                ..Default::default()
            }),
            headers: Some(Headers::set_host("iris-predictor.ns.svc.cluster.local")),
            unmodeled: BTreeMap::new(),
        };

        let json = serde_json::to_value(&route).expect("serialize route");
        assert_eq!(json["match"][0]["uri"]["prefix"], "/serving/ns/iris/");
        assert!(json["match"][0]["authority"]["regex"].is_string());
        assert_eq!(json["route"][0]["destination"]["port"]["number"], 80);
        assert_eq!(json["route"][0]["weight"], 100);
        assert_eq!(json["rewrite"]["uri"], "/");
        assert_eq!(
            json["headers"]["request"]["set"]["Host"],
            "iris-predictor.ns.svc.cluster.local"
        );
    }

    #[test]
    fn unknown_route_fields_are_captured() {
        let json = serde_json::json!({
            "match": [{"authority": {"regex": "^a$"}, "gateways": ["mesh"]}],
            "route": [{"destination": {"host": "gw", "port": {"number": 80}}, "weight": 100}],
            "timeout": "30s"
        });
        let route: HttpRoute = serde_json::from_value(json).expect("deserialize route");
        assert_eq!(route.unmodeled.get("timeout"), Some(&serde_json::json!("30s")));
        assert!(route.match_[0].uri.is_none());
    }

    #[test]
    fn unknown_nested_fields_are_captured() {
        let json = serde_json::json!({
            "match": [{"authority": {"regex": "^a$"}, "ignoreUriCase": true}],
            "route": [{
                "destination": {"host": "gw", "subset": "v2", "port": {"number": 80}},
                "weight": 100
            }],
            "headers": {
                "request": {"set": {"Host": "a"}, "add": {"x-user": "admin"}},
                "response": {"set": {"x-served-by": "b"}}
            }
        });
        let route: HttpRoute = serde_json::from_value(json).expect("deserialize route");
        assert_eq!(
            route.match_[0].unmodeled.get("ignoreUriCase"),
            Some(&serde_json::json!(true))
        );
        assert_eq!(
            route.route[0].destination.unmodeled.get("subset"),
            Some(&serde_json::json!("v2"))
        );
        let headers = route.headers.expect("headers");
        assert!(headers.unmodeled.contains_key("response"));
        assert!(headers.request.expect("request").unmodeled.contains_key("add"));
    }

    #[test]
    fn virtual_service_has_istio_api_version() {
        let vs = VirtualService::new("iris", VirtualServiceSpec::default());
        let json = serde_json::to_value(&vs).expect("serialize virtual service");
        assert_eq!(json["apiVersion"], "networking.istio.io/v1beta1");
        assert_eq!(json["kind"], "VirtualService");
    }
}
