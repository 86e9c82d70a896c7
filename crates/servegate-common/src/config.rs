//! Operator configuration
//!
//! Ingress and deploy settings are read from the `inferenceservice-config`
//! ConfigMap, where each section is stored as a JSON document under its own
//! key (`ingress`, `deploy`). Known ingress domains come from Knative's
//! `config-domain` ConfigMap, whose keys are the domains.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Name of the ConfigMap holding operator configuration
pub const INFERENCE_SERVICE_CONFIG_MAP_NAME: &str = "inferenceservice-config";

/// Namespace of the operator ConfigMap when `POD_NAMESPACE` is unset
pub const DEFAULT_CONFIG_NAMESPACE: &str = "kserve";

/// Environment variable naming the operator's own namespace
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// ConfigMap key holding the ingress section
pub const INGRESS_CONFIG_KEY: &str = "ingress";

/// ConfigMap key holding the deploy section
pub const DEPLOY_CONFIG_KEY: &str = "deploy";

/// Name of Knative's domain ConfigMap
pub const DOMAIN_CONFIG_MAP_NAME: &str = "config-domain";

/// Namespace of the domain ConfigMap when `SYSTEM_NAMESPACE` is unset
pub const DEFAULT_KNATIVE_SERVING_NAMESPACE: &str = "knative-serving";

/// Environment variable overriding the domain ConfigMap namespace
pub const SYSTEM_NAMESPACE_ENV: &str = "SYSTEM_NAMESPACE";

fn default_url_scheme() -> String {
    "http".to_string()
}

fn default_ingress_domain() -> String {
    "example.com".to_string()
}

/// Ingress settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Public ingress gateway (`namespace/name`)
    #[serde(default)]
    pub ingress_gateway: String,

    /// Local (cluster-internal) gateway (`namespace/name`)
    #[serde(default)]
    pub local_gateway: String,

    /// Hostname of the local gateway service every route forwards to
    #[serde(default, rename = "localGatewayService")]
    pub local_gateway_service_name: String,

    /// Hostname of Knative's local gateway service
    #[serde(default, rename = "knativeLocalGatewayService")]
    pub knative_local_gateway_service: String,

    /// Domain serving path-based URLs
    #[serde(default = "default_ingress_domain")]
    pub ingress_domain: String,

    /// Extra domains each external host is also published under
    #[serde(default)]
    pub additional_ingress_domains: Vec<String>,

    /// Template for external hostnames, owned by the component controllers
    #[serde(default)]
    pub domain_template: String,

    /// Scheme of published URLs
    #[serde(default = "default_url_scheme")]
    pub url_scheme: String,

    /// Publish component URLs directly instead of a synthesized virtual host
    #[serde(default)]
    pub disable_istio_virtual_host: bool,

    /// Template for path-based URLs (e.g. `/serving/{{ .Namespace }}/{{ .Name }}`)
    #[serde(default)]
    pub path_template: String,

    /// Skip ingress reconciliation entirely
    #[serde(default)]
    pub disable_ingress_creation: bool,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            ingress_gateway: String::new(),
            local_gateway: String::new(),
            local_gateway_service_name: String::new(),
            knative_local_gateway_service: String::new(),
            ingress_domain: default_ingress_domain(),
            additional_ingress_domains: Vec::new(),
            domain_template: String::new(),
            url_scheme: default_url_scheme(),
            disable_istio_virtual_host: false,
            path_template: String::new(),
            disable_ingress_creation: false,
        }
    }
}

impl IngressConfig {
    /// Check required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.url_scheme.is_empty() {
            return Err(Error::validation_for_field(
                "ingress.urlScheme",
                "url scheme must not be empty",
            ));
        }
        if !self.path_template.is_empty() && self.ingress_domain.is_empty() {
            return Err(Error::validation_for_field(
                "ingress.ingressDomain",
                "ingressDomain is required when pathTemplate is set",
            ));
        }
        if self.disable_istio_virtual_host {
            return Ok(());
        }
        for (field, value) in [
            ("ingress.ingressGateway", &self.ingress_gateway),
            ("ingress.localGateway", &self.local_gateway),
            ("ingress.localGatewayService", &self.local_gateway_service_name),
        ] {
            if value.is_empty() {
                return Err(Error::validation_for_field(field, "must be set"));
            }
        }
        Ok(())
    }

    /// True when a path template is configured
    pub fn has_path_template(&self) -> bool {
        !self.path_template.is_empty()
    }
}

/// Deploy settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    /// Deployment mode applied when a workload does not choose one
    #[serde(default)]
    pub default_deployment_mode: String,

    /// Annotation keys that must not propagate onto generated objects
    #[serde(default)]
    pub service_annotation_disallowed_list: Vec<String>,
}

impl DeployConfig {
    /// Copy of `annotations` without the disallowed keys
    pub fn filter_annotations(
        &self,
        annotations: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        annotations
            .iter()
            .filter(|(key, _)| !self.service_annotation_disallowed_list.contains(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Complete operator configuration loaded from the config ConfigMap
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperatorConfig {
    /// Ingress settings
    pub ingress: IngressConfig,
    /// Deploy settings
    pub deploy: DeployConfig,
}

impl OperatorConfig {
    /// Parse and validate configuration from the `inferenceservice-config` ConfigMap
    ///
    /// The `ingress` key is required; a missing `deploy` key yields defaults.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, Error> {
        let empty = BTreeMap::new();
        let data = config_map.data.as_ref().unwrap_or(&empty);

        let raw_ingress = data.get(INGRESS_CONFIG_KEY).ok_or_else(|| {
            Error::validation_for_field(INGRESS_CONFIG_KEY, "ingress config is missing")
        })?;
        let ingress: IngressConfig = serde_json::from_str(raw_ingress)
            .map_err(|e| Error::serialization_for_kind(INGRESS_CONFIG_KEY, e.to_string()))?;
        ingress.validate()?;

        let deploy = match data.get(DEPLOY_CONFIG_KEY) {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| Error::serialization_for_kind(DEPLOY_CONFIG_KEY, e.to_string()))?,
            None => DeployConfig::default(),
        };

        Ok(Self { ingress, deploy })
    }
}

/// Namespace holding Knative's domain ConfigMap
pub fn domain_config_namespace() -> String {
    std::env::var(SYSTEM_NAMESPACE_ENV)
        .ok()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_KNATIVE_SERVING_NAMESPACE.to_string())
}

/// Known ingress base domains: the keys of the domain ConfigMap, sorted
pub fn domains_from_config_map(config_map: &ConfigMap) -> Vec<String> {
    config_map
        .data
        .as_ref()
        .map(|data| data.keys().cloned().collect())
        .unwrap_or_default()
}
