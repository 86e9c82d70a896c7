//! InferenceService CRD types
//!
//! Only the parts of `serving.kserve.io/v1beta1 InferenceService` that the
//! ingress layer reads or writes are modelled: which components are
//! configured, the per-component status URLs and readiness conditions, and the
//! status fields the ingress reconciler publishes (`url`, `address`,
//! `IngressReady`).

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus};

// =============================================================================
// Condition types
// =============================================================================

/// Predictor component readiness
pub const PREDICTOR_READY: &str = "PredictorReady";
/// Transformer component readiness
pub const TRANSFORMER_READY: &str = "TransformerReady";
/// Explainer component readiness
pub const EXPLAINER_READY: &str = "ExplainerReady";
/// Ingress readiness, published by the ingress reconciler
pub const INGRESS_READY: &str = "IngressReady";

// =============================================================================
// Components
// =============================================================================

/// The three sub-component kinds of an inference service
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Serves predictions
    Predictor,
    /// Pre/post-processes requests in front of the predictor
    Transformer,
    /// Explains predictions
    Explainer,
}

impl ComponentType {
    /// Lowercase name used in service names and status keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predictor => "predictor",
            Self::Transformer => "transformer",
            Self::Explainer => "explainer",
        }
    }

    /// Condition type reporting this component's readiness
    pub fn ready_condition(&self) -> &'static str {
        match self {
            Self::Predictor => PREDICTOR_READY,
            Self::Transformer => TRANSFORMER_READY,
            Self::Explainer => EXPLAINER_READY,
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component deployment settings
///
/// The serving runtime, container and autoscaling details live with the
/// component controllers; ingress only cares whether a component is present.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Minimum number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Maximum number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Service account used by the component pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

// =============================================================================
// CRD
// =============================================================================

/// Model-serving workload with up to three sub-components
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "isvc",
    namespaced,
    status = "InferenceServiceStatus",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    /// Predictor component (always present)
    #[serde(default)]
    pub predictor: ComponentSpec,

    /// Optional transformer; when present it receives all predict traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformer: Option<ComponentSpec>,

    /// Optional explainer, routed on the explain path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explainer: Option<ComponentSpec>,
}

/// Addressable endpoint for in-cluster callers
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Addressable {
    /// In-cluster URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Per-component status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Internal URL of the component (e.g. `http://name-predictor.ns.example.com`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Latest revision that became ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision: Option<String>,
}

/// Status of an InferenceService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    /// Externally visible URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// In-cluster address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Status of each deployed component
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<ComponentType, ComponentStatus>,
}

impl InferenceServiceStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// True if the condition is present with status True
    pub fn is_condition_ready(&self, type_: &str) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// True if the condition is absent or has status Unknown
    pub fn is_condition_unknown(&self, type_: &str) -> bool {
        self.condition(type_)
            .map_or(true, |c| c.status == ConditionStatus::Unknown)
    }

    /// Insert or replace a condition by type
    ///
    /// Leaves the existing entry untouched when nothing but the timestamp
    /// would change, and keeps the old transition time when only the reason
    /// or message changes.
    pub fn set_condition(&mut self, condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_state(&condition) => {}
            Some(existing) => {
                let keep_time = existing.status == condition.status;
                let previous = existing.last_transition_time;
                *existing = condition;
                if keep_time {
                    existing.last_transition_time = previous;
                }
            }
            None => self.conditions.push(condition),
        }
    }

    /// URL recorded for a component, if any
    pub fn component_url(&self, component: ComponentType) -> Option<&str> {
        self.components
            .get(&component)
            .and_then(|c| c.url.as_deref())
    }
}

impl InferenceService {
    /// True when a transformer component is configured
    pub fn has_transformer(&self) -> bool {
        self.spec.transformer.is_some()
    }

    /// True when an explainer component is configured
    pub fn has_explainer(&self) -> bool {
        self.spec.explainer.is_some()
    }

    /// Component that receives predict traffic: the transformer when configured
    pub fn routed_component(&self) -> ComponentType {
        if self.has_transformer() {
            ComponentType::Transformer
        } else {
            ComponentType::Predictor
        }
    }

    /// Mutable status, created on first use
    pub fn status_mut(&mut self) -> &mut InferenceServiceStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

// =============================================================================
// Tests
// =============================================================================
