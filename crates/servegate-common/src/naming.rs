//! Naming constants for inference service components and their routing
//!
//! Single source of truth for the names the ingress layer derives: component
//! service names (with and without the legacy `-default` suffix), well-known
//! labels, the mesh gateway identifier and the explain path.

use crate::crd::ComponentType;

// =============================================================================
// Gateways and ports
// =============================================================================

/// Istio's reserved gateway name for sidecar (mesh-internal) traffic.
pub const ISTIO_MESH_GATEWAY: &str = "mesh";

/// Port of the shared local gateway service that every route forwards to.
pub const COMMON_DEFAULT_HTTP_PORT: u32 = 80;

// =============================================================================
// Labels
// =============================================================================

/// Label key selecting workload visibility.
pub const VISIBILITY_LABEL: &str = "networking.kserve.io/visibility";

/// Value for VISIBILITY_LABEL restricting a workload to mesh-internal traffic.
pub const CLUSTER_LOCAL_VISIBILITY: &str = "cluster-local";

// =============================================================================
// Paths
// =============================================================================

/// URI regex matching the v1 explain endpoint of any model.
pub const EXPLAIN_PREFIX: &str = r"^/v1/models/[\w-]+:explain$";

// =============================================================================
// Condition reasons
// =============================================================================

/// IngressReady reason when the routed component blocks ingress creation.
pub fn ingress_not_created_reason(component: ComponentType) -> String {
    let name = component.as_str();
    let mut chars = name.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{} ingress not created", capitalized)
}

// =============================================================================
// Naming Helpers
// =============================================================================

/// Service name of a component: `{name}-{component}`.
pub fn component_service_name(name: &str, component: ComponentType) -> String {
    format!("{}-{}", name, component.as_str())
}

/// Legacy service name of a component: `{name}-{component}-default`.
pub fn default_component_service_name(name: &str, component: ComponentType) -> String {
    format!("{}-{}-default", name, component.as_str())
}

/// Service name of a component under the given naming convention.
pub fn backend_service_name(name: &str, component: ComponentType, use_default: bool) -> String {
    if use_default {
        default_component_service_name(name, component)
    } else {
        component_service_name(name, component)
    }
}

/// Remove the component suffix from a component host or URL.
///
/// Hosts containing `-default` lose `-{component}-default`, all others lose
/// `-{component}`. Only the first occurrence is removed.
pub fn strip_component_suffix(value: &str, component: ComponentType) -> String {
    let suffix = if value.contains("-default") {
        format!("-{}-default", component.as_str())
    } else {
        format!("-{}", component.as_str())
    };
    value.replacen(&suffix, "", 1)
}
