//! Kubernetes API helpers
//!
//! Resources without a typed binding in this crate (Knative Services) are
//! accessed as `DynamicObject`s with a fixed `ApiResource`.

use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;

/// API group of Knative Serving
pub const KNATIVE_SERVING_GROUP: &str = "serving.knative.dev";

/// ApiResource for Knative Serving `serving.knative.dev/v1 Service` objects
pub fn knative_service_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(KNATIVE_SERVING_GROUP, "v1", "Service"))
}
