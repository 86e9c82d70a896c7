//! Cluster object definitions used by the ingress reconciler

mod inference_service;
mod types;
mod virtual_service;

pub use inference_service::{
    Addressable, ComponentSpec, ComponentStatus, ComponentType, InferenceService,
    InferenceServiceSpec, InferenceServiceStatus, EXPLAINER_READY, INGRESS_READY,
    PREDICTOR_READY, TRANSFORMER_READY,
};
pub use types::{Condition, ConditionStatus};
pub use virtual_service::{
    Destination, HeaderOperations, Headers, HttpMatchRequest, HttpRewrite, HttpRoute,
    HttpRouteDestination, PortSelector, StringMatch, VirtualService, VirtualServiceSpec,
};
