//! Ingress reconciliation for InferenceServices
//!
//! Given the component status of an InferenceService this crate resolves its
//! public host and URL, compiles the Istio VirtualService routing traffic to
//! it, keeps an ExternalName alias Service pointing at the local gateway, and
//! publishes `url`, `address` and `IngressReady` back onto the status.

#![deny(missing_docs)]

pub mod client;
pub mod domains;
pub mod equality;
pub mod external_service;
pub mod host;
pub mod reconciler;
pub mod routes;
pub mod status;

pub use client::{IngressKubeClient, IngressKubeClientImpl};
pub use reconciler::{IngressOutcome, IngressReconciler};
pub use servegate_common::{Error, Result};
