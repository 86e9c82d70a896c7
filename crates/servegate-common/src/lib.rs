//! Common types for servegate: cluster objects, errors, configuration and naming helpers

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod naming;
pub mod network;
pub mod template;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for status patches written by the operator
pub const FIELD_MANAGER: &str = "servegate-ingress-controller";
