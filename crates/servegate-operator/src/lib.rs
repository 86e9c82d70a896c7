//! servegate operator: watches InferenceServices and reconciles their ingress

pub mod controller;
