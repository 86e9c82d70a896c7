//! Error types for the servegate ingress reconciler
//!
//! Errors are structured with fields to aid debugging in production.
//! Cluster API failures keep the underlying kube-rs error; failures deeper in
//! a reconcile are wrapped with a short context message via [`Error::wrap`]
//! so the controller log shows which step failed.

use thiserror::Error;

/// Main error type for servegate operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid operator configuration
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid config field (e.g., "ingress.ingressGateway")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource or config key being decoded (if known)
        kind: Option<String>,
    },

    /// Path template could not be rendered into a URL path
    #[error("template error for {template:?}: {message}")]
    Template {
        /// The configured template
        template: String,
        /// Description of what failed
        message: String,
    },

    /// A resolved service URL failed to parse
    #[error("invalid url {url:?}: {source}")]
    UrlParse {
        /// The URL string that failed to parse
        url: String,
        /// The underlying parse error
        #[source]
        source: url::ParseError,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "owner-reference")
        context: String,
    },

    /// An error annotated with the reconcile step that produced it
    #[error("{context}: {source}")]
    Context {
        /// Step that failed (e.g., "fails to create or update ingress")
        context: String,
        /// The wrapped error
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a validation error for a specific config field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a template error for the given template
    pub fn template(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: msg.into(),
        }
    }

    /// Create a URL parse error
    pub fn url_parse(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::UrlParse {
            url: url.into(),
            source,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap this error with the reconcile step that produced it
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through any `Context` wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404
        )
    }

    /// Check if this is an optimistic-concurrency conflict (409)
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.root(),
            Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409
        )
    }

    /// Check if this error is retryable
    ///
    /// Configuration, template and URL errors are not retryable (require a
    /// config or spec fix). Kubernetes 4xx errors are permanent except for
    /// 409 conflicts, which succeed once the caller re-reads fresh state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Template { .. } => false,
            Error::UrlParse { .. } => false,
            Error::Internal { .. } => true,
            Error::Context { source, .. } => source.is_retryable(),
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Context { context, .. } => Some(context),
            _ => None,
        }
    }
}
