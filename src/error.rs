//! Error types used by the connvisor runtime and capability providers.
//!
//! This module defines two main error enums:
//!
//! - [`LifecycleError`]: errors surfaced to callers of the lifecycle components.
//! - [`ProviderError`]: errors raised by capability providers (factories, connections, sessions).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and additional utilities such as [`ProviderError::is_retryable`].

use std::time::Duration;
use thiserror::Error;

/// # Errors surfaced by the lifecycle components.
///
/// A configuration error is fatal to the single registration or activation
/// that caused it, never to sibling registrations or chains.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A required parameter is missing or malformed.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// The owning component is stopping and no longer accepts work.
    #[error("{component} is shutting down")]
    ShutdownInProgress {
        /// Component that rejected the operation.
        component: &'static str,
    },

    /// Graceful drain did not complete in time; remaining registrations were force-unbound.
    #[error("drain timeout {timeout:?} exceeded; remaining: {remaining:?}")]
    DrainTimeout {
        /// The configured drain window.
        timeout: Duration,
        /// Listener ids that were still registered when the window closed.
        remaining: Vec<String>,
    },
}

impl LifecycleError {
    /// Shorthand for [`LifecycleError::Configuration`].
    pub fn config(reason: impl Into<String>) -> Self {
        LifecycleError::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use connvisor::LifecycleError;
    ///
    /// let err = LifecycleError::config("missing queue");
    /// assert_eq!(err.as_label(), "lifecycle_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::Configuration { .. } => "lifecycle_configuration",
            LifecycleError::ShutdownInProgress { .. } => "lifecycle_shutdown_in_progress",
            LifecycleError::DrainTimeout { .. } => "lifecycle_drain_timeout",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LifecycleError::Configuration { reason } => format!("configuration: {reason}"),
            LifecycleError::ShutdownInProgress { component } => {
                format!("shutdown in progress: {component}")
            }
            LifecycleError::DrainTimeout { timeout, remaining } => {
                format!("drain exceeded {timeout:?}; remaining listeners={remaining:?}")
            }
        }
    }
}

/// # Errors produced by capability providers.
///
/// Construction failures and faults are recoverable: the supervising component
/// logs them and retries or rebuilds. They are never surfaced to callers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider failed to build a resource.
    #[error("construction failed: {reason}")]
    Construction {
        /// The underlying error message.
        reason: String,
    },

    /// A published resource reported a failure after the fact.
    #[error("fault: {reason}")]
    Fault {
        /// The underlying error message.
        reason: String,
    },

    /// The resource was already closed.
    #[error("resource closed")]
    Closed,
}

impl ProviderError {
    /// Shorthand for [`ProviderError::Construction`].
    pub fn construction(reason: impl Into<String>) -> Self {
        ProviderError::Construction {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ProviderError::Fault`].
    pub fn fault(reason: impl Into<String>) -> Self {
        ProviderError::Fault {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use connvisor::ProviderError;
    ///
    /// let err = ProviderError::fault("socket reset");
    /// assert_eq!(err.as_label(), "provider_fault");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Construction { .. } => "provider_construction",
            ProviderError::Fault { .. } => "provider_fault",
            ProviderError::Closed => "provider_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProviderError::Construction { reason } => format!("construction: {reason}"),
            ProviderError::Fault { reason } => format!("fault: {reason}"),
            ProviderError::Closed => "resource closed".to_string(),
        }
    }

    /// Indicates whether a supervisor may retry after this error.
    ///
    /// Returns `true` for [`ProviderError::Construction`] and [`ProviderError::Fault`],
    /// `false` otherwise.
    ///
    /// # Example
    /// ```
    /// use connvisor::ProviderError;
    ///
    /// assert!(ProviderError::construction("refused").is_retryable());
    /// assert!(!ProviderError::Closed.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Construction { .. } | ProviderError::Fault { .. }
        )
    }
}
