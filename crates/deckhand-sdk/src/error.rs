//! SDK Error Types

use deckhand_core::ResolutionError;
use thiserror::Error;

use crate::utils::ValidationError;

/// SDK Result type alias
pub type SdkResult<T> = Result<T, SdkError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SdkError {
    /// Error from deckhand-core
    #[error(transparent)]
    Core(#[from] deckhand_core::Error),

    /// Addon cannot be installed because its dependency graph is broken
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A required hook failed under fail-fast
    #[cfg(feature = "hooks")]
    #[error(transparent)]
    HookExecution(#[from] crate::hooks::HookExecutionError),

    /// Invalid addon state transition
    #[cfg(feature = "addons")]
    #[error(transparent)]
    Lifecycle(#[from] crate::addons::LifecycleError),

    /// Manifest could not be read or is invalid
    #[error("invalid manifest {path}: {message}")]
    Manifest { path: String, message: String },

    /// Field validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Handler could not be resolved
    #[error("handler error: {message}")]
    Handler { message: String },

    /// Install or uninstall operation failed for good
    #[error("{operation} of addon '{addon}' failed: {message}")]
    OperationFailed {
        operation: String,
        addon: String,
        message: String,
    },

    /// Addon still required by installed dependents
    #[error("addon '{addon}' is required by: {}", dependents.join(", "))]
    HasDependents {
        addon: String,
        dependents: Vec<String>,
    },

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SdkError {
    /// Create a manifest error
    pub fn manifest(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create an operation failure
    pub fn operation_failed(
        operation: impl Into<String>,
        addon: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            addon: addon.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error comes from dependency resolution
    pub fn is_resolution(&self) -> bool {
        match self {
            Self::Resolution(_) => true,
            Self::Core(e) => e.is_resolution(),
            _ => false,
        }
    }
}
