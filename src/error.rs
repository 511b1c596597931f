//! Central error types for the crate
//!
//! Errors follow three severities: precondition violations (caller bugs,
//! surfaced immediately), configuration mismatches (fatal at resource build
//! time), and combine failures (recorded as terminal primitive state, never
//! thrown from `update`).

use thiserror::Error;

/// Result alias used across the crate
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A caller-supplied argument is invalid
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// Operation requires a state the object has not reached yet
    #[error("not ready: {what}")]
    NotReady { what: String },

    /// Any call other than `is_destroyed` on a destroyed object
    #[error("object '{object}' has been destroyed")]
    ObjectDestroyed { object: String },

    /// No instance with the given id survived combining
    #[error("instance not found: {id}")]
    InstanceNotFound { id: String },

    /// The instance exists but has no attribute with this name
    #[error("instance '{id}' has no attribute '{name}'")]
    UnknownAttribute { id: String, name: String },

    /// A shader requires a vertex attribute absent from the combined layout
    #[error("shader '{label}' requires vertex attribute '{name}' which is not in the combined geometry layout")]
    MissingVertexAttribute { label: String, name: String },

    /// Shader program creation failed in the backend
    #[error("failed to build shader program '{label}': {error}")]
    ShaderBuildFailed { label: String, error: String },

    /// The asynchronous geometry combine step failed
    #[error("geometry combine failed: {reason}")]
    CombineFailed { reason: String },

    /// A GPU resource operation failed in the backend
    #[error("GPU operation '{operation}' failed: {error}")]
    GpuOperationFailed { operation: String, error: String },

    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Shorthand for `InvalidArgument`
    pub fn invalid_argument(name: &str, reason: impl std::fmt::Display) -> Self {
        EngineError::InvalidArgument {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for `CombineFailed`
    pub fn combine_failed(reason: impl std::fmt::Display) -> Self {
        EngineError::CombineFailed {
            reason: reason.to_string(),
        }
    }

    /// Shorthand for `Internal`
    pub fn internal(message: impl std::fmt::Display) -> Self {
        EngineError::Internal {
            message: message.to_string(),
        }
    }
}
