// error.rs — Error types for the capability subsystem.
//
// `CapabilityError` is what guarded code sees. The variants are kept distinct
// because the remediation differs: a missing or expired grant needs a new
// token, a denied one needs a different request.

use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextId;

/// Errors raised when resolving or consuming a capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// No token for this capability type in the context chain.
    #[error("capability '{capability}' not found")]
    NotFound { capability: String },

    /// A token exists but its constraint rejects the request.
    #[error("capability '{capability}' denied: {reason}")]
    Denied { capability: String, reason: String },

    /// The token has expired (or failed its integrity check).
    #[error("capability '{capability}' has expired")]
    Expired { capability: String },

    /// The token has reached its usage limit.
    #[error("capability '{capability}' exhausted after {used} uses")]
    Exhausted { capability: String, used: u64 },

    /// The current thread has no active context for this manager.
    #[error("no active capability context (needed '{capability}')")]
    NoActiveContext { capability: String },
}

impl CapabilityError {
    /// The capability type this error refers to.
    pub fn capability(&self) -> &str {
        match self {
            CapabilityError::NotFound { capability }
            | CapabilityError::Denied { capability, .. }
            | CapabilityError::Expired { capability }
            | CapabilityError::Exhausted { capability, .. }
            | CapabilityError::NoActiveContext { capability } => capability,
        }
    }
}

/// Errors raised by context tree management.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A context cannot be destroyed while it still has live children.
    #[error("context '{name}' ({id}) still has {children} live child context(s)")]
    LiveChildren {
        id: ContextId,
        name: String,
        children: usize,
    },

    /// The context was already destroyed.
    #[error("context {0} has been destroyed")]
    Destroyed(ContextId),

    /// The context is not registered with this manager.
    #[error("context {0} is not managed by this capability manager")]
    Unmanaged(ContextId),
}

/// Errors loading a [`crate::ManagerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manager config: {0}")]
    Parse(#[from] toml::de::Error),
}
