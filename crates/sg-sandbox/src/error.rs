// error.rs — Error types for gated access and guarded calls.
//
// Denials always name the attribute (or capability) and the owning type
// (or function) so the runtime can produce a useful diagnostic, but the
// text is identical whether a name is unregistered or reserved.

use sg_capability::CapabilityError;
use thiserror::Error;

/// Errors raised by the gate and by guarded functions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GateError {
    /// The attribute is not reachable on this type.
    #[error("access denied: '{attribute}' on '{type_name}'")]
    AccessDenied { type_name: String, attribute: String },

    /// A capability required by the attribute or function is not held.
    #[error("capability '{capability}' required by '{target}' is not available")]
    CapabilityMissing { capability: String, target: String },

    /// Keyed lookup on a plain-data record found no such key.
    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    /// Arguments were supplied to something that cannot be called.
    #[error("'{type_name}' value is not callable")]
    NotCallable { type_name: String },

    /// A callable rejected its arguments.
    #[error("{callee}: {message}")]
    InvalidArguments { callee: String, message: String },

    /// A metered capability use failed inside a host function.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// A host function body failed.
    #[error("{0}")]
    Host(String),
}

impl GateError {
    pub(crate) fn access_denied(type_name: &str, attribute: &str) -> Self {
        GateError::AccessDenied {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub(crate) fn invalid_args(callee: &str, message: impl Into<String>) -> Self {
        GateError::InvalidArguments {
            callee: callee.to_string(),
            message: message.into(),
        }
    }

    /// Whether a caller-level fallback (such as a default value) may stand
    /// in for this error.
    pub fn is_soft_denial(&self) -> bool {
        matches!(
            self,
            GateError::AccessDenied { .. }
                | GateError::CapabilityMissing { .. }
                | GateError::KeyNotFound { .. }
        )
    }
}
