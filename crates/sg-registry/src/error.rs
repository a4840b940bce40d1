// error.rs — Error types for the attribute registry.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while registering attributes or loading class manifests.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The attribute name is on the denylist and can never be registered.
    #[error("cannot register attribute '{name}' on '{owner}': name is reserved")]
    RegistrationConflict { owner: String, name: String },

    /// The attribute name is empty or contains whitespace.
    #[error("invalid attribute name {name:?} on '{owner}'")]
    InvalidName { owner: String, name: String },

    /// The class manifest file could not be read.
    #[error("failed to read class manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The class manifest is not valid TOML or has the wrong shape.
    #[error("invalid class manifest: {0}")]
    InvalidManifest(#[from] toml::de::Error),
}
