//! # sg-registry
//!
//! Whitelist of attributes that sandboxed scripts may reach on host values.
//!
//! Every dynamic attribute or method access in the sandbox is decided by
//! [`AttributeRegistry::is_access_allowed`]. The same predicate is used by
//! the runtime gate and by any compile-time optimizer, so the two can never
//! disagree.
//!
//! ## Key invariants
//!
//! - **Default deny**: no rule for the (type, name) pair → denied.
//! - **Denylist supremacy**: dunder-shaped and reserved names are denied
//!   before any lookup, and cannot be registered at all.

pub mod defaults;
pub mod denylist;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod rule;
pub mod types;

pub use denylist::{is_dunder_shaped, Denylist, DANGEROUS_NAMES};
pub use error::RegistryError;
pub use manifest::{ClassDecl, ClassManifest};
pub use registry::AttributeRegistry;
pub use rule::{AccessKind, AttributeRule};
pub use types::TypeKind;
