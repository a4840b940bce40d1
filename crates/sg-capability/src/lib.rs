//! # sg-capability
//!
//! Capability-based permissions for the Sandguard scripting sandbox.
//!
//! Code may only perform an operation if a valid [`CapabilityToken`] for it
//! is reachable from the thread's active [`CapabilityContext`]. Tokens carry
//! an immutable [`Constraint`] (resource globs, operation set, usage and
//! time bounds) and an integrity checksum.
//!
//! ## Key invariants
//!
//! - **Default deny**: no active context or no token → not granted.
//! - **Inheritance is vertical only**: a child context sees its ancestors'
//!   tokens, never its siblings'.
//! - **Usage is monotonic**: a token is never reset, only replaced.
//! - **Scopes always unwind**: [`ScopedContext`] restores the previous active
//!   context on every exit path.
//!
//! ```rust
//! use sg_capability::{CapabilityManager, CapabilityToken, ManagerConfig};
//!
//! let manager = CapabilityManager::new(ManagerConfig::default());
//! {
//!     let _scope = manager
//!         .capability_context("script", [CapabilityToken::unrestricted("file:read")])
//!         .unwrap();
//!     assert!(manager.has_capability("file:read"));
//! }
//! assert!(!manager.has_capability("file:read"));
//! ```

mod cache;
pub mod config;
pub mod constraint;
pub mod context;
pub mod error;
pub mod manager;
pub mod scope;
pub mod token;

pub use config::ManagerConfig;
pub use constraint::{Constraint, ResourceLimits};
pub use context::{CapabilityContext, ContextId};
pub use error::{CapabilityError, ConfigError, ContextError};
pub use manager::CapabilityManager;
pub use scope::{ActiveContextGuard, ScopedContext};
pub use token::{CapabilityToken, TokenInvalid};
