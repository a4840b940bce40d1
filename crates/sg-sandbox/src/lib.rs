//! # sg-sandbox
//!
//! The attribute gate and capability-guarded host functions of the
//! Sandguard scripting runtime.
//!
//! Scripts see host data as [`Value`]s. Any attribute access on a value of
//! unproven type goes through [`Gate::access`], which consults the
//! [`sg_registry::AttributeRegistry`] whitelist and the capabilities held by
//! the active [`sg_capability::CapabilityContext`] before resolving the
//! member. Host functions are exposed through [`guard`], which checks the
//! declared capabilities on every call.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sg_capability::{CapabilityManager, ManagerConfig};
//! use sg_registry::AttributeRegistry;
//! use sg_sandbox::{Gate, Value};
//!
//! let gate = Gate::new(
//!     Arc::new(AttributeRegistry::with_builtins()),
//!     Arc::new(CapabilityManager::new(ManagerConfig::default())),
//! );
//! let digits = Value::pattern(r"\d").unwrap();
//! let found = gate.call_method(&digits, "findAll", &["a1 b2".into()]).unwrap();
//! assert_eq!(found, Value::List(vec!["1".into(), "2".into()]));
//! assert!(gate.get_attr(&digits, "__class__").is_err());
//! ```

pub mod error;
pub mod gate;
pub mod guard;
mod members;
pub mod plan;
pub mod value;

pub use error::GateError;
pub use gate::Gate;
pub use guard::{guard, require_capabilities, GuardedFunction, ModuleDecl};
pub use plan::{plan_access, AccessPlan};
pub use value::{BoundMethod, HostObject, MethodFn, NativeFn, NativeFunction, Value};
