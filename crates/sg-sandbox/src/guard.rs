// guard.rs — Capability-guarded host functions.
//
// A guarded function checks that every capability it (and its owning
// module) declares is held by the active context before running. It never
// consumes a use; functions that need metering call
// `CapabilityManager::use_capability` in their own body.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sg_capability::CapabilityManager;

use crate::error::GateError;
use crate::value::{NativeFn, NativeFunction, Value};

/// Check that every capability in `required` is held, in order.
///
/// The first missing capability is reported together with `target`.
pub fn require_capabilities(
    manager: &CapabilityManager,
    target: &str,
    required: &BTreeSet<String>,
) -> Result<(), GateError> {
    for capability in required {
        if !manager.has_capability(capability) {
            tracing::warn!(capability = %capability, target, "required capability not held");
            return Err(GateError::CapabilityMissing {
                capability: capability.clone(),
                target: target.to_string(),
            });
        }
    }
    Ok(())
}

/// Wrap `func` so it only runs while `required` capabilities are held.
pub fn guard<I, S>(
    manager: Arc<CapabilityManager>,
    name: impl Into<String>,
    required: I,
    func: impl Fn(&[Value]) -> Result<Value, GateError> + Send + Sync + 'static,
) -> GuardedFunction
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GuardedFunction {
        name: name.into(),
        required: required.into_iter().map(Into::into).collect(),
        manager,
        func: Arc::new(func),
    }
}

/// A host function behind a capability check.
#[derive(Clone)]
pub struct GuardedFunction {
    name: String,
    required: BTreeSet<String>,
    manager: Arc<CapabilityManager>,
    func: Arc<NativeFn>,
}

impl GuardedFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The deduplicated union of function and module capabilities.
    pub fn required_capabilities(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Verify the active context without invoking the function.
    pub fn check(&self) -> Result<(), GateError> {
        require_capabilities(&self.manager, &self.name, &self.required)
    }

    /// Check capabilities, then invoke. The result is returned unmodified.
    pub fn call(&self, args: &[Value]) -> Result<Value, GateError> {
        self.check()?;
        tracing::trace!(function = %self.name, "guarded call permitted");
        (self.func)(args)
    }

    /// Expose this function to scripts as a callable value.
    pub fn into_value(self) -> Value {
        let name = self.name.clone();
        Value::Function(NativeFunction::new(name, move |args: &[Value]| self.call(args)))
    }
}

impl fmt::Debug for GuardedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedFunction")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// A host module whose capabilities apply to every function it exports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDecl {
    name: String,
    capabilities: BTreeSet<String>,
}

impl ModuleDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }

    /// Guard a function of this module. The function is named
    /// `module.function` and requires the module's capabilities as well as
    /// its own.
    pub fn guard<I, S>(
        &self,
        manager: Arc<CapabilityManager>,
        function: &str,
        required: I,
        func: impl Fn(&[Value]) -> Result<Value, GateError> + Send + Sync + 'static,
    ) -> GuardedFunction
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let merged = self
            .capabilities
            .iter()
            .cloned()
            .chain(required.into_iter().map(Into::into));
        guard(manager, format!("{}.{}", self.name, function), merged, func)
    }
}
