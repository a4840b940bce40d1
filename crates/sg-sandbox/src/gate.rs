// gate.rs — The single checkpoint for attribute access from scripts.
//
// Every `obj.name` and `obj.name(args)` a script evaluates on a value whose
// type was not proven at compile time goes through `Gate::access`:
//
//   1. Plain data (maps) → keyed lookup, no registry involved.
//   2. Registry whitelist for the concrete type → else AccessDenied.
//   3. Capabilities the rule requires → else CapabilityMissing.
//   4. Native member resolution → invoke, bind, or read the field.
//
// Denials for reserved names and for names that simply do not exist carry
// identical text, so scripts cannot probe the denylist.

use std::sync::Arc;

use sg_capability::CapabilityManager;
use sg_registry::{AccessKind, AttributeRegistry, TypeKind};

use crate::error::GateError;
use crate::guard::require_capabilities;
use crate::members::{self, Member};
use crate::plan::{plan_access, AccessPlan};
use crate::value::{BoundMethod, Value};

/// Attribute gate bound to a registry and a capability manager.
#[derive(Debug, Clone)]
pub struct Gate {
    registry: Arc<AttributeRegistry>,
    manager: Arc<CapabilityManager>,
}

impl Gate {
    pub fn new(registry: Arc<AttributeRegistry>, manager: Arc<CapabilityManager>) -> Self {
        Self { registry, manager }
    }

    /// A gate over the default whitelist and the process-wide manager.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(AttributeRegistry::with_builtins()),
            CapabilityManager::global(),
        )
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<CapabilityManager> {
        &self.manager
    }

    /// Access `name` on `object`, calling it with `args` when given.
    pub fn access(
        &self,
        object: &Value,
        name: &str,
        args: Option<&[Value]>,
    ) -> Result<Value, GateError> {
        if let Value::Map(entries) = object {
            let value = entries.get(name).cloned().ok_or_else(|| GateError::KeyNotFound {
                key: name.to_string(),
            })?;
            return match args {
                Some(args) => self.call(&value, args),
                None => Ok(value),
            };
        }

        let kind = object.type_kind();
        let Some(rule) = self.registry.rule(&kind, name) else {
            return Err(deny(&kind, name));
        };
        let access = rule.kind;
        let requires = rule.requires.clone();

        let target = format!("{}.{}", kind.class_name(), name);
        require_capabilities(&self.manager, &target, &requires)?;

        // Whitelisted but not implemented natively, or implemented as a
        // different kind of member than declared: same answer as unknown.
        let member = members::resolve(object, name).ok_or_else(|| deny(&kind, name))?;
        if !member_matches(access, &member) {
            return Err(deny(&kind, name));
        }
        match (member, args) {
            (Member::Method(func), Some(args)) => func(object, args),
            (Member::Method(func), None) => Ok(Value::BoundMethod(BoundMethod::new(
                object.clone(),
                name,
                requires,
                func,
            ))),
            (Member::Value(value), Some(args)) => self.call(&value, args),
            (Member::Value(value), None) => Ok(value),
        }
    }

    /// `object.name`
    pub fn get_attr(&self, object: &Value, name: &str) -> Result<Value, GateError> {
        self.access(object, name, None)
    }

    /// `object.name(args)`
    pub fn call_method(
        &self,
        object: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, GateError> {
        self.access(object, name, Some(args))
    }

    /// Call a callable value.
    pub fn call(&self, callee: &Value, args: &[Value]) -> Result<Value, GateError> {
        match callee {
            Value::Function(func) => func.call(args),
            Value::BoundMethod(method) => self.call_bound(method, args),
            other => Err(GateError::NotCallable {
                type_name: other.type_kind().class_name().to_string(),
            }),
        }
    }

    /// Call a bound method, re-checking its capabilities.
    ///
    /// A method bound inside a capability scope may be called after the
    /// scope has ended; the check here sees the context active now.
    pub fn call_bound(&self, method: &BoundMethod, args: &[Value]) -> Result<Value, GateError> {
        let target = format!(
            "{}.{}",
            method.receiver().type_kind().class_name(),
            method.name()
        );
        require_capabilities(&self.manager, &target, method.required_capabilities())?;
        method.invoke(args)
    }

    /// `getattr(object, name, default)`: denials and missing keys yield
    /// `default`; failures inside a member do not.
    pub fn safe_getattr(
        &self,
        object: &Value,
        name: &str,
        default: Value,
    ) -> Result<Value, GateError> {
        match self.access(object, name, None) {
            Err(err) if err.is_soft_denial() => Ok(default),
            other => other,
        }
    }

    /// `hasattr(object, name)`. Reserved names read as absent.
    pub fn has_attr(&self, object: &Value, name: &str) -> bool {
        self.access(object, name, None).is_ok()
    }

    /// Attribute names reachable on `object` right now, sorted.
    pub fn dir(&self, object: &Value) -> Vec<String> {
        if let Value::Map(entries) = object {
            return entries.keys().cloned().collect();
        }
        let kind = object.type_kind();
        self.registry
            .attributes(&kind)
            .into_iter()
            .filter(|name| {
                self.registry
                    .required_capabilities(&kind, name)
                    .iter()
                    .all(|capability| self.manager.has_capability(capability))
            })
            .filter(|name| members::resolve(object, name).is_some())
            .collect()
    }

    /// How an optimizer should compile an access of `name`.
    pub fn access_plan(&self, static_type: Option<&TypeKind>, name: &str) -> AccessPlan {
        plan_access(&self.registry, static_type, name)
    }
}

/// A method rule must resolve to something callable; a field or constant
/// rule must resolve to a stored value.
fn member_matches(access: AccessKind, member: &Member) -> bool {
    match (access, member) {
        (AccessKind::Method, Member::Method(_)) => true,
        (AccessKind::Method, Member::Value(value)) => value.is_callable(),
        (AccessKind::Field | AccessKind::Constant, Member::Value(_)) => true,
        (AccessKind::Field | AccessKind::Constant, Member::Method(_)) => false,
    }
}

fn deny(kind: &TypeKind, name: &str) -> GateError {
    tracing::warn!(type_name = kind.class_name(), attribute = name, "attribute access denied");
    GateError::access_denied(kind.class_name(), name)
}
