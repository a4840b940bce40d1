// registry.rs — The safe attribute registry.
//
// Default deny: an attribute is reachable only if an explicit rule exists
// for the value's concrete type (or its class name) and the name is not on
// the denylist. Lookup order:
//
// 1. Dunder-shaped or denylisted name → denied, whatever is registered.
// 2. Rule in the built-in table for the type → allowed.
// 3. Rule in the custom-class table under the type's class name → allowed.
// 4. Otherwise → denied.
//
// The registry is filled with `&mut self` while modules load and is then
// shared read-only (typically behind an `Arc`), so lookups take no locks.

use std::collections::{BTreeSet, HashMap};

use crate::denylist::Denylist;
use crate::error::RegistryError;
use crate::rule::AttributeRule;
use crate::types::TypeKind;

/// Whitelist of (type, attribute) and (class name, attribute) pairs.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    builtins: HashMap<TypeKind, HashMap<String, AttributeRule>>,
    classes: HashMap<String, HashMap<String, AttributeRule>>,
    denylist: Denylist,
}

impl AttributeRegistry {
    /// An empty whitelist with the standard denylist.
    pub fn new() -> Self {
        Self {
            builtins: HashMap::new(),
            classes: HashMap::new(),
            denylist: Denylist::standard(),
        }
    }

    /// A registry pre-populated with the default built-in whitelist.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::defaults::register_defaults(&mut registry);
        registry
    }

    /// Register `rule` for a built-in type. Last write wins.
    ///
    /// A `TypeKind::Custom` kind is recorded in the custom-class table under
    /// its class name, which is where lookups for it go.
    pub fn register_builtin(&mut self, kind: TypeKind, rule: AttributeRule) -> Result<(), RegistryError> {
        self.check_name(kind.class_name(), &rule.name)?;
        tracing::debug!(owner = %kind, attribute = %rule.name, "registered attribute");
        match kind {
            TypeKind::Custom(class_name) => {
                self.classes
                    .entry(class_name)
                    .or_default()
                    .insert(rule.name.clone(), rule);
            }
            builtin => {
                self.builtins
                    .entry(builtin)
                    .or_default()
                    .insert(rule.name.clone(), rule);
            }
        }
        Ok(())
    }

    /// Register every member of a host-exposed class at once.
    ///
    /// The batch is all-or-nothing: if any rule names a reserved attribute,
    /// nothing is registered. Returns the number of rules registered.
    pub fn register_custom_class(
        &mut self,
        class_name: &str,
        rules: impl IntoIterator<Item = AttributeRule>,
    ) -> Result<usize, RegistryError> {
        let rules: Vec<AttributeRule> = rules.into_iter().collect();
        for rule in &rules {
            self.check_name(class_name, &rule.name)?;
        }

        let members = self.classes.entry(class_name.to_string()).or_default();
        let count = rules.len();
        for rule in rules {
            members.insert(rule.name.clone(), rule);
        }
        tracing::debug!(class = class_name, attributes = count, "registered class");
        Ok(count)
    }

    /// Add a name to the denylist. Existing registrations for it become
    /// unreachable.
    pub fn deny_name(&mut self, name: impl Into<String>) {
        self.denylist.insert(name);
    }

    pub fn is_denied(&self, name: &str) -> bool {
        self.denylist.is_denied(name)
    }

    /// The rule granting access to `name` on `kind`, if access is allowed.
    pub fn rule(&self, kind: &TypeKind, name: &str) -> Option<&AttributeRule> {
        if self.denylist.is_denied(name) {
            return None;
        }
        if kind.is_builtin() {
            if let Some(rule) = self.builtins.get(kind).and_then(|m| m.get(name)) {
                return Some(rule);
            }
        }
        self.classes
            .get(kind.class_name())
            .and_then(|members| members.get(name))
    }

    /// The single access predicate, shared by the runtime gate and any
    /// compile-time optimizer.
    pub fn is_access_allowed(&self, kind: &TypeKind, name: &str) -> bool {
        self.rule(kind, name).is_some()
    }

    /// Capabilities the matching rule demands; empty when none or denied.
    pub fn required_capabilities(&self, kind: &TypeKind, name: &str) -> BTreeSet<String> {
        self.rule(kind, name)
            .map(|rule| rule.requires.clone())
            .unwrap_or_default()
    }

    /// Reachable attribute names for `kind`, sorted.
    pub fn attributes(&self, kind: &TypeKind) -> Vec<String> {
        let mut names: BTreeSet<&String> = BTreeSet::new();
        if kind.is_builtin() {
            if let Some(members) = self.builtins.get(kind) {
                names.extend(members.keys());
            }
        }
        if let Some(members) = self.classes.get(kind.class_name()) {
            names.extend(members.keys());
        }
        names
            .into_iter()
            .filter(|name| !self.denylist.is_denied(name))
            .cloned()
            .collect()
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    fn check_name(&self, owner: &str, name: &str) -> Result<(), RegistryError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        if self.denylist.is_denied(name) {
            tracing::warn!(owner, attribute = name, "rejected registration of reserved attribute");
            return Err(RegistryError::RegistrationConflict {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
