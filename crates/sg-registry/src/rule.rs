// rule.rs — A single whitelist entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How an attribute is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// A data attribute read from the object.
    Field,
    /// A callable member; the underlying value must be callable.
    Method,
    /// A value fixed for the type (e.g. `math.pi`).
    Constant,
}

/// Permission to access one attribute on one type.
///
/// A rule may additionally demand capabilities that must be held in the
/// active context at access time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    pub kind: AccessKind,
    #[serde(default)]
    pub requires: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
}

impl AttributeRule {
    pub fn new(name: impl Into<String>, kind: AccessKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            requires: BTreeSet::new(),
            description: description.into(),
        }
    }

    pub fn method(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, AccessKind::Method, description)
    }

    pub fn field(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, AccessKind::Field, description)
    }

    pub fn constant(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, AccessKind::Constant, description)
    }

    /// Require `capability` in addition to the whitelist entry.
    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires.insert(capability.into());
        self
    }

    pub fn is_callable(&self) -> bool {
        self.kind == AccessKind::Method
    }
}
