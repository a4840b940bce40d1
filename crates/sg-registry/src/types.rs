//! Runtime type identities.
//!
//! The gate dispatches on a closed set of built-in kinds plus one open
//! variant for host-declared classes, so every security-relevant branch is
//! an exhaustive `match` rather than a reflective lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The concrete runtime type of a sandbox value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Pattern,
    Function,
    BoundMethod,
    /// A class exposed by the host, identified by its declared name.
    Custom(String),
}

impl TypeKind {
    /// The name scripts see for this type. Custom classes use their
    /// declared name.
    pub fn class_name(&self) -> &str {
        match self {
            TypeKind::Null => "NoneType",
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::Float => "float",
            TypeKind::Str => "str",
            TypeKind::List => "list",
            TypeKind::Map => "dict",
            TypeKind::Pattern => "Pattern",
            TypeKind::Function => "function",
            TypeKind::BoundMethod => "method",
            TypeKind::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, TypeKind::Custom(_))
    }

    /// Resolve a class name to a built-in kind, or `Custom` if it is not one.
    pub fn from_class_name(name: &str) -> TypeKind {
        match name {
            "NoneType" => TypeKind::Null,
            "bool" => TypeKind::Bool,
            "int" => TypeKind::Int,
            "float" => TypeKind::Float,
            "str" => TypeKind::Str,
            "list" => TypeKind::List,
            "dict" => TypeKind::Map,
            "Pattern" => TypeKind::Pattern,
            "function" => TypeKind::Function,
            "method" => TypeKind::BoundMethod,
            other => TypeKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}
