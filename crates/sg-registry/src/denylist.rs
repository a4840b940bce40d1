// denylist.rs — Names that can never be reached from a script.
//
// The denylist is checked before any whitelist lookup, so it wins over every
// registration, including ones made before a name was added to it.

use std::collections::HashSet;

/// Introspection and execution hooks that lead out of the sandbox.
pub const DANGEROUS_NAMES: &[&str] = &[
    "mro",
    "globals",
    "builtins",
    "subclasses",
    "func_globals",
    "func_code",
    "func_closure",
    "func_defaults",
    "f_globals",
    "f_locals",
    "f_builtins",
    "f_back",
    "f_code",
    "gi_frame",
    "gi_code",
    "cr_frame",
    "cr_code",
    "ag_frame",
    "ag_code",
    "co_code",
    "tb_frame",
    "tb_next",
    "im_func",
    "im_self",
    "im_class",
    "getattr",
    "setattr",
    "delattr",
    "eval",
    "exec",
    "compile",
    "constructor",
    "prototype",
];

/// True for names shaped like `__x`, `x__` or `__x__`.
pub fn is_dunder_shaped(name: &str) -> bool {
    name.starts_with("__") || name.ends_with("__")
}

/// The set of names blocked regardless of registration.
#[derive(Debug, Clone)]
pub struct Denylist {
    names: HashSet<String>,
}

impl Denylist {
    /// A denylist seeded with [`DANGEROUS_NAMES`].
    pub fn standard() -> Self {
        Self {
            names: DANGEROUS_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn is_denied(&self, name: &str) -> bool {
        is_dunder_shaped(name) || self.names.contains(name)
    }

    /// Add a name. Returns false if it was already listed.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::standard()
    }
}
