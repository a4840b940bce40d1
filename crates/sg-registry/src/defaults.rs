// defaults.rs — The default whitelist for built-in types.
//
// Every entry here has a native implementation in the sandbox's member
// table; nothing outside this list is reachable on built-in values unless
// the host registers it.

use crate::registry::AttributeRegistry;
use crate::rule::AttributeRule;
use crate::types::TypeKind;

const STR_METHODS: &[(&str, &str)] = &[
    ("upper", "Uppercase copy of the string"),
    ("lower", "Lowercase copy of the string"),
    ("strip", "Copy without leading and trailing whitespace"),
    ("split", "Split on a separator (whitespace when omitted)"),
    ("startswith", "Whether the string starts with a prefix"),
    ("endswith", "Whether the string ends with a suffix"),
    ("replace", "Replace every occurrence of a substring"),
    ("find", "Index of the first occurrence, or -1"),
    ("contains", "Whether a substring occurs"),
    ("isdigit", "Whether every character is a decimal digit"),
    ("len", "Length in characters"),
];

const LIST_METHODS: &[(&str, &str)] = &[
    ("len", "Number of elements"),
    ("contains", "Whether an element is present"),
    ("index", "Index of the first equal element, or -1"),
    ("count", "Number of equal elements"),
    ("get", "Element at an index, or null"),
    ("join", "Join string elements with a separator"),
];

const NUMBER_METHODS: &[(&str, &str)] = &[("abs", "Absolute value")];

const FLOAT_METHODS: &[(&str, &str)] = &[
    ("round", "Nearest integer"),
    ("floor", "Largest integer not above the value"),
    ("ceil", "Smallest integer not below the value"),
];

const PATTERN_METHODS: &[(&str, &str)] = &[
    ("findAll", "Every non-overlapping match in a string"),
    ("find", "First match in a string, or null"),
    ("test", "Whether the pattern matches anywhere in a string"),
    ("replace", "Replace every match with a replacement string"),
    ("split", "Split a string on matches"),
];

/// Register the default whitelist into `registry`.
pub fn register_defaults(registry: &mut AttributeRegistry) {
    let methods: &[(TypeKind, &[(&str, &str)])] = &[
        (TypeKind::Str, STR_METHODS),
        (TypeKind::List, LIST_METHODS),
        (TypeKind::Int, NUMBER_METHODS),
        (TypeKind::Float, NUMBER_METHODS),
        (TypeKind::Float, FLOAT_METHODS),
        (TypeKind::Pattern, PATTERN_METHODS),
    ];

    let mut rules: Vec<(TypeKind, AttributeRule)> = Vec::new();
    for (kind, entries) in methods {
        for (name, description) in entries.iter() {
            rules.push((kind.clone(), AttributeRule::method(*name, *description)));
        }
    }
    rules.push((
        TypeKind::Pattern,
        AttributeRule::field("source", "The pattern's source text"),
    ));
    rules.push((
        TypeKind::Function,
        AttributeRule::field("name", "The function's registered name"),
    ));
    rules.push((
        TypeKind::BoundMethod,
        AttributeRule::field("name", "The bound member's name"),
    ));

    for (kind, rule) in rules {
        // Names above are fixed and never reserved.
        if let Err(err) = registry.register_builtin(kind, rule) {
            tracing::error!(error = %err, "default whitelist entry rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_expected_members() {
        let registry = AttributeRegistry::with_builtins();
        assert!(registry.is_access_allowed(&TypeKind::Str, "upper"));
        assert!(registry.is_access_allowed(&TypeKind::Pattern, "findAll"));
        assert!(registry.is_access_allowed(&TypeKind::Pattern, "source"));
        assert!(registry.is_access_allowed(&TypeKind::Float, "abs"));
        assert!(registry.is_access_allowed(&TypeKind::Float, "floor"));
        assert!(!registry.is_access_allowed(&TypeKind::Int, "floor"));
        assert!(!registry.is_access_allowed(&TypeKind::Map, "keys"));
    }

    #[test]
    fn member_less_kinds_stay_empty() {
        let registry = AttributeRegistry::with_builtins();
        for kind in [TypeKind::Bool, TypeKind::Null, TypeKind::Map] {
            assert!(registry.attributes(&kind).is_empty(), "{} has defaults", kind);
        }
        for kind in [
            TypeKind::Str,
            TypeKind::List,
            TypeKind::Int,
            TypeKind::Float,
            TypeKind::Pattern,
            TypeKind::Function,
            TypeKind::BoundMethod,
        ] {
            assert!(!registry.attributes(&kind).is_empty(), "{} has no defaults", kind);
        }
    }

    #[test]
    fn defaults_require_no_capabilities() {
        let registry = AttributeRegistry::with_builtins();
        for kind in [TypeKind::Str, TypeKind::List, TypeKind::Pattern] {
            for name in registry.attributes(&kind) {
                assert!(registry.required_capabilities(&kind, &name).is_empty());
            }
        }
    }
}
