// plan.rs — Access planning for compile-time optimizers.
//
// An optimizer that knows the static type of a receiver may skip the gate,
// but only when the registry would allow the access unconditionally. The
// decision reuses `is_access_allowed`, so the compiled path and the gated
// path cannot disagree.

use sg_registry::{AttributeRegistry, TypeKind};

/// How an attribute access should be compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPlan {
    /// Resolve the member directly; no runtime check is needed.
    Direct,
    /// Route through the gate at runtime.
    Gated,
    /// The access can never succeed; report it at compile time.
    Reject,
}

/// Plan an access of `name` on a receiver of `static_type`, if known.
pub fn plan_access(
    registry: &AttributeRegistry,
    static_type: Option<&TypeKind>,
    name: &str,
) -> AccessPlan {
    let Some(kind) = static_type else {
        return AccessPlan::Gated;
    };
    // Keyed lookup on plain data never consults the registry.
    if matches!(kind, TypeKind::Map) {
        return AccessPlan::Direct;
    }
    if !registry.is_access_allowed(kind, name) {
        return AccessPlan::Reject;
    }
    if registry.required_capabilities(kind, name).is_empty() {
        AccessPlan::Direct
    } else {
        AccessPlan::Gated
    }
}
