// context.rs — Capability contexts.
//
// A context holds the tokens granted to one scope of execution. Contexts
// form a tree: a child may borrow authority from its ancestors but never
// from its siblings. Links in both directions are `Weak`; the capability
// manager's arena owns every live context, so a parent cannot disappear
// underneath a child that is still registered.
//
// State is guarded by a reentrant lock. The lock is never held while
// calling into another context, so lookups that walk the parent chain
// take one lock at a time.
//
// Token-changing operations are crate-private. Hosts change tokens through
// `CapabilityManager`, which invalidates its validation cache around them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::ReentrantMutex;
use uuid::Uuid;

use crate::constraint::ResourceLimits;
use crate::error::{CapabilityError, ContextError};
use crate::token::CapabilityToken;

/// Identifier of a capability context.
pub type ContextId = Uuid;

#[derive(Default)]
struct ContextState {
    /// One token per capability type.
    tokens: HashMap<String, CapabilityToken>,
    children: Vec<Weak<CapabilityContext>>,
    destroyed: bool,
}

/// A scope-bound holder of capability tokens.
pub struct CapabilityContext {
    id: ContextId,
    name: String,
    parent: Option<Weak<CapabilityContext>>,
    state: ReentrantMutex<RefCell<ContextState>>,
}

/// What a single context concluded about a request.
enum LocalOutcome {
    Granted,
    Absent,
    /// A token exists here but is no longer usable.
    Invalid(CapabilityError),
    /// A usable token exists here and rejected the request.
    Rejected(CapabilityError),
}

/// A use or check request flowing up the context chain.
struct UseRequest<'a> {
    capability: &'a str,
    resource: Option<&'a str>,
    operation: Option<&'a str>,
    requested: Option<&'a ResourceLimits>,
    /// Record the use on the resolved token.
    consume: bool,
}

impl CapabilityContext {
    /// Create a root context.
    pub(crate) fn new_root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent: None,
            state: ReentrantMutex::new(RefCell::new(ContextState::default())),
        })
    }

    /// Create a child of `parent` and link it into the parent's child list.
    pub(crate) fn new_child(
        parent: &Arc<CapabilityContext>,
        name: impl Into<String>,
    ) -> Result<Arc<Self>, ContextError> {
        let child = Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent: Some(Arc::downgrade(parent)),
            state: ReentrantMutex::new(RefCell::new(ContextState::default())),
        });

        let guard = parent.state.lock();
        let mut state = guard.borrow_mut();
        if state.destroyed {
            return Err(ContextError::Destroyed(parent.id));
        }
        state.children.retain(|c| c.strong_count() > 0);
        state.children.push(Arc::downgrade(&child));
        Ok(child)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent context, if this is not a root and the parent is alive.
    pub fn parent(&self) -> Option<Arc<CapabilityContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().borrow().destroyed
    }

    /// Children that are still alive and not destroyed.
    pub fn live_children(&self) -> Vec<Arc<CapabilityContext>> {
        let children: Vec<Arc<CapabilityContext>> = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state.children.iter().filter_map(Weak::upgrade).collect()
        };
        children.into_iter().filter(|c| !c.is_destroyed()).collect()
    }

    /// Capability types held locally, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut caps: Vec<String> = state.tokens.keys().cloned().collect();
        caps.sort();
        caps
    }

    /// Snapshot of the local token for `capability`.
    pub fn token(&self, capability: &str) -> Option<CapabilityToken> {
        self.state.lock().borrow().tokens.get(capability).cloned()
    }

    /// Insert or replace the token for its capability type in this context only.
    ///
    /// Token changes go through the manager, which keeps its cache in step.
    pub(crate) fn add_capability(&self, token: CapabilityToken) -> Result<(), ContextError> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.destroyed {
            return Err(ContextError::Destroyed(self.id));
        }
        tracing::debug!(
            context = %self.name,
            capability = token.capability(),
            token_id = %token.id(),
            "capability granted"
        );
        state.tokens.insert(token.capability().to_string(), token);
        Ok(())
    }

    /// Remove the local token for `capability`.
    pub(crate) fn revoke_capability(&self, capability: &str) -> Option<CapabilityToken> {
        let removed = self.state.lock().borrow_mut().tokens.remove(capability);
        if removed.is_some() {
            tracing::debug!(context = %self.name, capability, "capability revoked");
        }
        removed
    }

    /// Drop every local token that is expired, exhausted or tampered.
    /// Returns how many were removed.
    pub(crate) fn evict_invalid(&self) -> usize {
        let now = Utc::now();
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let before = state.tokens.len();
        state.tokens.retain(|_, token| token.validate_at(now).is_ok());
        let evicted = before - state.tokens.len();
        if evicted > 0 {
            tracing::debug!(context = %self.name, evicted, "evicted invalid capability tokens");
        }
        evicted
    }

    /// Whether a valid token for `capability` is reachable.
    ///
    /// Invalid local tokens are evicted when discovered. With `check_parents`
    /// the lookup continues up the parent chain.
    pub fn has_capability(&self, capability: &str, check_parents: bool) -> bool {
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            if state.destroyed {
                return false;
            }
            if let Some(token) = state.tokens.get(capability) {
                match token.validate() {
                    Ok(()) => return true,
                    Err(reason) => {
                        tracing::debug!(
                            context = %self.name,
                            capability,
                            ?reason,
                            "evicting invalid capability token"
                        );
                        state.tokens.remove(capability);
                    }
                }
            }
        }

        if check_parents {
            if let Some(parent) = self.parent() {
                return parent.has_capability(capability, true);
            }
        }
        false
    }

    /// Consume one use of `capability` for `resource`/`operation`.
    ///
    /// The nearest valid token in the chain is used; its constraint decides.
    pub(crate) fn use_capability(
        &self,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Result<(), CapabilityError> {
        self.resolve(&UseRequest {
            capability,
            resource,
            operation,
            requested: None,
            consume: true,
        })
    }

    /// Like [`use_capability`](Self::use_capability), also checking the
    /// requested amounts against the token's resource limits.
    pub(crate) fn use_capability_metered(
        &self,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
        requested: &ResourceLimits,
    ) -> Result<(), CapabilityError> {
        self.resolve(&UseRequest {
            capability,
            resource,
            operation,
            requested: Some(requested),
            consume: true,
        })
    }

    /// Evaluate a request without recording a use.
    pub fn check_capability(
        &self,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Result<(), CapabilityError> {
        self.resolve(&UseRequest {
            capability,
            resource,
            operation,
            requested: None,
            consume: false,
        })
    }

    fn resolve(&self, request: &UseRequest<'_>) -> Result<(), CapabilityError> {
        match self.evaluate_local(request) {
            LocalOutcome::Granted => Ok(()),
            LocalOutcome::Rejected(err) => Err(err),
            LocalOutcome::Absent => match self.parent() {
                Some(parent) => parent.resolve(request),
                None => Err(CapabilityError::NotFound {
                    capability: request.capability.to_string(),
                }),
            },
            // An unusable local token is reported only if nothing further
            // up the chain can satisfy the request.
            LocalOutcome::Invalid(local_err) => match self.parent() {
                Some(parent) => match parent.resolve(request) {
                    Err(CapabilityError::NotFound { .. }) => Err(local_err),
                    other => other,
                },
                None => Err(local_err),
            },
        }
    }

    /// Validate, evaluate and (optionally) record, all under this context's lock.
    fn evaluate_local(&self, request: &UseRequest<'_>) -> LocalOutcome {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.destroyed {
            return LocalOutcome::Absent;
        }
        let Some(token) = state.tokens.get_mut(request.capability) else {
            return LocalOutcome::Absent;
        };

        if let Err(reason) = token.validate() {
            return LocalOutcome::Invalid(token.invalid_error(reason));
        }

        let denied = |reason: String| {
            LocalOutcome::Rejected(CapabilityError::Denied {
                capability: request.capability.to_string(),
                reason,
            })
        };
        if let Err(reason) = token
            .constraint()
            .evaluate(request.resource, request.operation)
        {
            return denied(reason);
        }
        if let Some(requested) = request.requested {
            if let Err(reason) = token.constraint().limits().permits(requested) {
                return denied(reason);
            }
        }

        if request.consume {
            token.record_use();
            tracing::debug!(
                context = %self.name,
                capability = request.capability,
                usage = token.usage_count(),
                "capability used"
            );
        }
        LocalOutcome::Granted
    }

    /// Tear down this context: clear its tokens and unlink it from its parent.
    ///
    /// Refuses while any child is still live.
    pub(crate) fn destroy(&self) -> Result<(), ContextError> {
        let live = self.live_children().len();
        {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            if state.destroyed {
                return Err(ContextError::Destroyed(self.id));
            }
            if live > 0 {
                return Err(ContextError::LiveChildren {
                    id: self.id,
                    name: self.name.clone(),
                    children: live,
                });
            }
            state.tokens.clear();
            state.children.clear();
            state.destroyed = true;
        }

        if let Some(parent) = self.parent() {
            let guard = parent.state.lock();
            guard
                .borrow_mut()
                .children
                .retain(|c| c.upgrade().map_or(false, |c| c.id != self.id));
        }
        Ok(())
    }
}

impl fmt::Debug for CapabilityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent().map(|p| p.id))
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use chrono::Duration;

    fn token(cap: &str) -> CapabilityToken {
        CapabilityToken::unrestricted(cap)
    }

    #[test]
    fn local_lookup() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(token("file:read")).unwrap();
        assert!(root.has_capability("file:read", false));
        assert!(!root.has_capability("file:write", true));
        assert_eq!(root.capabilities(), vec!["file:read".to_string()]);
    }

    #[test]
    fn child_inherits_from_parent() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();
        root.add_capability(token("file:read")).unwrap();

        assert!(child.has_capability("file:read", true));
        assert!(!child.has_capability("file:read", false));

        root.revoke_capability("file:read");
        assert!(!child.has_capability("file:read", true));
    }

    #[test]
    fn parent_expiry_propagates_to_child() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();
        let expired = CapabilityToken::new(
            "net:fetch",
            Constraint::unrestricted().with_expiry(Utc::now() - Duration::seconds(1)),
            "test",
        );
        root.add_capability(expired).unwrap();

        assert!(!child.has_capability("net:fetch", true));
        // Discovered during the walk, so the parent no longer holds it.
        assert!(root.token("net:fetch").is_none());
    }

    #[test]
    fn siblings_are_isolated() {
        let root = CapabilityContext::new_root("root");
        let a = CapabilityContext::new_child(&root, "a").unwrap();
        let b = CapabilityContext::new_child(&root, "b").unwrap();
        a.add_capability(token("exec:a")).unwrap();
        b.add_capability(token("exec:b")).unwrap();

        assert!(a.has_capability("exec:a", true));
        assert!(!a.has_capability("exec:b", true));
        assert!(b.has_capability("exec:b", true));
        assert!(!b.has_capability("exec:a", true));
    }

    #[test]
    fn use_counts_until_exhausted() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(CapabilityToken::new(
            "db:query",
            Constraint::unrestricted().with_max_usage(3),
            "test",
        ))
        .unwrap();

        for _ in 0..3 {
            root.use_capability("db:query", None, None).unwrap();
        }
        let err = root.use_capability("db:query", None, None).unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Exhausted {
                capability: "db:query".to_string(),
                used: 3
            }
        );
        assert_eq!(root.token("db:query").unwrap().usage_count(), 3);
    }

    #[test]
    fn use_of_expired_token_reports_expired() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(CapabilityToken::new(
            "net:fetch",
            Constraint::unrestricted().with_expiry(Utc::now() - Duration::seconds(1)),
            "test",
        ))
        .unwrap();

        assert_eq!(
            root.use_capability("net:fetch", None, None),
            Err(CapabilityError::Expired {
                capability: "net:fetch".to_string()
            })
        );
        // Use does not evict; the failed attempt recorded nothing.
        assert_eq!(root.token("net:fetch").unwrap().usage_count(), 0);
    }

    #[test]
    fn expired_local_token_falls_back_to_parent() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();
        root.add_capability(token("net:fetch")).unwrap();
        child
            .add_capability(CapabilityToken::new(
                "net:fetch",
                Constraint::unrestricted().with_expiry(Utc::now() - Duration::seconds(1)),
                "test",
            ))
            .unwrap();

        child.use_capability("net:fetch", None, None).unwrap();
        assert_eq!(root.token("net:fetch").unwrap().usage_count(), 1);
    }

    #[test]
    fn not_found_and_denied_are_distinct() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(CapabilityToken::new(
            "file:read",
            Constraint::unrestricted().with_resource_pattern("fs://workspace/**"),
            "test",
        ))
        .unwrap();

        match root.use_capability("file:write", Some("fs://workspace/a"), None) {
            Err(CapabilityError::NotFound { capability }) => assert_eq!(capability, "file:write"),
            other => panic!("expected NotFound, got {:?}", other),
        }
        match root.use_capability("file:read", Some("fs://etc/passwd"), None) {
            Err(CapabilityError::Denied { capability, .. }) => assert_eq!(capability, "file:read"),
            other => panic!("expected Denied, got {:?}", other),
        }
        // A denied request does not consume a use.
        assert_eq!(root.token("file:read").unwrap().usage_count(), 0);
    }

    #[test]
    fn nearest_valid_token_wins() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();
        root.add_capability(token("file:read")).unwrap();
        child
            .add_capability(CapabilityToken::new(
                "file:read",
                Constraint::unrestricted().with_operation("stat"),
                "test",
            ))
            .unwrap();

        // The child's narrower grant decides, even though the parent is broader.
        assert!(child.use_capability("file:read", None, Some("read")).is_err());
        assert!(child.use_capability("file:read", None, Some("stat")).is_ok());
    }

    #[test]
    fn invalid_local_token_falls_back_to_parent() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();
        root.add_capability(token("file:read")).unwrap();
        child
            .add_capability(CapabilityToken::new(
                "file:read",
                Constraint::unrestricted().with_max_usage(1),
                "test",
            ))
            .unwrap();

        child.use_capability("file:read", None, None).unwrap();
        // Child's token is exhausted; the parent's still serves.
        child.use_capability("file:read", None, None).unwrap();
        assert_eq!(root.token("file:read").unwrap().usage_count(), 1);
    }

    #[test]
    fn check_does_not_consume() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(CapabilityToken::new(
            "file:read",
            Constraint::unrestricted().with_max_usage(1),
            "test",
        ))
        .unwrap();
        root.check_capability("file:read", None, None).unwrap();
        root.check_capability("file:read", None, None).unwrap();
        assert_eq!(root.token("file:read").unwrap().usage_count(), 0);
    }

    #[test]
    fn metered_use_respects_limits() {
        let root = CapabilityContext::new_root("root");
        let limits = ResourceLimits {
            max_size_bytes: Some(100),
            ..Default::default()
        };
        root.add_capability(CapabilityToken::new(
            "file:read",
            Constraint::unrestricted().with_limits(limits),
            "test",
        ))
        .unwrap();

        let small = ResourceLimits {
            max_size_bytes: Some(10),
            ..Default::default()
        };
        let large = ResourceLimits {
            max_size_bytes: Some(1000),
            ..Default::default()
        };
        assert!(root
            .use_capability_metered("file:read", None, None, &small)
            .is_ok());
        assert!(matches!(
            root.use_capability_metered("file:read", None, None, &large),
            Err(CapabilityError::Denied { .. })
        ));
    }

    #[test]
    fn destroy_refuses_live_children() {
        let root = CapabilityContext::new_root("root");
        let child = CapabilityContext::new_child(&root, "child").unwrap();

        match root.destroy() {
            Err(ContextError::LiveChildren { children, .. }) => assert_eq!(children, 1),
            other => panic!("expected LiveChildren, got {:?}", other),
        }

        child.destroy().unwrap();
        assert!(root.live_children().is_empty());
        root.destroy().unwrap();
        assert!(root.is_destroyed());
        assert!(matches!(root.destroy(), Err(ContextError::Destroyed(_))));
    }

    #[test]
    fn destroyed_context_grants_nothing() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(token("file:read")).unwrap();
        root.destroy().unwrap();
        assert!(!root.has_capability("file:read", true));
        assert!(root.add_capability(token("file:read")).is_err());
        assert!(CapabilityContext::new_child(&root, "late").is_err());
    }

    #[test]
    fn evict_invalid_removes_only_dead_tokens() {
        let root = CapabilityContext::new_root("root");
        root.add_capability(token("file:read")).unwrap();
        root.add_capability(CapabilityToken::new(
            "file:write",
            Constraint::unrestricted().with_expiry(Utc::now() - Duration::seconds(5)),
            "test",
        ))
        .unwrap();
        assert_eq!(root.evict_invalid(), 1);
        assert_eq!(root.capabilities(), vec!["file:read".to_string()]);
    }
}
