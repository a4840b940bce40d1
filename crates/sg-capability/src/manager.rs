// manager.rs — The capability manager.
//
// The manager owns every context it creates (an arena keyed by context id),
// tracks which context is active on each thread, and memoizes validation
// results for the hot `has_capability` path.
//
// The active-context pointer is thread-local and keyed by manager instance.
// It is read and written only by the functions in this module; scripts
// running on different threads never observe each other's grants.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::cache::{CacheKey, ValidationCache};
use crate::config::ManagerConfig;
use crate::constraint::{Constraint, ResourceLimits};
use crate::context::{CapabilityContext, ContextId};
use crate::error::{CapabilityError, ContextError};
use crate::scope::{ActiveContextGuard, ScopedContext};
use crate::token::CapabilityToken;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Lazy<Arc<CapabilityManager>> =
    Lazy::new(|| Arc::new(CapabilityManager::new(ManagerConfig::default())));

thread_local! {
    static ACTIVE: RefCell<HashMap<u64, Arc<CapabilityContext>>> = RefCell::new(HashMap::new());
}

/// Process-wide coordinator for capability contexts.
#[derive(Debug)]
pub struct CapabilityManager {
    id: u64,
    config: ManagerConfig,
    contexts: RwLock<HashMap<ContextId, Arc<CapabilityContext>>>,
    cache: ValidationCache,
}

impl CapabilityManager {
    pub fn new(config: ManagerConfig) -> Self {
        let cache = ValidationCache::new(config.cache_ttl(), config.cache_capacity);
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            config,
            contexts: RwLock::new(HashMap::new()),
            cache,
        }
    }

    /// The lazily created process-wide manager.
    pub fn global() -> Arc<CapabilityManager> {
        Arc::clone(&GLOBAL)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ── Context tree ──

    /// Create a context, as a child of `parent` or as a new root.
    pub fn create_context(
        &self,
        name: &str,
        parent: Option<&Arc<CapabilityContext>>,
    ) -> Result<Arc<CapabilityContext>, ContextError> {
        let context = match parent {
            Some(parent) => {
                if !self.contexts.read().contains_key(&parent.id()) {
                    return Err(ContextError::Unmanaged(parent.id()));
                }
                CapabilityContext::new_child(parent, name)?
            }
            None => CapabilityContext::new_root(name),
        };
        tracing::info!(
            context = name,
            context_id = %context.id(),
            parent = ?parent.map(|p| p.id()),
            "capability context created"
        );
        self.contexts
            .write()
            .insert(context.id(), Arc::clone(&context));
        Ok(context)
    }

    /// Destroy a context and release it from the arena.
    ///
    /// Fails with [`ContextError::LiveChildren`] while children are still live.
    pub fn destroy_context(&self, context: &Arc<CapabilityContext>) -> Result<(), ContextError> {
        if let Err(err) = context.destroy() {
            tracing::warn!(context = context.name(), error = %err, "refusing to destroy context");
            return Err(err);
        }
        self.contexts.write().remove(&context.id());
        self.cache.invalidate_context(context.id());
        tracing::info!(context = context.name(), context_id = %context.id(), "capability context destroyed");
        Ok(())
    }

    /// Look up a managed context by id.
    pub fn context(&self, id: ContextId) -> Option<Arc<CapabilityContext>> {
        self.contexts.read().get(&id).cloned()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.read().len()
    }

    // ── Grants ──

    /// Issue a token stamped with the configured creator identity.
    pub fn issue_token(&self, capability: &str, constraint: Constraint) -> CapabilityToken {
        CapabilityToken::new(capability, constraint, self.config.default_creator.as_str())
    }

    /// Insert or replace `token` in `context` only.
    pub fn add_capability(
        &self,
        context: &CapabilityContext,
        token: CapabilityToken,
    ) -> Result<(), ContextError> {
        let capability = token.capability().to_string();
        context.add_capability(token)?;
        self.cache.invalidate_capability(&capability);
        Ok(())
    }

    pub fn revoke_capability(
        &self,
        context: &CapabilityContext,
        capability: &str,
    ) -> Option<CapabilityToken> {
        let removed = context.revoke_capability(capability);
        self.cache.invalidate_capability(capability);
        removed
    }

    /// Grant a new token into the current thread's active context.
    pub fn grant(
        &self,
        capability: &str,
        constraint: Constraint,
    ) -> Result<CapabilityToken, CapabilityError> {
        let context = self.require_active(capability)?;
        let token = self.issue_token(capability, constraint);
        self.add_capability(&context, token.clone())
            .map_err(|_| CapabilityError::NoActiveContext {
                capability: capability.to_string(),
            })?;
        Ok(token)
    }

    // ── Checks against the active context ──

    /// The context active on the current thread, if any.
    pub fn active_context(&self) -> Option<Arc<CapabilityContext>> {
        ACTIVE.with(|active| active.borrow().get(&self.id).cloned())
    }

    /// Whether the active context chain holds a valid `capability`.
    ///
    /// Results are memoized for the configured TTL. Never consumes a use.
    pub fn has_capability(&self, capability: &str) -> bool {
        let Some(context) = self.active_context() else {
            return false;
        };
        let key = CacheKey::held(context.id(), capability);
        if let Some(allowed) = self.cache.get(&key) {
            tracing::trace!(capability, allowed, "capability check served from cache");
            return allowed;
        }
        let generation = self.cache.generation();
        let allowed = context.has_capability(capability, true);
        self.cache.insert(key, allowed, generation);
        allowed
    }

    /// Whether `capability` would permit `resource`/`operation`, without
    /// consuming a use. Memoized like [`has_capability`](Self::has_capability).
    pub fn can_use(&self, capability: &str, resource: Option<&str>, operation: Option<&str>) -> bool {
        let Some(context) = self.active_context() else {
            return false;
        };
        let key = CacheKey::usage(context.id(), capability, resource, operation);
        if let Some(allowed) = self.cache.get(&key) {
            return allowed;
        }
        let generation = self.cache.generation();
        let allowed = context
            .check_capability(capability, resource, operation)
            .is_ok();
        self.cache.insert(key, allowed, generation);
        allowed
    }

    /// Consume one use of `capability` in the active context chain.
    ///
    /// Cached results for the capability are invalidated before and after
    /// the token is updated, so the outcome of this call is visible to the
    /// very next check on any thread.
    pub fn use_capability(
        &self,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Result<(), CapabilityError> {
        self.cache.invalidate_capability(capability);
        let context = self.require_active(capability)?;
        let result = context.use_capability(capability, resource, operation);
        self.cache.invalidate_capability(capability);
        log_use_failure(&context, &result);
        result
    }

    /// [`use_capability`](Self::use_capability) with requested resource amounts.
    pub fn use_capability_metered(
        &self,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
        requested: &ResourceLimits,
    ) -> Result<(), CapabilityError> {
        self.cache.invalidate_capability(capability);
        let context = self.require_active(capability)?;
        let result = context.use_capability_metered(capability, resource, operation, requested);
        self.cache.invalidate_capability(capability);
        log_use_failure(&context, &result);
        result
    }

    // ── Scoped activation ──

    /// Install an existing managed context as active on this thread.
    ///
    /// The previous active context is restored when the guard drops.
    pub fn enter(
        &self,
        context: &Arc<CapabilityContext>,
    ) -> Result<ActiveContextGuard<'_>, ContextError> {
        if context.is_destroyed() {
            return Err(ContextError::Destroyed(context.id()));
        }
        if self.context(context.id()).is_none() {
            return Err(ContextError::Unmanaged(context.id()));
        }
        let previous = self.set_active(Some(Arc::clone(context)));
        Ok(ActiveContextGuard::new(self, previous))
    }

    /// Open a capability scope: a child of the active context (or a new
    /// root) holding `tokens`, installed as active until the guard drops.
    ///
    /// On drop, on every exit path including unwinding, the previous active
    /// context is restored, the scoped context is destroyed and invalid
    /// tokens are evicted from the restored context.
    pub fn capability_context(
        &self,
        name: &str,
        tokens: impl IntoIterator<Item = CapabilityToken>,
    ) -> Result<ScopedContext<'_>, ContextError> {
        let previous = self.active_context();
        let context = self.create_context(name, previous.as_ref())?;
        for token in tokens {
            if let Err(err) = self.add_capability(&context, token) {
                // Roll back; the context was never installed.
                let _ = self.destroy_context(&context);
                return Err(err);
            }
        }
        self.set_active(Some(Arc::clone(&context)));
        Ok(ScopedContext::new(self, context, previous))
    }

    /// Run `body` inside [`capability_context`](Self::capability_context).
    pub fn with_capability_context<R>(
        &self,
        name: &str,
        tokens: impl IntoIterator<Item = CapabilityToken>,
        body: impl FnOnce(&Arc<CapabilityContext>) -> R,
    ) -> Result<R, ContextError> {
        let scope = self.capability_context(name, tokens)?;
        Ok(body(scope.context()))
    }

    // ── Cache introspection ──

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // ── Internals shared with scope guards ──

    /// Swap the active context for this thread, returning the previous one.
    pub(crate) fn set_active(
        &self,
        context: Option<Arc<CapabilityContext>>,
    ) -> Option<Arc<CapabilityContext>> {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            match context {
                Some(context) => active.insert(self.id, context),
                None => active.remove(&self.id),
            }
        })
    }

    pub(crate) fn invalidate_context_cache(&self, context: ContextId) {
        self.cache.invalidate_context(context);
    }

    fn require_active(&self, capability: &str) -> Result<Arc<CapabilityContext>, CapabilityError> {
        self.active_context()
            .ok_or_else(|| CapabilityError::NoActiveContext {
                capability: capability.to_string(),
            })
    }
}

impl Default for CapabilityManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

fn log_use_failure(context: &CapabilityContext, result: &Result<(), CapabilityError>) {
    if let Err(err) = result {
        tracing::warn!(context = context.name(), error = %err, "capability use rejected");
    }
}
