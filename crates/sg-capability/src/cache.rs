// cache.rs — Short-lived memo of validation results.
//
// Keyed by (context, capability, query). Entries expire after the configured
// TTL and are dropped eagerly whenever a grant, revocation or use touches
// their capability type, so a just-exhausted token is never served from the
// cache.
//
// Every invalidation bumps a generation counter. A result computed before an
// invalidation is discarded on insert, so a check racing a use on another
// thread cannot re-populate the cache with a stale grant.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::context::ContextId;

/// Which question a cached result answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Query {
    /// A valid token is reachable (`has_capability`).
    Held,
    /// The token's constraint permits this request (`can_use`).
    Use {
        resource: Option<String>,
        operation: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    context: ContextId,
    capability: String,
    query: Query,
}

impl CacheKey {
    pub(crate) fn held(context: ContextId, capability: &str) -> Self {
        Self {
            context,
            capability: capability.to_string(),
            query: Query::Held,
        }
    }

    pub(crate) fn usage(
        context: ContextId,
        capability: &str,
        resource: Option<&str>,
        operation: Option<&str>,
    ) -> Self {
        Self {
            context,
            capability: capability.to_string(),
            query: Query::Use {
                resource: resource.map(str::to_string),
                operation: operation.map(str::to_string),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    generation: u64,
}

impl CacheState {
    fn invalidated(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Debug)]
pub(crate) struct ValidationCache {
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ValidationCache {
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.capacity > 0
    }

    /// The current generation. Take it before computing a result that will
    /// be passed to [`insert`](Self::insert).
    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<bool> {
        if !self.enabled() {
            return None;
        }
        let mut state = self.state.lock();
        match state.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.allowed),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `allowed` unless an invalidation happened since `observed`.
    pub(crate) fn insert(&self, key: CacheKey, allowed: bool, observed: u64) {
        if !self.enabled() {
            return;
        }
        let mut state = self.state.lock();
        if state.generation != observed {
            return;
        }
        if state.entries.len() >= self.capacity {
            let ttl = self.ttl;
            state.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
            if state.entries.len() >= self.capacity {
                state.entries.clear();
            }
        }
        state.entries.insert(
            key,
            CacheEntry {
                allowed,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry for `capability`, in any context.
    ///
    /// Children inherit from parents, so a change to one context's token can
    /// change the answer for its whole subtree.
    pub(crate) fn invalidate_capability(&self, capability: &str) {
        let mut state = self.state.lock();
        state.invalidated();
        state.entries.retain(|key, _| key.capability != capability);
    }

    pub(crate) fn invalidate_context(&self, context: ContextId) {
        let mut state = self.state.lock();
        state.invalidated();
        state.entries.retain(|key, _| key.context != context);
    }

    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        state.invalidated();
        state.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
