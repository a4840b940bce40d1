// scope.rs — RAII guards for the thread's active context.
//
// Both guards restore the previously active context when dropped, which
// covers normal exit, early return, `?` and panic unwinding. They are
// `!Send`: the active pointer is per-thread, so a guard must be dropped on
// the thread that created it.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::CapabilityContext;
use crate::manager::CapabilityManager;

/// A capability scope opened by [`CapabilityManager::capability_context`].
///
/// Owns the scoped child context; dropping the guard destroys it.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopedContext<'m> {
    manager: &'m CapabilityManager,
    context: Arc<CapabilityContext>,
    previous: Option<Arc<CapabilityContext>>,
    _not_send: PhantomData<*const ()>,
}

impl<'m> ScopedContext<'m> {
    pub(crate) fn new(
        manager: &'m CapabilityManager,
        context: Arc<CapabilityContext>,
        previous: Option<Arc<CapabilityContext>>,
    ) -> Self {
        Self {
            manager,
            context,
            previous,
            _not_send: PhantomData,
        }
    }

    /// The scoped context.
    pub fn context(&self) -> &Arc<CapabilityContext> {
        &self.context
    }

    /// The context that will be restored on drop.
    pub fn previous(&self) -> Option<&Arc<CapabilityContext>> {
        self.previous.as_ref()
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        self.manager.set_active(self.previous.clone());

        if let Err(err) = self.manager.destroy_context(&self.context) {
            // A nested context outlived this scope; leave it for the host.
            tracing::warn!(
                context = self.context.name(),
                error = %err,
                "scoped capability context not destroyed on exit"
            );
        }

        if let Some(previous) = &self.previous {
            if previous.evict_invalid() > 0 {
                self.manager.invalidate_context_cache(previous.id());
            }
        }
    }
}

/// Installs an existing context as active; see [`CapabilityManager::enter`].
#[must_use = "the context is deactivated as soon as the guard is dropped"]
pub struct ActiveContextGuard<'m> {
    manager: &'m CapabilityManager,
    previous: Option<Arc<CapabilityContext>>,
    _not_send: PhantomData<*const ()>,
}

impl<'m> ActiveContextGuard<'m> {
    pub(crate) fn new(
        manager: &'m CapabilityManager,
        previous: Option<Arc<CapabilityContext>>,
    ) -> Self {
        Self {
            manager,
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ActiveContextGuard<'_> {
    fn drop(&mut self) {
        self.manager.set_active(self.previous.take());
    }
}
