//! # Worker lifecycle hooks.
//!
//! [`Lifecycle`] is an explicit registry of `init`/`ready` handlers. Registration
//! returns a [`HookToken`]; the owner unregisters with it when done, so handlers
//! never outlive the supervisor that installed them.
//!
//! ## Delivery
//! - Hooks run synchronously on the thread that calls `emit_*` (the worker's task).
//! - The registry lock is not held while hooks run; a hook may register or
//!   unregister other hooks.
//! - Hooks registered after an emit do not see it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::runtime::worker::{ConsumerRef, WorkerRef};

/// Payload of the `ready` notification.
#[derive(Clone)]
pub struct WorkerReady {
    /// Name of the worker that became ready.
    pub worker: Arc<str>,
    /// Consumers the worker started; stopped gracefully on shutdown.
    pub consumers: Vec<ConsumerRef>,
}

type InitHook = Arc<dyn Fn(&WorkerRef) + Send + Sync>;
type ReadyHook = Arc<dyn Fn(&WorkerReady) + Send + Sync>;

/// Deregistration token returned by [`Lifecycle::on_init`] / [`Lifecycle::on_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookToken(u64);

#[derive(Default)]
struct Hooks {
    init: Vec<(HookToken, InitHook)>,
    ready: Vec<(HookToken, ReadyHook)>,
}

/// Registry of worker lifecycle handlers.
#[derive(Default)]
pub struct Lifecycle {
    hooks: Mutex<Hooks>,
    next: AtomicU64,
}

impl Lifecycle {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for the `init` notification (worker object created).
    pub fn on_init<F>(&self, f: F) -> HookToken
    where
        F: Fn(&WorkerRef) + Send + Sync + 'static,
    {
        let token = self.token();
        self.lock().init.push((token, Arc::new(f)));
        token
    }

    /// Registers a handler for the `ready` notification (worker consuming).
    pub fn on_ready<F>(&self, f: F) -> HookToken
    where
        F: Fn(&WorkerReady) + Send + Sync + 'static,
    {
        let token = self.token();
        self.lock().ready.push((token, Arc::new(f)));
        token
    }

    /// Removes a handler. Returns `false` if the token was not registered.
    pub fn unregister(&self, token: HookToken) -> bool {
        let mut hooks = self.lock();
        let before = hooks.init.len() + hooks.ready.len();
        hooks.init.retain(|(t, _)| *t != token);
        hooks.ready.retain(|(t, _)| *t != token);
        before != hooks.init.len() + hooks.ready.len()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        let hooks = self.lock();
        hooks.init.len() + hooks.ready.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `init` to every registered handler.
    pub fn emit_init(&self, worker: &WorkerRef) {
        let hooks: Vec<InitHook> = self.lock().init.iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook(worker);
        }
    }

    /// Delivers `ready` to every registered handler.
    pub fn emit_ready(&self, ready: &WorkerReady) {
        let hooks: Vec<ReadyHook> = self.lock().ready.iter().map(|(_, h)| h.clone()).collect();
        for hook in hooks {
            hook(ready);
        }
    }

    fn token(&self) -> HookToken {
        HookToken(self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
