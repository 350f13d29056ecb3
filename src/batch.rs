//! Batch contexts and scope guards
//!
//! A batch context collects cache keys that several call sites intend to
//! read, so one `multi_get` round trip can satisfy all of them. Contexts are
//! created by a [`Cacher`], entered through an RAII scope guard, and stacked
//! LIFO; cached functions consult the innermost active context before going
//! to the store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::cacher::Cacher;
use crate::error::Result;
use crate::hooks::{HookCallback, HookEvent, HookRegistry};

/// A deferred-fetch context
///
/// Holds the set of keys queued for the next batched read, the result map of
/// the most recent fetch, and a context-local hook registry. The context
/// outlives any scope it is entered through; queued keys survive enter/exit
/// cycles until [`reset`](Self::reset).
///
/// State mutation goes through shared references, so a context can be held
/// by several cached functions at once. It is still one logical caller's
/// object: interleaving queueing and fetching from concurrent tasks gives no
/// useful ordering.
pub struct BatchContext {
    id: Uuid,
    owner: Uuid,
    backend: Arc<dyn Backend>,
    pending: Mutex<HashSet<String>>,
    last_fetch: Mutex<Option<HashMap<String, Option<String>>>>,
    auto_fetch: AtomicBool,
    hooks: HookRegistry,
}

impl BatchContext {
    pub(crate) fn new(owner: Uuid, backend: Arc<dyn Backend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            backend,
            pending: Mutex::new(HashSet::new()),
            last_fetch: Mutex::new(None),
            auto_fetch: AtomicBool::new(false),
            hooks: HookRegistry::new(),
        }
    }

    /// Identity of this context
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn owner_id(&self) -> Uuid {
        self.owner
    }

    /// Queue a key for the next fetch (duplicates collapse)
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.contains(&key) {
            debug!("Queued key for batch fetch: {}", key);
            pending.insert(key);
        }
    }

    /// Queue several keys at once
    pub fn add_many<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            pending.insert(key.into());
        }
    }

    /// Snapshot of the queued keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = pending.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop every queued key
    ///
    /// The last-fetch map is kept; only the pending set is cleared.
    pub fn reset(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = pending.len();
        pending.clear();
        if dropped > 0 {
            debug!("Cleared {} queued key(s)", dropped);
        }
    }

    /// Fetch every queued key in one round trip
    ///
    /// Replaces the last-fetch map and returns a copy of it. The map has an
    /// entry for every queued key; keys the store does not hold map to
    /// `None`. Queued keys stay queued.
    pub async fn fetch(&self) -> Result<HashMap<String, Option<String>>> {
        let keys = self.keys();
        let values = self.backend.multi_get(&keys).await?;

        {
            let mut last = self.last_fetch.lock().unwrap_or_else(|e| e.into_inner());
            *last = Some(values.clone());
        }

        debug!("Batch fetch resolved {} key(s)", keys.len());
        Ok(values)
    }

    /// Whether any fetch has completed on this context
    pub fn has_fetched(&self) -> bool {
        self.last_fetch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Copy of the most recent fetch result, `None` before any fetch
    pub fn last_fetched(&self) -> Option<HashMap<String, Option<String>>> {
        self.last_fetch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Value for `key` from the most recent fetch
    ///
    /// `None` when no fetch has run, the key was not part of it, or the store
    /// held no value for it. Callers that need to tell those cases apart use
    /// [`is_fetched`](Self::is_fetched).
    pub fn lookup(&self, key: &str) -> Option<String> {
        let last = self.last_fetch.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref().and_then(|map| map.get(key).cloned().flatten())
    }

    /// Whether `key` was covered by the most recent fetch
    ///
    /// `true` even when the store held no value for it; `false` before any
    /// fetch.
    pub fn is_fetched(&self, key: &str) -> bool {
        let last = self.last_fetch.lock().unwrap_or_else(|e| e.into_inner());
        matches!(last.as_ref(), Some(map) if map.contains_key(key))
    }

    /// Ask for one automatic fetch when the enclosing scope exits
    pub fn enable_auto_fetch(&self) {
        self.auto_fetch.store(true, Ordering::SeqCst);
    }

    /// Whether an automatic fetch is still pending
    pub fn auto_fetch_pending(&self) -> bool {
        self.auto_fetch.load(Ordering::SeqCst)
    }

    pub(crate) fn take_auto_fetch(&self) -> bool {
        self.auto_fetch.swap(false, Ordering::SeqCst)
    }

    /// Register a context-local hook
    ///
    /// Context-local hooks fire before the coordinator's global ones.
    pub fn add_hook(&self, event: HookEvent, callback: Arc<dyn HookCallback>) {
        self.hooks.add(event, callback);
    }

    /// The context-local hook registry
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("id", &self.id)
            .field("pending", &self.keys().len())
            .field("fetched", &self.has_fetched())
            .finish()
    }
}

/// RAII guard for an entered batch context
///
/// Created by [`Cacher::enter`]. While the guard lives, its context is the
/// innermost active one for the coordinator. Dropping the guard pops the
/// context; prefer [`exit`](Self::exit), which can run a pending auto-fetch
/// (`Drop` cannot await) and reports an out-of-order exit as an error instead
/// of panicking.
#[must_use = "the context is popped when the scope is dropped"]
#[derive(Debug)]
pub struct BatchScope {
    cacher: Cacher,
    ctx: Arc<BatchContext>,
    exited: bool,
}

impl BatchScope {
    pub(crate) fn new(cacher: Cacher, ctx: Arc<BatchContext>) -> Self {
        Self {
            cacher,
            ctx,
            exited: false,
        }
    }

    /// The entered context
    pub fn context(&self) -> &Arc<BatchContext> {
        &self.ctx
    }

    /// Leave the scope, running a pending auto-fetch first
    ///
    /// Pops the context with LIFO verification; leaving out of order returns
    /// an unbalanced-scope error. The pop runs even when the auto-fetch
    /// fails, so the stack is restored before the fetch error is reported.
    pub async fn exit(mut self) -> Result<()> {
        let fetch_result = if self.ctx.take_auto_fetch() {
            debug!("Running auto-fetch for context {}", self.ctx.id());
            self.ctx.fetch().await.map(|_| ())
        } else {
            Ok(())
        };

        let pop_result = self.cacher.pop_context(&self.ctx);
        self.exited = true;

        pop_result?;
        fetch_result
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if self.exited {
            return;
        }

        if self.ctx.auto_fetch_pending() {
            warn!(
                "Batch scope for context {} dropped with auto-fetch pending; call exit() to run it",
                self.ctx.id()
            );
        }

        if let Err(e) = self.cacher.pop_context(&self.ctx) {
            // A wrong-top pop means scope nesting is broken. Absorbing that
            // silently would leave the stack lying about what is active.
            if std::thread::panicking() {
                error!("Batch scope dropped out of order during unwind: {}", e);
            } else {
                panic!("batch scope dropped out of order: {e}");
            }
        }
    }
}
