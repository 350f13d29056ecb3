//! The cache coordinator
//!
//! A [`Cacher`] ties together a storage backend, shared configuration, the
//! stack of batch contexts, and the global hook registry. Cached functions
//! are created through its [`cached`](Cacher::cached) and
//! [`cached_list`](Cacher::cached_list) wrap points and carry a handle back
//! to it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::backend::Backend;
use crate::batch::{BatchContext, BatchScope};
use crate::cache::config::CacheConfig;
use crate::cache::chunked::CachedListFn;
use crate::cache::decode_value;
use crate::cache::key::CacheArgs;
use crate::cache::single::CachedFn;
use crate::error::{CacheError, Result};
use crate::hooks::{HookCallback, HookEvent, HookRegistry};

/// Cache coordinator
///
/// Cheap to clone; clones share the backend, configuration, context stack,
/// and global hooks. The context stack serves one logical call path:
/// concurrent tasks that want batch scopes should each use their own
/// `Cacher` (sharing the backend `Arc` keeps the cached data common).
#[derive(Clone)]
pub struct Cacher {
    inner: Arc<CacherInner>,
}

struct CacherInner {
    id: Uuid,
    backend: Arc<dyn Backend>,
    config: CacheConfig,
    contexts: Mutex<Vec<Arc<BatchContext>>>,
    hooks: HookRegistry,
}

impl Cacher {
    /// Create a coordinator with the default configuration
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(CacherInner {
                id: Uuid::new_v4(),
                backend,
                config: CacheConfig::default(),
                contexts: Mutex::new(Vec::new()),
                hooks: HookRegistry::new(),
            }),
        }
    }

    /// Create a coordinator with a custom configuration
    pub fn with_config(backend: Arc<dyn Backend>, config: CacheConfig) -> Result<Self> {
        config.validate().map_err(CacheError::Config)?;

        Ok(Self {
            inner: Arc::new(CacherInner {
                id: Uuid::new_v4(),
                backend,
                config,
                contexts: Mutex::new(Vec::new()),
                hooks: HookRegistry::new(),
            }),
        })
    }

    /// Identity of this coordinator
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The storage backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// The shared configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Wrap an async function into a single-value cached function
    ///
    /// `identity` is the qualified name used as the key prefix; it must be
    /// stable across processes and unique among wrapped functions.
    pub fn cached<A, T, F, Fut>(&self, identity: impl Into<String>, source: F) -> CachedFn<A, T>
    where
        A: CacheArgs,
        T: Serialize + DeserializeOwned,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        CachedFn::new(
            self.clone(),
            identity.into(),
            Box::new(move |args| Box::pin(source(args))),
        )
    }

    /// Wrap an async list function into a chunk-cached function
    ///
    /// The source takes `(args, skip, limit)` and returns an ordered page of
    /// items; the wrapper caches fixed-size chunks of the result under
    /// per-chunk keys.
    pub fn cached_list<A, T, F, Fut>(
        &self,
        identity: impl Into<String>,
        source: F,
    ) -> CachedListFn<A, T>
    where
        A: CacheArgs + Clone,
        T: Serialize + DeserializeOwned,
        F: Fn(A, u64, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        CachedListFn::new(
            self.clone(),
            identity.into(),
            Box::new(move |args, skip, limit| Box::pin(source(args, skip, limit))),
        )
    }

    /// Create a batch context owned by this coordinator
    ///
    /// The context is inert until entered; it can be entered any number of
    /// times and keeps its queued keys between scopes.
    pub fn create_context(&self) -> Arc<BatchContext> {
        let ctx = Arc::new(BatchContext::new(
            self.inner.id,
            Arc::clone(&self.inner.backend),
        ));
        debug!("Created batch context {}", ctx.id());
        ctx
    }

    /// Enter a batch context, making it the innermost active one
    ///
    /// Returns the scope guard that pops it again. Entering a context that
    /// was created by a different coordinator fails with
    /// `CacheError::ForeignContext`.
    pub fn enter(&self, ctx: &Arc<BatchContext>) -> Result<BatchScope> {
        if ctx.owner_id() != self.inner.id {
            return Err(CacheError::ForeignContext);
        }

        let mut contexts = self
            .inner
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        contexts.push(Arc::clone(ctx));
        debug!(
            "Entered batch context {} (depth {})",
            ctx.id(),
            contexts.len()
        );

        Ok(BatchScope::new(self.clone(), Arc::clone(ctx)))
    }

    /// The innermost active batch context, if any
    pub fn current(&self) -> Option<Arc<BatchContext>> {
        let contexts = self
            .inner
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        contexts.last().cloned()
    }

    /// How many batch contexts are currently entered
    pub fn context_depth(&self) -> usize {
        self.inner
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Pop `expected` off the stack, verifying it is the top
    pub(crate) fn pop_context(&self, expected: &Arc<BatchContext>) -> Result<()> {
        let mut contexts = self
            .inner
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        match contexts.last() {
            Some(top) if top.id() == expected.id() => {
                contexts.pop();
                debug!(
                    "Left batch context {} (depth {})",
                    expected.id(),
                    contexts.len()
                );
                Ok(())
            }
            Some(top) => Err(CacheError::UnbalancedScope(format!(
                "expected context {} on top of the stack, found {}",
                expected.id(),
                top.id()
            ))),
            None => Err(CacheError::UnbalancedScope(format!(
                "expected context {} on top of the stack, found it empty",
                expected.id()
            ))),
        }
    }

    /// Register a global hook
    pub fn add_hook(&self, event: HookEvent, callback: Arc<dyn HookCallback>) {
        self.inner.hooks.add(event, callback);
    }

    /// Remove every global hook for `event`
    pub fn remove_hooks(&self, event: HookEvent) {
        self.inner.hooks.remove_all(event);
    }

    /// The global hook registry
    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    /// Fire hooks for `event`: the active context's registry first, then the
    /// global one
    ///
    /// Register hooks receive the active context; call and invalidate hooks
    /// receive only the key.
    pub(crate) fn fire_hooks(&self, event: HookEvent, key: &str) {
        let current = self.current();
        let ctx_arg = match event {
            HookEvent::Register => current.as_deref(),
            HookEvent::Call | HookEvent::Invalidate => None,
        };

        if let Some(ctx) = current.as_deref() {
            ctx.hooks().trigger(event, key, ctx_arg);
        }
        self.inner.hooks.trigger(event, key, ctx_arg);
    }

    /// Read and decode a raw cache value directly from the backend
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.inner.backend.get(key).await? {
            Some(raw) => Ok(Some(decode_value(&raw)?)),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Cacher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacher")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("context_depth", &self.context_depth())
            .finish()
    }
}
