//! Hook registry for cache lifecycle events
//!
//! Hooks let callers observe what the cache layer does: values being
//! registered into a batch context, cached functions resolving calls, and
//! invalidations. Each event keeps its own ordered callback list; callbacks
//! fire in registration order and receive the root cache key plus the batch
//! context that was active at the time, if any.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::batch::BatchContext;
use crate::error::CacheError;

/// Cache lifecycle events observable through hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// A value was registered into the active batch context
    Register,

    /// A cached function resolved a call
    Call,

    /// Cached entries were invalidated
    Invalidate,
}

impl HookEvent {
    /// All events, in a stable order
    pub const ALL: [HookEvent; 3] = [HookEvent::Register, HookEvent::Call, HookEvent::Invalidate];
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::Register => write!(f, "register"),
            HookEvent::Call => write!(f, "call"),
            HookEvent::Invalidate => write!(f, "invalidate"),
        }
    }
}

impl FromStr for HookEvent {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register" => Ok(HookEvent::Register),
            "call" => Ok(HookEvent::Call),
            "invalidate" => Ok(HookEvent::Invalidate),
            other => Err(CacheError::InvalidHookEvent(other.to_string())),
        }
    }
}

/// Callback invoked when a hook event fires
///
/// Blanket-implemented for closures, so most callers never implement this
/// directly:
///
/// ```
/// use std::sync::Arc;
/// use memobatch::HookCallback;
///
/// let hook: Arc<dyn HookCallback> =
///     Arc::new(|key: &str, _ctx: Option<&memobatch::BatchContext>| {
///         println!("resolved {key}");
///     });
/// ```
///
/// Callbacks run synchronously on the calling task and are trusted code:
/// a panicking callback propagates to the caller.
pub trait HookCallback: Send + Sync {
    /// Handle one event occurrence
    fn invoke(&self, key: &str, ctx: Option<&BatchContext>);
}

impl<F> HookCallback for F
where
    F: Fn(&str, Option<&BatchContext>) + Send + Sync,
{
    fn invoke(&self, key: &str, ctx: Option<&BatchContext>) {
        self(key, ctx)
    }
}

/// Ordered callback lists, one per event
///
/// Both the coordinator (global hooks) and each batch context (local hooks)
/// carry one of these. Registration order is invocation order.
#[derive(Default)]
pub struct HookRegistry {
    register: Mutex<Vec<Arc<dyn HookCallback>>>,
    call: Mutex<Vec<Arc<dyn HookCallback>>>,
    invalidate: Mutex<Vec<Arc<dyn HookCallback>>>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, event: HookEvent) -> &Mutex<Vec<Arc<dyn HookCallback>>> {
        match event {
            HookEvent::Register => &self.register,
            HookEvent::Call => &self.call,
            HookEvent::Invalidate => &self.invalidate,
        }
    }

    /// Append a callback to the list for `event`
    pub fn add(&self, event: HookEvent, callback: Arc<dyn HookCallback>) {
        let mut hooks = self.list(event).lock().unwrap_or_else(|e| e.into_inner());
        hooks.push(callback);
        debug!("Registered hook for event '{}' ({} total)", event, hooks.len());
    }

    /// Drop every callback registered for `event`
    pub fn remove_all(&self, event: HookEvent) {
        let mut hooks = self.list(event).lock().unwrap_or_else(|e| e.into_inner());
        hooks.clear();
    }

    /// Number of callbacks registered for `event`
    pub fn len(&self, event: HookEvent) -> usize {
        self.list(event).lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check whether no callbacks are registered for any event
    pub fn is_empty(&self) -> bool {
        HookEvent::ALL.iter().all(|event| self.len(*event) == 0)
    }

    /// Fire every callback for `event`, in registration order
    ///
    /// The list is snapshotted before invocation, so a callback that
    /// registers further hooks does not affect the current firing.
    pub fn trigger(&self, event: HookEvent, key: &str, ctx: Option<&BatchContext>) {
        let hooks: Vec<Arc<dyn HookCallback>> = {
            let list = self.list(event).lock().unwrap_or_else(|e| e.into_inner());
            list.clone()
        };

        if hooks.is_empty() {
            return;
        }

        debug!("Firing {} hook(s) for event '{}' key '{}'", hooks.len(), event, key);
        for hook in hooks {
            hook.invoke(key, ctx);
        }
    }
}
