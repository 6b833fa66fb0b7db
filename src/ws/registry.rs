//! Listener registry: message type to subscribed callbacks.
//!
//! The registry is shared by the client and the hub. It is generic over the
//! callback signature so both sides get the same registration semantics:
//! idempotent per handle, removable one at a time or per type, and
//! snapshot-based dispatch so callbacks never run under the registry lock.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable callback handle.
///
/// Identity is the shared allocation: clones of a handle are the same
/// listener, two handles built from identical closures are not.
pub struct Handle<F: ?Sized>(Arc<F>);

impl<F: ?Sized> Handle<F> {
    /// Wraps an already shared callback.
    #[must_use]
    pub fn from_arc(callback: Arc<F>) -> Self {
        Self(callback)
    }

    /// Returns the callback.
    #[must_use]
    pub fn callback(&self) -> &F {
        &self.0
    }

    /// Returns `true` if both handles refer to the same callback.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<F: ?Sized> Clone for Handle<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> PartialEq for Handle<F> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<F: ?Sized> Eq for Handle<F> {}

impl<F: ?Sized> fmt::Debug for Handle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Mapping from message type to the listeners subscribed to it.
///
/// Listeners for a type are kept in registration order.
pub struct ListenerRegistry<F: ?Sized> {
    listeners: HashMap<String, Vec<Handle<F>>>,
}

impl<F: ?Sized> ListenerRegistry<F> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Registers `listener` under `msg_type`.
    ///
    /// Returns `false` if that same handle was already registered for the
    /// type, in which case nothing changes.
    pub fn insert(&mut self, msg_type: &str, listener: &Handle<F>) -> bool {
        let entry = self.listeners.entry(msg_type.to_string()).or_default();
        if entry.iter().any(|l| l.same(listener)) {
            return false;
        }
        entry.push(listener.clone());
        true
    }

    /// Removes one listener, or every listener for the type when
    /// `listener` is `None`.
    ///
    /// Returns the number of registrations removed. Unknown types are a
    /// no-op.
    pub fn remove(&mut self, msg_type: &str, listener: Option<&Handle<F>>) -> usize {
        let Some(entry) = self.listeners.get_mut(msg_type) else {
            return 0;
        };
        let removed = match listener {
            Some(target) => {
                let before = entry.len();
                entry.retain(|l| !l.same(target));
                before - entry.len()
            }
            None => {
                let count = entry.len();
                entry.clear();
                count
            }
        };
        if entry.is_empty() {
            self.listeners.remove(msg_type);
        }
        removed
    }

    /// Returns the listeners for `msg_type` in registration order.
    #[must_use]
    pub fn snapshot(&self, msg_type: &str) -> Vec<Handle<F>> {
        self.listeners.get(msg_type).cloned().unwrap_or_default()
    }

    /// Returns the number of listeners registered for `msg_type`.
    #[must_use]
    pub fn count(&self, msg_type: &str) -> usize {
        self.listeners.get(msg_type).map_or(0, Vec::len)
    }

    /// Returns the total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Removes every registration.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for ListenerRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

/// Locks a registry or connection mutex, recovering the data if a
/// listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one listener invocation, containing a panic so sibling listeners
/// still receive the message.
///
/// Returns `false` if the listener panicked.
pub fn invoke_guarded(msg_type: &str, call: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(msg_type, "listener panicked; continuing with remaining listeners");
            false
        }
    }
}
