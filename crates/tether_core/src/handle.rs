//! Host-held script values
//!
//! Script values never leave the thread of the runtime that created them, so
//! the host holds them through `ScriptValue` tokens. The runtime keeps the
//! value itself in a table keyed by the token id. When the last clone of a
//! token is dropped its id is queued on the issuing `HandleIndex`, and the
//! runtime drops the table entry the next time it is entered.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Issues handle ids for one runtime and collects the released ones.
#[derive(Debug)]
pub struct HandleIndex {
    runtime: u64,
    next: AtomicU64,
    released: Mutex<Vec<u64>>,
}

impl HandleIndex {
    pub fn new(runtime: u64) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            next: AtomicU64::new(1),
            released: Mutex::new(Vec::new()),
        })
    }

    /// Id of the runtime the handles belong to.
    pub fn runtime(&self) -> u64 {
        self.runtime
    }

    pub fn issue(self: &Arc<Self>) -> ScriptHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        ScriptHandle(Arc::new(Token {
            id,
            index: Arc::downgrade(self),
        }))
    }

    /// Ids whose tokens were dropped since the last call.
    pub fn take_released(&self) -> Vec<u64> {
        std::mem::take(&mut *self.released.lock())
    }

    pub fn owns(self: &Arc<Self>, handle: &ScriptHandle) -> bool {
        Weak::as_ptr(&handle.0.index) == Arc::as_ptr(self)
    }
}

struct Token {
    id: u64,
    index: Weak<HandleIndex>,
}

impl Drop for Token {
    fn drop(&mut self) {
        if let Some(index) = self.index.upgrade() {
            index.released.lock().push(self.id);
        }
    }
}

/// Token for a script value held by the host.
#[derive(Clone)]
pub struct ScriptHandle(Arc<Token>);

impl ScriptHandle {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// `None` once the issuing runtime is gone.
    pub fn runtime(&self) -> Option<u64> {
        self.0.index.upgrade().map(|index| index.runtime)
    }
}

impl PartialEq for ScriptHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScriptHandle").field(&self.0.id).finish()
    }
}

/// A script value as seen from the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Held(ScriptHandle),
}

impl ScriptValue {
    pub fn handle(&self) -> Option<&ScriptHandle> {
        match self {
            ScriptValue::Held(handle) => Some(handle),
            ScriptValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ScriptValue::Undefined)
    }
}
