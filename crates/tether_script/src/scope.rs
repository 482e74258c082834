//! Execution scopes
//!
//! A QuickJS context cannot be entered twice on one thread: `Context::with`
//! panics when it is already held. Host code that script reaches (a bound
//! function, an interceptor trap, a script callback the host invokes from
//! inside one) therefore reuses the context that is already active instead
//! of entering it again. Active contexts of the current thread are kept on
//! a stack, innermost last.
//!
//! Script-side state of each runtime (persistent values behind host
//! handles, class prototypes, the instance proxy handler) lives in a
//! thread-local `RuntimeSlot`, since none of it may cross threads.

use crate::bridge::Bridge;
use rquickjs::{Context, Ctx, Function, Object, Persistent, Value};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::trace;

thread_local! {
    static ACTIVE: RefCell<Vec<(u64, Ctx<'static>)>> = RefCell::new(Vec::new());
    static SLOTS: RefCell<HashMap<u64, Rc<RuntimeSlot>>> = RefCell::new(HashMap::new());
}

/// Script state of one runtime. Persistent values are declared before the
/// context so they are freed while the runtime is still alive.
pub(crate) struct RuntimeSlot {
    handles: RefCell<HashMap<u64, Persistent<Value<'static>>>>,
    callbacks: RefCell<HashMap<u64, Persistent<Function<'static>>>>,
    prototypes: RefCell<HashMap<TypeId, Persistent<Object<'static>>>>,
    handler: RefCell<Option<Persistent<Object<'static>>>>,
    /// `Proxy` constructor and the symbol unwrapping an instance proxy.
    proxy: Persistent<Value<'static>>,
    marker: Persistent<Value<'static>>,
    bridge: Arc<Bridge>,
    context: Context,
}

impl RuntimeSlot {
    pub(crate) fn new(ctx: &Ctx<'_>, context: Context, bridge: Arc<Bridge>) -> rquickjs::Result<Self> {
        let globals = ctx.globals();
        let proxy: Value = globals.get("Proxy")?;
        let symbol: Function = globals.get("Symbol")?;
        let marker: Value = symbol.call(("host instance",))?;
        Ok(Self {
            handles: RefCell::new(HashMap::new()),
            callbacks: RefCell::new(HashMap::new()),
            prototypes: RefCell::new(HashMap::new()),
            handler: RefCell::new(None),
            proxy: Persistent::save(ctx, proxy),
            marker: Persistent::save(ctx, marker),
            bridge,
            context,
        })
    }

    pub(crate) fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    /// Drop script values whose host handles are gone.
    fn drain_released(&self) {
        let released = self.bridge.handles().take_released();
        if released.is_empty() {
            return;
        }
        let mut handles = self.handles.borrow_mut();
        let mut callbacks = self.callbacks.borrow_mut();
        for id in &released {
            handles.remove(id);
            callbacks.remove(id);
        }
        trace!(runtime = self.bridge.id(), released = released.len(), "dropped host handles");
    }

    pub(crate) fn hold<'js>(&self, ctx: &Ctx<'js>, id: u64, value: Value<'js>) {
        let saved = Persistent::save(ctx, value);
        self.handles.borrow_mut().insert(id, saved);
    }

    pub(crate) fn held<'js>(&self, ctx: &Ctx<'js>, id: u64) -> rquickjs::Result<Option<Value<'js>>> {
        let saved = self.handles.borrow().get(&id).cloned();
        saved.map(|saved| saved.restore(ctx)).transpose()
    }

    pub(crate) fn hold_callback<'js>(&self, ctx: &Ctx<'js>, id: u64, function: Function<'js>) {
        let saved = Persistent::save(ctx, function);
        self.callbacks.borrow_mut().insert(id, saved);
    }

    pub(crate) fn callback<'js>(
        &self,
        ctx: &Ctx<'js>,
        id: u64,
    ) -> rquickjs::Result<Option<Function<'js>>> {
        let saved = self.callbacks.borrow().get(&id).cloned();
        saved.map(|saved| saved.restore(ctx)).transpose()
    }

    pub(crate) fn set_prototype<'js>(&self, ctx: &Ctx<'js>, type_id: TypeId, prototype: Object<'js>) {
        let saved = Persistent::save(ctx, prototype);
        self.prototypes.borrow_mut().insert(type_id, saved);
    }

    pub(crate) fn prototype<'js>(
        &self,
        ctx: &Ctx<'js>,
        type_id: TypeId,
    ) -> rquickjs::Result<Option<Object<'js>>> {
        let saved = self.prototypes.borrow().get(&type_id).cloned();
        saved.map(|saved| saved.restore(ctx)).transpose()
    }

    /// The shared proxy handler, built on first use by `build`.
    pub(crate) fn handler<'js>(
        &self,
        ctx: &Ctx<'js>,
        build: impl FnOnce(&Ctx<'js>) -> rquickjs::Result<Object<'js>>,
    ) -> rquickjs::Result<Object<'js>> {
        let cached = self.handler.borrow().clone();
        if let Some(saved) = cached {
            return saved.restore(ctx);
        }
        let handler = build(ctx)?;
        *self.handler.borrow_mut() = Some(Persistent::save(ctx, handler.clone()));
        Ok(handler)
    }

    pub(crate) fn proxy<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.proxy.clone().restore(ctx)
    }

    pub(crate) fn marker<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.marker.clone().restore(ctx)
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.handles.borrow().len() + self.callbacks.borrow().len()
    }
}

pub(crate) fn install_slot(id: u64, slot: RuntimeSlot) -> Rc<RuntimeSlot> {
    let slot = Rc::new(slot);
    SLOTS.with(|slots| slots.borrow_mut().insert(id, Rc::clone(&slot)));
    slot
}

/// Forget runtime `id`; host functions calling into it fail from now on.
pub(crate) fn remove_slot(id: u64) {
    SLOTS.with(|slots| slots.borrow_mut().remove(&id));
}

pub(crate) fn slot(id: u64) -> Option<Rc<RuntimeSlot>> {
    SLOTS.with(|slots| slots.borrow().get(&id).cloned())
}

/// Marks a context as active on this thread until dropped.
pub(crate) struct ActiveScope {
    depth: usize,
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().truncate(self.depth));
    }
}

/// Record `ctx` as the active context of runtime `id`.
pub(crate) fn activate(id: u64, ctx: &Ctx<'_>) -> ActiveScope {
    // SAFETY: the erased context is only handed out while the returned
    // guard lives, and the guard cannot outlive the borrow of `ctx`'s
    // enclosing `Context::with` call or host callback.
    let erased = unsafe { std::mem::transmute::<Ctx<'_>, Ctx<'static>>(ctx.clone()) };
    ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        let depth = active.len();
        active.push((id, erased));
        ActiveScope { depth }
    })
}

fn active_ctx(id: u64) -> Option<Ctx<'static>> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .iter()
            .rev()
            .find(|(runtime, _)| *runtime == id)
            .map(|(_, ctx)| ctx.clone())
    })
}

/// Run `f` inside runtime `id`: in its already active context when there
/// is one, otherwise in a freshly entered one. `None` when the runtime no
/// longer exists on this thread.
pub(crate) fn enter<R>(
    id: u64,
    f: impl for<'js> FnOnce(&Ctx<'js>, &RuntimeSlot) -> R,
) -> Option<R> {
    slot(id).map(|slot| enter_slot(&slot, f))
}

pub(crate) fn enter_slot<R>(
    slot: &RuntimeSlot,
    f: impl for<'js> FnOnce(&Ctx<'js>, &RuntimeSlot) -> R,
) -> R {
    let id = slot.bridge.id();
    if let Some(ctx) = active_ctx(id) {
        slot.drain_released();
        return f(&ctx, slot);
    }
    slot.context.clone().with(|ctx| {
        let _active = activate(id, &ctx);
        slot.drain_released();
        f(&ctx, slot)
    })
}
