//! The bridge
//!
//! One `Bridge` per runtime. It owns the binding registry and the ownership
//! table and holds no script values itself, so host closures can keep it
//! and it can cross threads; anything script-side is reached through the
//! runtime's slot on the thread that created it.

use crate::error::{describe, BindError, BridgeError};
use crate::interceptor;
use crate::ownership::OwnershipTable;
use crate::registry::{BindingMeta, BindingRegistry};
use crate::scope::{self, RuntimeSlot};
use crate::settings::BridgeSettings;
use crate::wrapper::{Instance, InstanceWrapper};
use rquickjs::function::This;
use rquickjs::function::Constructor;
use rquickjs::{Class, Ctx, Function, Object, Value};
use std::rc::Rc;
use std::sync::Arc;
use tether_core::{HandleIndex, StructDescriptor, StructRef};
use tracing::{debug, trace};

pub struct Bridge {
    id: u64,
    settings: BridgeSettings,
    registry: BindingRegistry,
    ownership: Arc<OwnershipTable>,
    handles: Arc<HandleIndex>,
}

impl Bridge {
    pub fn new(id: u64, settings: BridgeSettings) -> Self {
        Self {
            id,
            settings,
            registry: BindingRegistry::new(),
            ownership: Arc::new(OwnershipTable::new()),
            handles: HandleIndex::new(id),
        }
    }

    /// Id of the runtime this bridge belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    pub fn ownership(&self) -> &Arc<OwnershipTable> {
        &self.ownership
    }

    /// Ids of the script values the host holds through `ScriptValue`.
    pub fn handles(&self) -> &Arc<HandleIndex> {
        &self.handles
    }

    pub(crate) fn slot(&self, ctx: &Ctx<'_>) -> rquickjs::Result<Rc<RuntimeSlot>> {
        scope::slot(self.id)
            .ok_or_else(|| BridgeError::NotInstalled { runtime: self.id }.throw(ctx))
    }

    /// The bridge of runtime `runtime`, from inside one of its callbacks.
    pub(crate) fn current(ctx: &Ctx<'_>, runtime: u64) -> rquickjs::Result<Arc<Bridge>> {
        scope::slot(runtime)
            .map(|slot| Arc::clone(slot.bridge()))
            .ok_or_else(|| BridgeError::NotInstalled { runtime }.throw(ctx))
    }

    /// Expose a struct type as global class `class_name`.
    ///
    /// The class is only registered once its constructor is on the global
    /// object, so a failed install leaves nothing behind and can be retried.
    pub fn bind_struct<'js>(
        &self,
        ctx: &Ctx<'js>,
        class_name: &str,
        descriptor: &'static StructDescriptor,
    ) -> Result<Arc<BindingMeta>, BindError> {
        self.registry.check_vacant(class_name, descriptor)?;
        let install_failed = |error: rquickjs::Error| BindError::Install {
            name: class_name.to_string(),
            message: describe(ctx, error),
        };

        let meta = Arc::new(BindingMeta::new(class_name, descriptor));
        let slot = self.slot(ctx).map_err(install_failed)?;
        let (constructor, prototype) = self
            .class_constructor(ctx, &meta)
            .map_err(install_failed)?;
        install_global(ctx, class_name, constructor.into_value())?;

        let meta = self.registry.register(meta)?;
        slot.set_prototype(ctx, descriptor.type_id(), prototype);
        debug!(
            class = class_name,
            host_type = descriptor.name(),
            special_fields = meta.special_fields().len(),
            "bound struct"
        );
        Ok(meta)
    }

    /// Constructor function and instance prototype of a class.
    fn class_constructor<'js>(
        &self,
        ctx: &Ctx<'js>,
        meta: &Arc<BindingMeta>,
    ) -> rquickjs::Result<(Function<'js>, Object<'js>)> {
        let runtime = self.id;
        let class = Arc::clone(meta);
        let constructor = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let _active = scope::activate(runtime, &ctx);
                // `new` passes the constructor itself as `this`
                if !this.0.is_function() {
                    return Err(BridgeError::ConstructorCall {
                        class: class.class_name().to_string(),
                    }
                    .throw(&ctx));
                }
                let bridge = Bridge::current(&ctx, runtime)?;
                trace!(class = class.class_name(), "constructing instance");
                bridge.new_instance(&ctx, class.descriptor().zero(), &class)
            },
        )?
        .with_name(meta.class_name())?;
        constructor.set_constructor(true);

        let to_json = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let _active = scope::activate(runtime, &ctx);
                interceptor::json_view(&ctx, runtime, this.0)
            },
        )?
        .with_name("toJSON")?;

        let prototype = Object::new(ctx.clone())?;
        define_hidden(ctx, &prototype, "constructor", constructor.clone().into_value())?;
        define_hidden(ctx, &prototype, "toJSON", to_json.into_value())?;
        define_hidden(ctx, &constructor, "prototype", prototype.clone().into_value())?;
        Ok((constructor, prototype))
    }

    /// Script object for `target`: a proxy over a fresh instance wrapper
    /// whose struct is retained in the ownership table.
    pub(crate) fn new_instance<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: StructRef,
        meta: &Arc<BindingMeta>,
    ) -> rquickjs::Result<Value<'js>> {
        let slot = self.slot(ctx)?;
        let wrapper = InstanceWrapper::new(
            ctx,
            target,
            Arc::clone(meta),
            Arc::clone(&self.ownership),
        )?;
        let owner_id = wrapper.retain();
        let instance = Class::instance(ctx.clone(), wrapper)?;
        if let Some(prototype) = slot.prototype(ctx, meta.descriptor().type_id())? {
            instance.set_prototype(Some(&prototype))?;
        }

        let runtime = self.id;
        let handler = slot.handler(ctx, |ctx| interceptor::handler(ctx, runtime))?;
        let proxy: Constructor = slot.proxy(ctx)?.get()?;
        let object: Value = proxy.construct((instance, handler))?;
        trace!(class = meta.class_name(), owner_id, "wrapped struct");
        Ok(object)
    }

    /// Script object for a host struct, or `undefined` when its type is not
    /// bound.
    pub(crate) fn wrap_struct<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: &StructRef,
    ) -> rquickjs::Result<Value<'js>> {
        let Some(meta) = self.registry.get(target.descriptor().type_id()) else {
            trace!(host_type = target.type_name(), "struct type is not bound");
            return Ok(Value::new_undefined(ctx.clone()));
        };
        self.new_instance(ctx, target.clone(), &meta)
    }

    /// The wrapper class object behind a bound instance proxy.
    pub(crate) fn instance_of<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
    ) -> rquickjs::Result<Option<Instance<'js>>> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let marker = self.slot(ctx)?.marker(ctx)?;
        let inner: Value = object.get(marker)?;
        Ok(inner.get::<Instance<'js>>().ok())
    }

    /// Host struct behind a bound instance, if `value` is an instance of
    /// `meta`'s class.
    pub(crate) fn unwrap_struct<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
        meta: &BindingMeta,
    ) -> rquickjs::Result<Option<StructRef>> {
        let Some(instance) = self.instance_of(ctx, value)? else {
            return Ok(None);
        };
        let wrapper = instance.borrow();
        if wrapper.meta().descriptor().type_id() != meta.descriptor().type_id() {
            return Ok(None);
        }
        Ok(Some(wrapper.target().clone()))
    }
}

/// Define read-only global `name`.
pub(crate) fn install_global<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    value: Value<'js>,
) -> Result<(), BindError> {
    let define = || -> rquickjs::Result<()> {
        let descriptor = Object::new(ctx.clone())?;
        descriptor.set("value", value)?;
        descriptor.set("writable", false)?;
        descriptor.set("enumerable", true)?;
        descriptor.set("configurable", false)?;
        define_property(ctx, &ctx.globals(), name, descriptor)
    };
    define().map_err(|error| BindError::Install {
        name: name.to_string(),
        message: describe(ctx, error),
    })
}

/// Non-enumerable property, the way built-in prototypes carry theirs.
fn define_hidden<'js>(
    ctx: &Ctx<'js>,
    target: &Object<'js>,
    key: &str,
    value: Value<'js>,
) -> rquickjs::Result<()> {
    let descriptor = Object::new(ctx.clone())?;
    descriptor.set("value", value)?;
    descriptor.set("writable", true)?;
    descriptor.set("enumerable", false)?;
    descriptor.set("configurable", true)?;
    define_property(ctx, target, key, descriptor)
}

fn define_property<'js>(
    ctx: &Ctx<'js>,
    target: &Object<'js>,
    key: &str,
    descriptor: Object<'js>,
) -> rquickjs::Result<()> {
    let object: Object = ctx.globals().get("Object")?;
    let define: Function = object.get("defineProperty")?;
    define.call::<_, Value>((target.clone(), key, descriptor))?;
    Ok(())
}
