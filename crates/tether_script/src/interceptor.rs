//! Property interceptor for bound instances
//!
//! Every instance script sees is a `Proxy` over its `InstanceWrapper` class
//! object, sharing one handler per runtime. Reads resolve tagged field,
//! native field, method, then the dynamic bag; the first match wins. Writes
//! resolve tagged field, native field, then go to the dynamic bag.
//! Array-index keys only ever touch the dynamic bag.
//!
//! A read no tier answers falls back to the class prototype chain, which is
//! where `constructor`, `toJSON` and the `Object.prototype` builtins live.
//! Anything else is a `PropertyNotFound` error.

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::registry::BindingMeta;
use crate::scope;
use crate::wrapper::Instance;
use rquickjs::{Ctx, Function, IntoJs, Object, Value};
use std::sync::Arc;
use tether_core::StructRef;
use tracing::trace;

/// The shared proxy handler of runtime `runtime`.
pub(crate) fn handler<'js>(ctx: &Ctx<'js>, runtime: u64) -> rquickjs::Result<Object<'js>> {
    let handler = Object::new(ctx.clone())?;
    handler.set(
        "get",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>| {
                let _active = scope::activate(runtime, &ctx);
                get(&ctx, runtime, &instance, key)
            },
        )?,
    )?;
    handler.set(
        "set",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>, value: Value<'js>| {
                let _active = scope::activate(runtime, &ctx);
                set(&ctx, runtime, &instance, key, value)
            },
        )?,
    )?;
    handler.set(
        "has",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>| {
                let _active = scope::activate(runtime, &ctx);
                has(&instance, key)
            },
        )?,
    )?;
    handler.set(
        "deleteProperty",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>| {
                let _active = scope::activate(runtime, &ctx);
                delete(&instance, key)
            },
        )?,
    )?;
    handler.set(
        "ownKeys",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>| {
                let _active = scope::activate(runtime, &ctx);
                own_keys(&instance)
            },
        )?,
    )?;
    handler.set(
        "getOwnPropertyDescriptor",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>| {
                let _active = scope::activate(runtime, &ctx);
                describe_property(&ctx, runtime, &instance, key)
            },
        )?,
    )?;
    handler.set(
        "defineProperty",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, instance: Instance<'js>, key: Value<'js>, descriptor: Object<'js>| {
                let _active = scope::activate(runtime, &ctx);
                define(&ctx, runtime, &instance, key, descriptor)
            },
        )?,
    )?;
    Ok(handler)
}

/// Canonical array index: `"0"`, `"7"`, never `"07"` or `"-1"`.
fn array_index(name: &str) -> Option<u32> {
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    name.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}

/// String keys by name; `None` for symbols.
fn key_name(key: &Value<'_>) -> rquickjs::Result<Option<String>> {
    match key.as_string() {
        Some(text) => text.to_string().map(Some),
        None => Ok(None),
    }
}

fn parts(instance: &Instance<'_>) -> (Arc<BindingMeta>, StructRef) {
    let wrapper = instance.borrow();
    (Arc::clone(wrapper.meta()), wrapper.target().clone())
}

/// A named structural member: tagged or native field, or method.
fn is_structural(meta: &BindingMeta, name: &str) -> bool {
    array_index(name).is_none() && meta.is_member(name)
}

fn get<'js>(
    ctx: &Ctx<'js>,
    runtime: u64,
    instance: &Instance<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let bridge = Bridge::current(ctx, runtime)?;
    let Some(name) = key_name(&key)? else {
        if key == bridge.slot(ctx)?.marker(ctx)? {
            return instance.clone().into_js(ctx);
        }
        return instance.get(key);
    };
    get_named(ctx, &bridge, instance, &name)
}

fn get_named<'js>(
    ctx: &Ctx<'js>,
    bridge: &Bridge,
    instance: &Instance<'js>,
    name: &str,
) -> rquickjs::Result<Value<'js>> {
    let (meta, target) = parts(instance);
    let named = array_index(name).is_none();

    if let Some(field) = meta.field(name).filter(|_| named) {
        trace!(class = meta.class_name(), field = name, "get field");
        return bridge.read_field(ctx, &target, field);
    }

    if let Some(method) = meta.method(name).filter(|_| named) {
        trace!(class = meta.class_name(), method = name, "get method");
        let bound = method.bind(&target).renamed(meta.qualified(name));
        return Ok(bridge.wrap_function(ctx, bound)?.into_value());
    }

    if let Some(value) = instance.borrow().get_dynamic(name)? {
        return Ok(value);
    }

    if named && instance.contains_key(name)? {
        return instance.get(name);
    }
    Err(BridgeError::PropertyNotFound {
        class: meta.class_name().to_string(),
        property: name.to_string(),
    }
    .throw(ctx))
}

fn set<'js>(
    ctx: &Ctx<'js>,
    runtime: u64,
    instance: &Instance<'js>,
    key: Value<'js>,
    value: Value<'js>,
) -> rquickjs::Result<bool> {
    let Some(name) = key_name(&key)? else {
        instance.set(key, value)?;
        return Ok(true);
    };
    let (meta, target) = parts(instance);

    let Some(field) = meta.field(&name).filter(|_| array_index(&name).is_none()) else {
        trace!(class = meta.class_name(), property = %name, "set dynamic");
        instance.borrow().set_dynamic(&name, value)?;
        return Ok(true);
    };

    trace!(class = meta.class_name(), field = %name, "set field");
    let bridge = Bridge::current(ctx, runtime)?;
    let stored = match bridge.from_script(ctx, &value, field.ty())? {
        Some(converted) => target.set_field(field.index(), converted),
        None => false,
    };
    if !stored {
        // the field keeps its previous value
        bridge.coercion_failed(ctx, field.ty(), &meta.qualified(&name))?;
    }
    Ok(true)
}

fn has<'js>(instance: &Instance<'js>, key: Value<'js>) -> rquickjs::Result<bool> {
    let Some(name) = key_name(&key)? else {
        return instance.contains_key(key);
    };
    let (meta, _) = parts(instance);
    if is_structural(&meta, &name) {
        return Ok(true);
    }
    instance.borrow().has_dynamic(&name)
}

/// Structural members are not deletable.
fn delete<'js>(instance: &Instance<'js>, key: Value<'js>) -> rquickjs::Result<bool> {
    let Some(name) = key_name(&key)? else {
        instance.remove(key)?;
        return Ok(true);
    };
    let (meta, _) = parts(instance);
    if is_structural(&meta, &name) {
        return Ok(false);
    }
    instance.borrow().delete_dynamic(&name)?;
    Ok(true)
}

/// Index names ascending, then field names in declaration order, then
/// methods, then the remaining dynamic names in insertion order.
pub(crate) fn own_keys(instance: &Instance<'_>) -> rquickjs::Result<Vec<String>> {
    let (meta, _) = parts(instance);
    let dynamic = instance.borrow().dynamic_names()?;

    let mut names: Vec<String> = dynamic
        .iter()
        .filter(|name| array_index(name).is_some())
        .cloned()
        .collect();
    for name in meta.member_names() {
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    }
    for name in dynamic {
        if array_index(&name).is_none() && !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn describe_property<'js>(
    ctx: &Ctx<'js>,
    runtime: u64,
    instance: &Instance<'js>,
    key: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let Some(name) = key_name(&key)? else {
        return Ok(Value::new_undefined(ctx.clone()));
    };
    if !has(instance, key)? {
        return Ok(Value::new_undefined(ctx.clone()));
    }
    let bridge = Bridge::current(ctx, runtime)?;
    let descriptor = Object::new(ctx.clone())?;
    descriptor.set("value", get_named(ctx, &bridge, instance, &name)?)?;
    descriptor.set("writable", true)?;
    descriptor.set("enumerable", true)?;
    descriptor.set("configurable", true)?;
    Ok(descriptor.into_value())
}

/// `Object.defineProperty` on an instance: data descriptors are plain
/// writes, anything non-configurable or accessor-based is refused.
fn define<'js>(
    ctx: &Ctx<'js>,
    runtime: u64,
    instance: &Instance<'js>,
    key: Value<'js>,
    descriptor: Object<'js>,
) -> rquickjs::Result<bool> {
    let locked = descriptor.get::<_, Option<bool>>("configurable")? == Some(false);
    let accessor = descriptor.contains_key("get")? || descriptor.contains_key("set")?;
    if locked || accessor {
        return Ok(false);
    }
    let value: Value = descriptor.get("value")?;
    set(ctx, runtime, instance, key, value)
}

/// Plain object of an instance's fields and dynamic properties; backs the
/// prototype's `toJSON`.
pub(crate) fn json_view<'js>(
    ctx: &Ctx<'js>,
    runtime: u64,
    this: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    let bridge = Bridge::current(ctx, runtime)?;
    let Some(instance) = bridge.instance_of(ctx, &this)? else {
        return Ok(Value::new_undefined(ctx.clone()));
    };
    let (meta, _) = parts(&instance);
    let view = Object::new(ctx.clone())?;
    for name in own_keys(&instance)? {
        if meta.method(&name).is_some() {
            continue;
        }
        view.set(name.as_str(), get_named(ctx, &bridge, &instance, &name)?)?;
    }
    Ok(view.into_value())
}
