//! Value marshaling
//!
//! `to_script` and `from_script` convert between `HostValue` and script
//! values, guided by the host side's `TypeDescriptor`.
//!
//! Outbound, integers narrower than a machine word become script integers and
//! wider ones become script numbers, so 64-bit values above 2^53 lose
//! precision. Sequences and maps are copied.
//!
//! Inbound, primitives are coerced the way script converts them
//! (`ToBoolean`, `ToString`, `ToInt32`, ...). A value whose shape cannot fill
//! the target (a string for a sequence, a primitive for a map, an array
//! longer than `max_sequence_length`) yields `None`; callers then leave the
//! target zero-valued unless strict coercion is on.

use crate::bridge::Bridge;
use crate::error::{describe, BridgeError};
use crate::scope::{self, RuntimeSlot};
use rquickjs::function::{Rest, This};
use rquickjs::function::Constructor;
use rquickjs::{Array, Coerced, Ctx, Function, Object, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tether_core::{
    CallError, FieldDescriptor, FunctionSignature, HostFunction, HostValue, IntWidth, ScriptValue,
    StructRef, TypeDescriptor,
};
use tracing::{trace, warn};

/// Descriptor for values with no declared host type.
static UNTYPED: TypeDescriptor = TypeDescriptor::Handle;

impl Bridge {
    /// Host value to script value.
    pub fn to_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &HostValue,
        descriptor: &TypeDescriptor,
    ) -> rquickjs::Result<Value<'js>> {
        match (descriptor, value) {
            (TypeDescriptor::Unsupported { .. }, _) => Ok(Value::new_undefined(ctx.clone())),
            (TypeDescriptor::Int(width), HostValue::Int(number)) => {
                Ok(int_to_script(ctx, *number, *width))
            }
            (TypeDescriptor::Uint(width), HostValue::Uint(number)) => {
                Ok(uint_to_script(ctx, *number, *width))
            }
            (TypeDescriptor::Sequence(element), HostValue::Sequence(items)) => {
                self.sequence_to_script(ctx, items, element)
            }
            (TypeDescriptor::Map(_, element), HostValue::Map(entries)) => {
                self.map_to_script(ctx, entries, element)
            }
            _ => self.value_to_script(ctx, value),
        }
    }

    /// Outbound conversion driven by the value alone.
    fn value_to_script<'js>(&self, ctx: &Ctx<'js>, value: &HostValue) -> rquickjs::Result<Value<'js>> {
        let converted = match value {
            HostValue::Undefined => Value::new_undefined(ctx.clone()),
            HostValue::Bool(flag) => Value::new_bool(ctx.clone(), *flag),
            HostValue::String(text) => rquickjs::String::from_str(ctx.clone(), text)?.into_value(),
            HostValue::Int(number) => match i32::try_from(*number) {
                Ok(small) => Value::new_int(ctx.clone(), small),
                Err(_) => Value::new_float(ctx.clone(), *number as f64),
            },
            HostValue::Uint(number) => match i32::try_from(*number) {
                Ok(small) => Value::new_int(ctx.clone(), small),
                Err(_) => Value::new_float(ctx.clone(), *number as f64),
            },
            HostValue::Float(number) => Value::new_float(ctx.clone(), *number),
            HostValue::Sequence(items) => self.sequence_to_script(ctx, items, &UNTYPED)?,
            HostValue::Map(entries) => self.map_to_script(ctx, entries, &UNTYPED)?,
            HostValue::Struct(target) => self.wrap_struct(ctx, target)?,
            HostValue::Function(function) => self.wrap_function(ctx, function.clone())?.into_value(),
            HostValue::Time(time) => {
                let date: Constructor = ctx.globals().get("Date")?;
                date.construct((time_to_ms(*time),))?
            }
            HostValue::Script(held) => self.held_value(ctx, held)?,
        };
        Ok(converted)
    }

    /// The script value behind a host-held token. Tokens of another runtime
    /// read as `undefined`.
    fn held_value<'js>(&self, ctx: &Ctx<'js>, held: &ScriptValue) -> rquickjs::Result<Value<'js>> {
        let undefined = || Value::new_undefined(ctx.clone());
        let Some(handle) = held.handle() else {
            return Ok(undefined());
        };
        if !self.handles().owns(handle) {
            trace!(handle = handle.id(), "script value belongs to another runtime");
            return Ok(undefined());
        }
        let slot = self.slot(ctx)?;
        if let Some(value) = slot.held(ctx, handle.id())? {
            return Ok(value);
        }
        Ok(slot
            .callback(ctx, handle.id())?
            .map(Function::into_value)
            .unwrap_or_else(undefined))
    }

    fn sequence_to_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        items: &[HostValue],
        element: &TypeDescriptor,
    ) -> rquickjs::Result<Value<'js>> {
        let array = Array::new(ctx.clone())?;
        for (index, item) in items.iter().enumerate() {
            array.set(index, self.to_script(ctx, item, element)?)?;
        }
        Ok(array.into_value())
    }

    /// String keys become properties and integer keys become elements;
    /// other keys are skipped.
    fn map_to_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        entries: &[(HostValue, HostValue)],
        element: &TypeDescriptor,
    ) -> rquickjs::Result<Value<'js>> {
        let object = Object::new(ctx.clone())?;
        for (key, value) in entries {
            let key = match key {
                HostValue::String(text) => text.clone(),
                HostValue::Int(number) => number.to_string(),
                HostValue::Uint(number) => number.to_string(),
                _ => continue,
            };
            object.set(key, self.to_script(ctx, value, element)?)?;
        }
        Ok(object.into_value())
    }

    /// Field `field` of `target`. A by-value struct field comes back as a
    /// projection, so writes to it land in `target`.
    pub(crate) fn read_field<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: &StructRef,
        field: &FieldDescriptor,
    ) -> rquickjs::Result<Value<'js>> {
        let value = match target.project(field.index()) {
            Some(projection) => HostValue::Struct(projection),
            None => target.field(field.index()),
        };
        self.to_script(ctx, &value, field.ty())
    }

    /// Script value to host value. `None` when the value's shape cannot
    /// satisfy `descriptor`.
    pub fn from_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
        descriptor: &TypeDescriptor,
    ) -> rquickjs::Result<Option<HostValue>> {
        let converted = match descriptor {
            TypeDescriptor::Bool => HostValue::Bool(value.get::<Coerced<bool>>()?.0),
            TypeDescriptor::String => HostValue::String(value.get::<Coerced<String>>()?.0),
            // ToUint32 is ToInt32 reinterpreted
            TypeDescriptor::Int(width) if width.is_narrow() => {
                HostValue::Int(i64::from(value.get::<Coerced<i32>>()?.0))
            }
            TypeDescriptor::Uint(width) if width.is_narrow() => {
                HostValue::Uint(u64::from(value.get::<Coerced<i32>>()?.0 as u32))
            }
            // saturating, NaN becomes 0
            TypeDescriptor::Int(_) => HostValue::Int(value.get::<Coerced<f64>>()?.0 as i64),
            TypeDescriptor::Uint(_) => HostValue::Uint(value.get::<Coerced<f64>>()?.0 as u64),
            TypeDescriptor::Float(_) => HostValue::Float(value.get::<Coerced<f64>>()?.0),
            TypeDescriptor::Sequence(element) => {
                return self.sequence_from_script(ctx, value, element);
            }
            TypeDescriptor::Map(key, element) => {
                return self.map_from_script(ctx, value, key, element);
            }
            TypeDescriptor::Struct(struct_type) => {
                let Some(meta) = self.registry().get(struct_type.type_id()) else {
                    return Ok(None);
                };
                return Ok(self
                    .unwrap_struct(ctx, value, &meta)?
                    .map(HostValue::Struct));
            }
            TypeDescriptor::Pointer(inner) => return self.from_script(ctx, value, inner),
            TypeDescriptor::Function(signature) => {
                let Some(function) = value.as_function() else {
                    return Ok(None);
                };
                HostValue::Function(self.script_function(ctx, function.clone(), signature.clone())?)
            }
            TypeDescriptor::Time => match date_value(value)?.and_then(ms_to_time) {
                Some(time) => HostValue::Time(time),
                None => return Ok(None),
            },
            TypeDescriptor::Handle => HostValue::Script(self.hold(ctx, value)?),
            TypeDescriptor::Unsupported { .. } => return Ok(None),
        };
        Ok(Some(converted))
    }

    fn sequence_from_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
        element: &TypeDescriptor,
    ) -> rquickjs::Result<Option<HostValue>> {
        let Some(array) = value.as_array() else {
            return Ok(None);
        };
        let length = array.len();
        let limit = self.settings().max_sequence_length;
        if length > limit {
            trace!(length, limit, "array is longer than the sequence limit");
            return Ok(None);
        }
        let mut items = Vec::with_capacity(length);
        for index in 0..length {
            let item: Value = array.get(index)?;
            let target = format!("[{}]", index);
            items.push(self.coerce(ctx, &item, element, &target)?);
        }
        Ok(Some(HostValue::Sequence(items)))
    }

    fn map_from_script<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
        key: &TypeDescriptor,
        element: &TypeDescriptor,
    ) -> rquickjs::Result<Option<HostValue>> {
        // primitives have no keys to enumerate
        let Some(object) = value.as_object() else {
            return Ok(None);
        };
        let mut entries = Vec::new();
        for name in object.keys::<String>() {
            let name = name?;
            let Some(host_key) = map_key(&name, key) else {
                continue;
            };
            let item: Value = object.get(name.as_str())?;
            entries.push((host_key, self.coerce(ctx, &item, element, &name)?));
        }
        Ok(Some(HostValue::Map(entries)))
    }

    /// `from_script`, with the zero value standing in for an unsatisfiable
    /// shape (or a `CoercionFailed` exception under strict coercion).
    pub fn coerce<'js>(
        &self,
        ctx: &Ctx<'js>,
        value: &Value<'js>,
        descriptor: &TypeDescriptor,
        target: &str,
    ) -> rquickjs::Result<HostValue> {
        match self.from_script(ctx, value, descriptor)? {
            Some(converted) => Ok(converted),
            None => {
                self.coercion_failed(ctx, descriptor, target)?;
                Ok(descriptor.zero_value())
            }
        }
    }

    /// Policy for a dropped conversion: raise when strict, otherwise
    /// optionally log.
    pub(crate) fn coercion_failed(
        &self,
        ctx: &Ctx<'_>,
        descriptor: &TypeDescriptor,
        target: &str,
    ) -> rquickjs::Result<()> {
        let expected = descriptor.kind_name();
        if self.settings().strict_coercion {
            return Err(BridgeError::CoercionFailed {
                target: target.to_string(),
                expected,
            }
            .throw(ctx));
        }
        if self.settings().report_coercion_failures {
            warn!(target, expected = %expected, "script value does not fit, keeping zero value");
        } else {
            trace!(target, expected = %expected, "coercion skipped");
        }
        Ok(())
    }

    /// Keep `value` alive for the host behind a `ScriptValue` token.
    fn hold<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<ScriptValue> {
        if value.is_undefined() {
            return Ok(ScriptValue::Undefined);
        }
        let handle = self.handles().issue();
        self.slot(ctx)?.hold(ctx, handle.id(), value.clone());
        Ok(ScriptValue::Held(handle))
    }

    /// Host view of a script function. Each call re-enters the runtime; the
    /// function stays alive until the returned value is dropped.
    fn script_function<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: Function<'js>,
        signature: Arc<FunctionSignature>,
    ) -> rquickjs::Result<HostFunction> {
        let name = function
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_default();
        let handle = self.handles().issue();
        self.slot(ctx)?.hold_callback(ctx, handle.id(), function);
        let runtime = self.id();

        Ok(HostFunction::from_parts(name, Arc::clone(&signature), move |args| {
            scope::enter(runtime, |ctx, slot| call_script(ctx, slot, handle.id(), &signature, args))
                .unwrap_or(Err(CallError::RuntimeGone))
        }))
    }
}

fn call_script<'js>(
    ctx: &Ctx<'js>,
    slot: &RuntimeSlot,
    id: u64,
    signature: &FunctionSignature,
    args: Vec<HostValue>,
) -> Result<Vec<HostValue>, CallError> {
    let script_error = |error: rquickjs::Error| CallError::Script {
        message: describe(ctx, error),
    };
    let callee = slot
        .callback(ctx, id)
        .map_err(script_error)?
        .ok_or(CallError::RuntimeGone)?;
    let bridge = slot.bridge();

    let mut script_args = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let descriptor = parameter_descriptor(signature, index);
        script_args.push(bridge.to_script(ctx, arg, descriptor).map_err(script_error)?);
    }
    let result: Value = callee.call((Rest(script_args),)).map_err(script_error)?;

    let returns = &signature.returns;
    match returns.len() {
        0 => Ok(Vec::new()),
        1 => Ok(vec![bridge
            .coerce(ctx, &result, &returns[0], "return value")
            .map_err(script_error)?]),
        _ => {
            let mut values = Vec::with_capacity(returns.len());
            for (index, descriptor) in returns.iter().enumerate() {
                let item = match result.as_array() {
                    Some(array) => array.get(index).map_err(script_error)?,
                    None => Value::new_undefined(ctx.clone()),
                };
                let target = format!("return value {}", index);
                values.push(bridge.coerce(ctx, &item, descriptor, &target).map_err(script_error)?);
            }
            Ok(values)
        }
    }
}

fn int_to_script<'js>(ctx: &Ctx<'js>, number: i64, width: IntWidth) -> Value<'js> {
    if width.is_narrow() {
        Value::new_int(ctx.clone(), number as i32)
    } else {
        Value::new_float(ctx.clone(), number as f64)
    }
}

/// A narrow unsigned value above `i32::MAX` does not fit the script integer.
fn uint_to_script<'js>(ctx: &Ctx<'js>, number: u64, width: IntWidth) -> Value<'js> {
    match i32::try_from(number) {
        Ok(small) if width.is_narrow() => Value::new_int(ctx.clone(), small),
        _ => Value::new_float(ctx.clone(), number as f64),
    }
}

fn map_key(name: &str, key: &TypeDescriptor) -> Option<HostValue> {
    match key {
        TypeDescriptor::String | TypeDescriptor::Handle => Some(HostValue::String(name.to_string())),
        TypeDescriptor::Int(_) => name.parse().ok().map(HostValue::Int),
        TypeDescriptor::Uint(_) => name.parse().ok().map(HostValue::Uint),
        TypeDescriptor::Float(_) => name.parse().ok().map(HostValue::Float),
        TypeDescriptor::Bool => name.parse().ok().map(HostValue::Bool),
        _ => None,
    }
}

/// Milliseconds of a `Date`, through its own `getTime`.
fn date_value<'js>(value: &Value<'js>) -> rquickjs::Result<Option<f64>> {
    let Some(object) = value.as_object() else {
        return Ok(None);
    };
    let get_time: Value = object.get("getTime")?;
    let Some(get_time) = get_time.as_function() else {
        return Ok(None);
    };
    get_time.call((This(value.clone()),))
}

pub(crate) fn time_to_ms(time: SystemTime) -> f64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(after) => duration_ms(after),
        Err(before) => -duration_ms(before.duration()),
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_millis() as f64 + f64::from(duration.subsec_nanos() % 1_000_000) / 1_000_000.0
}

pub(crate) fn ms_to_time(ms: f64) -> Option<SystemTime> {
    if !ms.is_finite() {
        return None;
    }
    let whole = ms.abs().trunc();
    let offset = Duration::from_millis(whole as u64)
        + Duration::from_nanos(((ms.abs() - whole) * 1_000_000.0) as u64);
    if ms >= 0.0 {
        SystemTime::UNIX_EPOCH.checked_add(offset)
    } else {
        SystemTime::UNIX_EPOCH.checked_sub(offset)
    }
}

/// Descriptor of argument `index`: a fixed parameter, or the element type
/// of the trailing variadic one.
pub(crate) fn parameter_descriptor(signature: &FunctionSignature, index: usize) -> &TypeDescriptor {
    if index < signature.fixed_count() {
        return &signature.params[index];
    }
    signature
        .rest_element()
        .or_else(|| signature.params.get(index))
        .unwrap_or(&UNTYPED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptRuntime;
    use crate::settings::RuntimeSettings;
    use std::collections::{BTreeMap, HashMap};
    use tether_core::{resolve, HostOnly, HostType};

    fn round_trip<T: HostType>(runtime: &ScriptRuntime, value: T) -> Option<T> {
        runtime.with(|ctx| {
            let bridge = runtime.bridge();
            let descriptor = resolve::<T>();
            let script = bridge.to_script(ctx, &value.to_host(), &descriptor).ok()?;
            let back = bridge.from_script(ctx, &script, &descriptor).ok()??;
            T::from_host(back)
        })
    }

    #[test]
    fn integers_pick_representation_by_width() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.with(|ctx| {
            let bridge = runtime.bridge();
            let small = bridge.to_script(ctx, &HostValue::Int(-7), &resolve::<i32>()).unwrap();
            assert_eq!(small.as_int(), Some(-7));
            let big = bridge
                .to_script(ctx, &HostValue::Uint(u64::from(u32::MAX)), &resolve::<u32>())
                .unwrap();
            assert_eq!(big.as_int(), None);
            assert_eq!(big.as_float(), Some(f64::from(u32::MAX)));
            let wide = bridge.to_script(ctx, &HostValue::Int(5), &resolve::<i64>()).unwrap();
            assert_eq!(wide.as_float(), Some(5.0));
        });
    }

    #[test]
    fn primitives_round_trip() {
        let runtime = ScriptRuntime::new().unwrap();
        assert_eq!(round_trip(&runtime, true), Some(true));
        assert_eq!(round_trip(&runtime, "héllo".to_string()), Some("héllo".to_string()));
        assert_eq!(round_trip(&runtime, i8::MIN), Some(i8::MIN));
        assert_eq!(round_trip(&runtime, u16::MAX), Some(u16::MAX));
        assert_eq!(round_trip(&runtime, u32::MAX), Some(u32::MAX));
        assert_eq!(round_trip(&runtime, -(1_i64 << 53)), Some(-(1_i64 << 53)));
        assert_eq!(round_trip(&runtime, 1_u64 << 53), Some(1_u64 << 53));
        assert_eq!(round_trip(&runtime, 1.5_f32), Some(1.5_f32));
        assert_eq!(round_trip(&runtime, -0.25_f64), Some(-0.25_f64));
    }

    #[test]
    fn wide_integers_round_to_the_nearest_double() {
        let runtime = ScriptRuntime::new().unwrap();
        assert_eq!(round_trip(&runtime, (1_i64 << 53) + 1), Some(1_i64 << 53));
        assert_eq!(round_trip(&runtime, (1_u64 << 53) + 1), Some(1_u64 << 53));
        assert_eq!(round_trip(&runtime, u64::MAX), Some(u64::MAX));
    }

    #[test]
    fn script_numbers_saturate_into_wide_integers() {
        let runtime = ScriptRuntime::new().unwrap();
        assert_eq!(runtime.eval::<i64>("1e300").unwrap(), i64::MAX);
        assert_eq!(runtime.eval::<i64>("NaN").unwrap(), 0);
        assert_eq!(runtime.eval::<u64>("-5").unwrap(), 0);
        assert_eq!(runtime.eval::<i32>("'12'").unwrap(), 12);
        assert_eq!(runtime.eval::<u8>("257").unwrap(), 1);
    }

    #[test]
    fn sequences_copy_elementwise() {
        let runtime = ScriptRuntime::new().unwrap();
        let values = vec![3_u8, 1, 2];
        runtime.set_global("values", &values).unwrap();
        assert_eq!(runtime.eval::<u32>("values.length").unwrap(), 3);
        assert_eq!(runtime.eval::<u8>("values[2]").unwrap(), 2);
        runtime.execute("values.push(9);").unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(round_trip(&runtime, values.clone()), Some(values));
    }

    #[test]
    fn oversized_arrays_do_not_fit_sequences() {
        let mut settings = RuntimeSettings::default();
        settings.bridge.max_sequence_length = 4;
        let runtime = ScriptRuntime::with_settings(settings.clone()).unwrap();
        assert_eq!(runtime.eval::<Vec<u8>>("[1, 2, 3, 4]").unwrap(), vec![1, 2, 3, 4]);
        assert!(runtime.eval::<Vec<u8>>("[1, 2, 3, 4, 5]").is_err());
        runtime.with(|ctx| {
            let oversized: Value = ctx.eval("new Array(1000).fill(0)").unwrap();
            let descriptor = resolve::<Vec<u8>>();
            let bridge = runtime.bridge();
            assert_eq!(bridge.from_script(ctx, &oversized, &descriptor).unwrap(), None);
            assert_eq!(
                bridge.coerce(ctx, &oversized, &descriptor, "bytes").unwrap(),
                HostValue::Sequence(Vec::new())
            );
        });

        settings.bridge.strict_coercion = true;
        let strict = ScriptRuntime::with_settings(settings).unwrap();
        strict
            .bind("count", tether_core::HostFunction::new("count", |items: Vec<u8>| items.len() as u32))
            .unwrap();
        let message = strict
            .eval::<String>("try { count(new Array(5).fill(1)) } catch (e) { e.message }")
            .unwrap();
        assert_eq!(message, "cannot convert value for 'count argument 0' to []uint8");
    }

    #[test]
    fn maps_use_property_and_element_keys() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.with(|ctx| {
            let value = HostValue::Map(vec![
                (HostValue::from("name"), HostValue::from("x")),
                (HostValue::Int(3), HostValue::from("three")),
                (HostValue::Bool(true), HostValue::from("skipped")),
            ]);
            let descriptor = resolve::<HashMap<String, String>>();
            let script = runtime.bridge().to_script(ctx, &value, &descriptor).unwrap();
            let object = script.as_object().unwrap();
            let keys: Vec<String> = object.keys::<String>().collect::<Result<_, _>>().unwrap();
            assert_eq!(keys, vec!["3", "name"]);
            assert_eq!(object.get::<_, String>("3").unwrap(), "three");
        });
    }

    #[test]
    fn map_inbound_skips_primitives() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.with(|ctx| {
            let descriptor = resolve::<BTreeMap<String, i32>>();
            for source in ["undefined", "true", "4", "'text'"] {
                let primitive: Value = ctx.eval(source).unwrap();
                assert_eq!(
                    runtime.bridge().from_script(ctx, &primitive, &descriptor).unwrap(),
                    None
                );
            }
        });
        let map = runtime.eval::<BTreeMap<String, i32>>("({ a: 1, b: '2' })").unwrap();
        assert_eq!(map, BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]));
    }

    #[test]
    fn mismatched_shapes_fall_back_to_zero() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.with(|ctx| {
            let bridge = runtime.bridge();
            let descriptor = resolve::<Vec<String>>();
            let value: Value = ctx.eval("'not an array'").unwrap();
            assert_eq!(bridge.from_script(ctx, &value, &descriptor).unwrap(), None);
            assert_eq!(
                bridge.coerce(ctx, &value, &descriptor, "names").unwrap(),
                HostValue::Sequence(Vec::new())
            );
        });
    }

    #[test]
    fn strict_coercion_raises() {
        let mut settings = RuntimeSettings::default();
        settings.bridge.strict_coercion = true;
        let runtime = ScriptRuntime::with_settings(settings).unwrap();
        runtime.with(|ctx| {
            let one = Value::new_int(ctx.clone(), 1);
            let error = runtime
                .bridge()
                .coerce(ctx, &one, &resolve::<Vec<u8>>(), "Point.tags")
                .unwrap_err();
            assert_eq!(
                describe(ctx, error),
                "TypeError: cannot convert value for 'Point.tags' to []uint8"
            );
        });
    }

    #[test]
    fn dates_bridge_to_system_time() {
        let runtime = ScriptRuntime::new().unwrap();
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(round_trip(&runtime, time), Some(time));

        let before = SystemTime::UNIX_EPOCH - Duration::from_millis(86_400_000);
        runtime.set_global("before", &before).unwrap();
        assert!(runtime.eval::<bool>("before instanceof Date").unwrap());
        assert_eq!(runtime.eval::<f64>("before.getTime()").unwrap(), -86_400_000.0);
        assert_eq!(
            runtime.eval::<SystemTime>("new Date(1000)").unwrap(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1)
        );
    }

    #[test]
    fn handles_pass_through_unchanged() {
        let runtime = ScriptRuntime::new().unwrap();
        let held = runtime.eval::<ScriptValue>("globalThis.original = { n: 1 }").unwrap();
        assert!(!held.is_undefined());
        runtime.set_global("back", &held).unwrap();
        assert!(runtime.eval::<bool>("back === original").unwrap());

        assert_eq!(runtime.with(|_| runtime.slot().live_handles()), 1);
        // released ids are dropped on the next entry
        drop(held);
        assert_eq!(runtime.with(|_| runtime.slot().live_handles()), 0);
    }

    #[test]
    fn unsupported_values_are_undefined() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime.with(|ctx| {
            let bridge = runtime.bridge();
            let descriptor = resolve::<HostOnly<std::fs::File>>();
            let out = bridge.to_script(ctx, &HostValue::Int(1), &descriptor).unwrap();
            assert!(out.is_undefined());
            let one = Value::new_int(ctx.clone(), 1);
            assert_eq!(bridge.from_script(ctx, &one, &descriptor).unwrap(), None);
        });
    }

    #[test]
    fn script_functions_become_host_functions() {
        let runtime = ScriptRuntime::new().unwrap();
        let twice = runtime
            .with(|ctx| {
                let function: Value = ctx.eval("(function twice(n) { return n * 2; })").unwrap();
                let signature = Arc::new(FunctionSignature::new(
                    vec![resolve::<f64>()],
                    false,
                    vec![resolve::<f64>()],
                ));
                runtime
                    .bridge()
                    .from_script(ctx, &function, &TypeDescriptor::Function(signature))
                    .unwrap()
            })
            .unwrap();

        // the closure outlives the scope that created it
        runtime.collect_garbage();
        let HostValue::Function(twice) = twice else {
            panic!("expected a function");
        };
        assert_eq!(twice.name(), "twice");
        assert_eq!(
            twice.call(vec![HostValue::Float(21.0)]).unwrap(),
            vec![HostValue::Float(42.0)]
        );

        drop(runtime);
        assert_eq!(
            twice.call(vec![HostValue::Float(1.0)]),
            Err(CallError::RuntimeGone)
        );
    }
}
