//! Script runtime management
//!
//! `ScriptRuntime` owns a QuickJS runtime and context with a bridge
//! installed and is the entry point embedders use: bind host types and
//! functions under global names, execute script source, call script globals
//! and force collections.
//!
//! A runtime stays on the thread that created it. Use one per thread.

use crate::bridge::{install_global, Bridge};
use crate::error::{describe, BindError, RuntimeError};
use crate::scope::{self, RuntimeSlot};
use crate::settings::RuntimeSettings;
use rquickjs::function::Rest;
use rquickjs::{Context, Ctx, Runtime, Value};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::{resolve, HostFunction, HostType, HostValue, StructDescriptor, TypeDescriptor};
use tracing::debug;

static NEXT_RUNTIME: AtomicU64 = AtomicU64::new(1);

/// What `ScriptRuntime::bind` exposes under a name.
#[derive(Clone)]
pub enum BindTarget {
    /// A struct type, exposed as a constructible class.
    Struct(&'static StructDescriptor),
    /// A host function, exposed as a callable.
    Function(HostFunction),
    /// Anything else; binding it fails.
    Unsupported { kind: String },
}

impl BindTarget {
    /// Target for host type `T`. Structs and shared structs become classes.
    pub fn of<T: HostType>() -> Self {
        let descriptor = resolve::<T>();
        match descriptor.struct_type() {
            Some(struct_type) => BindTarget::Struct(struct_type.descriptor()),
            None => BindTarget::Unsupported {
                kind: descriptor.kind_name(),
            },
        }
    }

    pub fn function(function: HostFunction) -> Self {
        BindTarget::Function(function)
    }
}

impl From<HostFunction> for BindTarget {
    fn from(function: HostFunction) -> Self {
        BindTarget::Function(function)
    }
}

impl From<&'static StructDescriptor> for BindTarget {
    fn from(descriptor: &'static StructDescriptor) -> Self {
        BindTarget::Struct(descriptor)
    }
}

/// Script execution context
pub struct ScriptRuntime {
    // the slot holds persistent script values; it goes before the runtime
    slot: Rc<RuntimeSlot>,
    bridge: Arc<Bridge>,
    settings: RuntimeSettings,
    context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, RuntimeError> {
        Self::with_settings(RuntimeSettings::default())
    }

    pub fn with_settings(settings: RuntimeSettings) -> Result<Self, RuntimeError> {
        let runtime = Runtime::new()?;
        let engine = &settings.engine;
        if let Some(limit) = engine.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = engine.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        runtime.set_gc_threshold(engine.gc_threshold);
        let context = Context::full(&runtime)?;

        let id = NEXT_RUNTIME.fetch_add(1, Ordering::Relaxed);
        let bridge = Arc::new(Bridge::new(id, settings.bridge.clone()));
        let slot = context.with(|ctx| {
            RuntimeSlot::new(&ctx, context.clone(), Arc::clone(&bridge))
                .map_err(|error| RuntimeError::from_engine(&ctx, error))
        })?;
        let slot = scope::install_slot(id, slot);
        debug!(runtime = id, "script runtime created");
        Ok(Self {
            slot,
            bridge,
            settings,
            context,
            runtime,
        })
    }

    /// Load settings from JSON and build a runtime with them.
    pub fn from_json_settings(json: &str) -> Result<Self, RuntimeError> {
        Self::with_settings(RuntimeSettings::from_json_str(json)?)
    }

    pub fn id(&self) -> u64 {
        self.bridge.id()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub(crate) fn slot(&self) -> &RuntimeSlot {
        &self.slot
    }

    /// Run `f` inside the context. Called from inside a bound function,
    /// this reuses the context already entered.
    pub fn with<R>(&self, f: impl for<'js> FnOnce(&Ctx<'js>) -> R) -> R {
        scope::enter_slot(&self.slot, |ctx, _| f(ctx))
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), RuntimeError> {
        let source = std::fs::read_to_string(path)?;
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), RuntimeError> {
        self.with(|ctx| {
            ctx.eval::<(), _>(source)
                .map_err(|error| RuntimeError::from_engine(ctx, error))
        })
    }

    /// Evaluate `source` and read its completion value as `T`.
    pub fn eval<T: HostType>(&self, source: &str) -> Result<T, RuntimeError> {
        self.with(|ctx| {
            let value: Value = ctx
                .eval(source)
                .map_err(|error| RuntimeError::from_engine(ctx, error))?;
            self.read_as(ctx, "<eval>", &value)
        })
    }

    /// Call a JavaScript function by name with no arguments.
    pub fn call_function(&self, name: &str) -> Result<(), RuntimeError> {
        self.call_global::<HostValueIgnored>(name, Vec::new())
            .map(|_| ())
    }

    /// Call global function `name` with host arguments and read its result
    /// as `R`.
    pub fn call_global<R: HostType>(
        &self,
        name: &str,
        args: Vec<HostValue>,
    ) -> Result<R, RuntimeError> {
        self.with(|ctx| {
            let engine = |error| RuntimeError::from_engine(ctx, error);
            let value: Value = ctx.globals().get(name).map_err(engine)?;
            let Some(function) = value.as_function() else {
                return Err(RuntimeError::NotAFunction {
                    name: name.to_string(),
                });
            };
            let untyped = TypeDescriptor::Handle;
            let mut script_args = Vec::with_capacity(args.len());
            for arg in &args {
                script_args.push(self.bridge.to_script(ctx, arg, &untyped).map_err(engine)?);
            }
            let result: Value = function.call((Rest(script_args),)).map_err(engine)?;
            self.read_as(ctx, name, &result)
        })
    }

    /// Expose `target` to script as global `name`.
    ///
    /// A struct becomes a class: `name` holds its constructor, and
    /// `new name()` builds a zero-valued instance. A function becomes a
    /// callable. Binding the same struct type twice fails. The global is
    /// read-only.
    pub fn bind(&self, name: &str, target: impl Into<BindTarget>) -> Result<(), BindError> {
        match target.into() {
            BindTarget::Struct(descriptor) => self
                .with(|ctx| self.bridge.bind_struct(ctx, name, descriptor))
                .map(|_| ()),
            BindTarget::Function(function) => {
                let function = function.renamed(name);
                debug!(
                    function = name,
                    params = function.signature().params.len(),
                    variadic = function.signature().variadic,
                    "bound function"
                );
                self.with(|ctx| {
                    let callable = self.bridge.wrap_function(ctx, function).map_err(|error| {
                        BindError::Install {
                            name: name.to_string(),
                            message: describe(ctx, error),
                        }
                    })?;
                    install_global(ctx, name, callable.into_value())
                })
            }
            BindTarget::Unsupported { kind } => Err(BindError::UnsupportedTarget {
                name: name.to_string(),
                kind,
            }),
        }
    }

    /// Marshal `value` and store it as global `name`.
    pub fn set_global<T: HostType>(&self, name: &str, value: &T) -> Result<(), RuntimeError> {
        self.with(|ctx| {
            let engine = |error| RuntimeError::from_engine(ctx, error);
            let value = self
                .bridge
                .to_script(ctx, &value.to_host(), &resolve::<T>())
                .map_err(engine)?;
            ctx.globals().set(name, value).map_err(engine)
        })
    }

    pub fn get_global<T: HostType>(&self, name: &str) -> Result<T, RuntimeError> {
        self.with(|ctx| {
            let value: Value = ctx
                .globals()
                .get(name)
                .map_err(|error| RuntimeError::from_engine(ctx, error))?;
            self.read_as(ctx, name, &value)
        })
    }

    fn read_as<'js, T: HostType>(
        &self,
        ctx: &Ctx<'js>,
        name: &str,
        value: &Value<'js>,
    ) -> Result<T, RuntimeError> {
        let descriptor = resolve::<T>();
        let conversion = || RuntimeError::Conversion {
            name: name.to_string(),
            expected: descriptor.kind_name(),
        };
        let host = self
            .bridge
            .from_script(ctx, value, &descriptor)
            .map_err(|error| RuntimeError::from_engine(ctx, error))?
            .ok_or_else(conversion)?;
        T::from_host(host).ok_or_else(conversion)
    }

    /// Full collection; finalizers of unreachable instances run before this
    /// returns.
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
        debug!(
            runtime = self.id(),
            live_instances = self.bridge.ownership().len(),
            "collected"
        );
    }

    /// Host structs currently kept alive for script.
    pub fn live_instances(&self) -> usize {
        self.bridge.ownership().len()
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        // persistent values must be freed while the runtime is alive
        scope::remove_slot(self.id());
        debug!(runtime = self.id(), "script runtime dropped");
    }
}

/// Result type of `call_function`: any completion value.
struct HostValueIgnored;

impl HostType for HostValueIgnored {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Unsupported {
            type_name: "ignored",
        }
    }

    fn to_host(&self) -> HostValue {
        HostValue::Undefined
    }

    fn from_host(_: HostValue) -> Option<Self> {
        Some(HostValueIgnored)
    }
}
