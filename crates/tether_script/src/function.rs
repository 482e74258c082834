//! Function adapter
//!
//! Exposes a `HostFunction` as a script function. The script function owns
//! the host function; each call checks the argument count, converts
//! arguments by parameter type, calls, and converts the results back.

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::marshal::parameter_descriptor;
use crate::scope;
use rquickjs::function::Rest;
use rquickjs::{Array, Ctx, Function, Value};
use tether_core::{HostFunction, HostValue, TypeDescriptor};
use tracing::trace;

impl Bridge {
    /// Script function calling `function`.
    pub fn wrap_function<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: HostFunction,
    ) -> rquickjs::Result<Function<'js>> {
        let runtime = self.id();
        let name = function.name().to_string();
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let _active = scope::activate(runtime, &ctx);
                let bridge = Bridge::current(&ctx, runtime)?;
                bridge.invoke(&ctx, &function, args.0)
            },
        )?
        .with_name(name)
    }

    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: &HostFunction,
        args: Vec<Value<'js>>,
    ) -> rquickjs::Result<Value<'js>> {
        let args = self.host_arguments(ctx, function, &args)?;
        trace!(function = function.name(), args = args.len(), "calling host function");
        let results = function.call(args).map_err(|error| {
            BridgeError::HostCall {
                function: function.name().to_string(),
                message: error.to_string(),
            }
            .throw(ctx)
        })?;
        self.script_results(ctx, &results, &function.signature().returns)
    }

    /// Convert script arguments for `function`.
    ///
    /// A fixed-arity function takes exactly one argument per parameter. A
    /// variadic one takes at least its fixed parameters; the remaining
    /// arguments are converted one by one into the trailing sequence.
    pub(crate) fn host_arguments<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: &HostFunction,
        args: &[Value<'js>],
    ) -> rquickjs::Result<Vec<HostValue>> {
        let signature = function.signature();
        let fixed = signature.fixed_count();
        let count_ok = if signature.variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !count_ok {
            let expected = if signature.variadic {
                format!("at least {}", fixed)
            } else {
                fixed.to_string()
            };
            return Err(BridgeError::ArgumentCountMismatch {
                function: function.name().to_string(),
                expected,
                actual: args.len(),
            }
            .throw(ctx));
        }

        let mut host_args = Vec::with_capacity(signature.params.len());
        for (index, arg) in args.iter().take(fixed).enumerate() {
            let target = format!("{} argument {}", function.name(), index);
            host_args.push(self.coerce(ctx, arg, &signature.params[index], &target)?);
        }
        if signature.variadic {
            let mut rest = Vec::with_capacity(args.len() - fixed);
            for (index, arg) in args.iter().enumerate().skip(fixed) {
                let target = format!("{} argument {}", function.name(), index);
                rest.push(self.coerce(ctx, arg, parameter_descriptor(signature, index), &target)?);
            }
            host_args.push(HostValue::Sequence(rest));
        }
        Ok(host_args)
    }

    /// Nothing becomes `undefined`, one value is returned as is, several
    /// come back as an array.
    pub(crate) fn script_results<'js>(
        &self,
        ctx: &Ctx<'js>,
        results: &[HostValue],
        descriptors: &[TypeDescriptor],
    ) -> rquickjs::Result<Value<'js>> {
        let untyped = TypeDescriptor::Handle;
        let descriptor = |index: usize| descriptors.get(index).unwrap_or(&untyped);
        match results {
            [] => Ok(Value::new_undefined(ctx.clone())),
            [single] => self.to_script(ctx, single, descriptor(0)),
            many => {
                let array = Array::new(ctx.clone())?;
                for (index, value) in many.iter().enumerate() {
                    array.set(index, self.to_script(ctx, value, descriptor(index))?)?;
                }
                Ok(array.into_value())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::RuntimeError;
    use crate::runtime::ScriptRuntime;
    use tether_core::{HostFunction, Rest};

    fn runtime_with(function: HostFunction) -> ScriptRuntime {
        let runtime = ScriptRuntime::new().unwrap();
        let name = function.name().to_string();
        runtime.bind(&name, function).unwrap();
        runtime
    }

    fn caught(runtime: &ScriptRuntime, source: &str) -> String {
        let script = format!(
            "try {{ {}; 'no error' }} catch (e) {{ `${{e.name}}: ${{e.message}}` }}",
            source
        );
        runtime.eval::<String>(&script).unwrap()
    }

    #[test]
    fn fixed_arity_requires_exact_count() {
        let runtime = runtime_with(HostFunction::new("add", |a: i32, b: i32| a + b));
        assert_eq!(runtime.eval::<i32>("add(2, 40)").unwrap(), 42);
        assert_eq!(runtime.eval::<String>("add.name").unwrap(), "add");
        assert_eq!(
            caught(&runtime, "add(1)"),
            "TypeError: 'add' expects 2 argument(s), got 1"
        );
    }

    #[test]
    fn variadic_collects_trailing_arguments() {
        let runtime = runtime_with(HostFunction::new(
            "join",
            |head: String, rest: Rest<String>| format!("{}:{}", head, rest.join(",")),
        ));
        assert_eq!(runtime.eval::<String>("join('a', 'b', 3)").unwrap(), "a:b,3");
        assert_eq!(runtime.eval::<String>("join('a')").unwrap(), "a:");
        assert!(caught(&runtime, "join()").contains("at least 1"));
    }

    #[test]
    fn multiple_results_become_an_array() {
        let runtime = runtime_with(HostFunction::new("split", |value: i32| {
            (value / 10, value % 10)
        }));
        assert_eq!(runtime.eval::<Vec<i32>>("split(47)").unwrap(), vec![4, 7]);
        assert!(runtime.eval::<bool>("Array.isArray(split(47))").unwrap());

        runtime
            .bind("nothing", HostFunction::new("nothing", || {}))
            .unwrap();
        assert!(runtime.eval::<bool>("nothing() === undefined").unwrap());
    }

    #[test]
    fn host_errors_are_catchable() {
        let runtime = runtime_with(HostFunction::new("parse", |text: String| {
            text.parse::<u8>()
        }));
        assert!(caught(&runtime, "parse('999')").starts_with("Error: 'parse' failed:"));

        let error = runtime.execute("parse('999')").unwrap_err();
        let RuntimeError::Script(exception) = error else {
            panic!("expected a script exception, got {:?}", error);
        };
        assert_eq!(exception.name, "Error");
        assert!(exception.message.starts_with("'parse' failed:"));
    }
}
