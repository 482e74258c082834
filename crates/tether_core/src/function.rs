//! Host functions
//!
//! `HostFunction` erases a Rust function into `Vec<HostValue> -> Vec<HostValue>`
//! plus its signature. Plain closures and fn items of up to eight `HostType`
//! parameters convert through `IntoHostFunction`; a trailing `Rest<T>`
//! parameter makes the function variadic.

use crate::descriptor::{resolve, FunctionSignature, TypeDescriptor};
use crate::error::CallError;
use crate::host_type::HostType;
use crate::value::HostValue;
use std::fmt;
use std::sync::Arc;

pub type HostCall = Arc<dyn Fn(Vec<HostValue>) -> Result<Vec<HostValue>, CallError> + Send + Sync>;

#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    signature: Arc<FunctionSignature>,
    call: HostCall,
}

impl HostFunction {
    /// Wrap a Rust function.
    ///
    /// ```ignore
    /// let join = HostFunction::new("join", |head: String, rest: Rest<String>| {
    ///     format!("{}{}", head, rest.concat())
    /// });
    /// ```
    pub fn new<Marker>(name: impl AsRef<str>, function: impl IntoHostFunction<Marker>) -> Self {
        function.into_host_function(name.as_ref())
    }

    /// Build from an explicit signature and an erased body.
    pub fn from_parts<F>(name: impl AsRef<str>, signature: Arc<FunctionSignature>, call: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<Vec<HostValue>, CallError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.as_ref()),
            signature,
            call: Arc::new(call),
        }
    }

    /// Zero value of a function-typed slot: fails when called.
    pub fn unset(signature: Arc<FunctionSignature>) -> Self {
        Self::from_parts("", signature, |_| Err(CallError::Unset))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same callable under another name.
    pub fn renamed(&self, name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            signature: self.signature.clone(),
            call: self.call.clone(),
        }
    }

    pub fn signature(&self) -> &Arc<FunctionSignature> {
        &self.signature
    }

    pub fn call(&self, args: Vec<HostValue>) -> Result<Vec<HostValue>, CallError> {
        (self.call)(args)
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Values a host function may return: nothing, one `HostType`, a tuple of
/// them, or a `Result` of any of these.
pub trait HostReturn: 'static {
    fn descriptors() -> Vec<TypeDescriptor>;

    fn into_host_values(self) -> Result<Vec<HostValue>, CallError>;
}

impl HostReturn for () {
    fn descriptors() -> Vec<TypeDescriptor> {
        Vec::new()
    }

    fn into_host_values(self) -> Result<Vec<HostValue>, CallError> {
        Ok(Vec::new())
    }
}

impl<T: HostType> HostReturn for T {
    fn descriptors() -> Vec<TypeDescriptor> {
        vec![resolve::<T>()]
    }

    fn into_host_values(self) -> Result<Vec<HostValue>, CallError> {
        Ok(vec![self.to_host()])
    }
}

impl<R, E> HostReturn for Result<R, E>
where
    R: HostReturn,
    E: fmt::Display + 'static,
{
    fn descriptors() -> Vec<TypeDescriptor> {
        R::descriptors()
    }

    fn into_host_values(self) -> Result<Vec<HostValue>, CallError> {
        match self {
            Ok(value) => value.into_host_values(),
            Err(error) => Err(CallError::Failed {
                message: error.to_string(),
            }),
        }
    }
}

macro_rules! impl_host_return_tuple {
    ($($name:ident),+) => {
        impl<$($name: HostType),+> HostReturn for ($($name,)+) {
            fn descriptors() -> Vec<TypeDescriptor> {
                vec![$(resolve::<$name>()),+]
            }

            #[allow(non_snake_case)]
            fn into_host_values(self) -> Result<Vec<HostValue>, CallError> {
                let ($($name,)+) = self;
                Ok(vec![$($name.to_host()),+])
            }
        }
    };
}

impl_host_return_tuple!(A, B);
impl_host_return_tuple!(A, B, C);
impl_host_return_tuple!(A, B, C, D);

/// Conversion of Rust callables into `HostFunction`. `Marker` only
/// disambiguates the per-arity implementations.
pub trait IntoHostFunction<Marker>: Send + Sync + 'static {
    fn into_host_function(self, name: &str) -> HostFunction;
}

/// Whether the last parameter collects the remaining arguments.
#[doc(hidden)]
pub fn is_variadic(rest_flags: &[bool]) -> bool {
    rest_flags.last().copied().unwrap_or(false)
}

/// Pop the next argument and convert it; a missing argument reads as the
/// parameter's zero value.
#[doc(hidden)]
pub fn take_arg<T: HostType>(
    args: &mut std::vec::IntoIter<HostValue>,
    index: &mut usize,
) -> Result<T, CallError> {
    let position = *index;
    *index += 1;
    let value = args
        .next()
        .unwrap_or_else(|| resolve::<T>().zero_value());
    T::from_host(value).ok_or_else(|| CallError::Argument {
        index: position,
        expected: resolve::<T>().kind_name(),
    })
}

macro_rules! impl_into_host_function {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> IntoHostFunction<fn($($arg,)*) -> Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: HostReturn,
            $($arg: HostType,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self, name: &str) -> HostFunction {
                let signature = FunctionSignature::new(
                    vec![$(resolve::<$arg>()),*],
                    is_variadic(&[$(<$arg as HostType>::IS_REST),*]),
                    Ret::descriptors(),
                );
                HostFunction::from_parts(name, Arc::new(signature), move |args| {
                    let mut args = args.into_iter();
                    let mut index = 0usize;
                    $(let $arg = take_arg::<$arg>(&mut args, &mut index)?;)*
                    (self)($($arg),*).into_host_values()
                })
            }
        }
    };
}

impl_into_host_function!();
impl_into_host_function!(A1);
impl_into_host_function!(A1, A2);
impl_into_host_function!(A1, A2, A3);
impl_into_host_function!(A1, A2, A3, A4);
impl_into_host_function!(A1, A2, A3, A4, A5);
impl_into_host_function!(A1, A2, A3, A4, A5, A6);
impl_into_host_function!(A1, A2, A3, A4, A5, A6, A7);
impl_into_host_function!(A1, A2, A3, A4, A5, A6, A7, A8);
