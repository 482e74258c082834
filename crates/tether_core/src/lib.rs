//! Tether Core - host type model
//!
//! Everything the bridge knows about host-side values, independent of the
//! script engine:
//! - `TypeDescriptor` / `resolve`: classification of host types, cached per type
//! - `HostValue`: dynamically typed host value in transit
//! - `HostType`: typed conversion into and out of `HostValue`
//! - `HostStruct` / `host_struct!`: field and method access on bound structs
//! - `HostFunction`: type-erased host callables with their signature
//! - `ScriptValue`: sendable token for a script value the host holds on to

pub mod descriptor;
pub mod error;
pub mod function;
pub mod handle;
pub mod host_type;
mod macros;
pub mod structure;
pub mod value;

pub use descriptor::{
    resolve, FloatWidth, FunctionSignature, IntWidth, StructType, TypeDescriptor,
};
pub use error::CallError;
pub use function::{HostCall, HostFunction, HostReturn, IntoHostFunction};
pub use handle::{HandleIndex, ScriptHandle, ScriptValue};
pub use host_type::{shared, HostOnly, HostType, Rest, Shared};
pub use structure::{
    FieldDescriptor, HostStruct, MethodCall, MethodDescriptor, StructDescriptor,
    StructDescriptorBuilder, StructRef,
};
pub use value::HostValue;

/// Support items for `host_struct!` expansions.
#[doc(hidden)]
pub mod __private {
    pub use crate::function::{is_variadic, take_arg};
    pub use once_cell::sync::Lazy;

    pub fn tag(tags: &[&'static str]) -> Option<&'static str> {
        tags.first().copied()
    }
}
