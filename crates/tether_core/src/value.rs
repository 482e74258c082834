//! Host values
//!
//! `HostValue` is the dynamically typed form of a host value while it crosses
//! the bridge. Typed Rust values are converted to and from it by `HostType`.

use crate::function::HostFunction;
use crate::structure::StructRef;
use std::time::SystemTime;
use crate::handle::ScriptValue;

#[derive(Debug, Clone, Default)]
pub enum HostValue {
    /// No host counterpart (unsupported types, missing values).
    #[default]
    Undefined,
    Bool(bool),
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Sequence(Vec<HostValue>),
    /// Entries in iteration order of the source map.
    Map(Vec<(HostValue, HostValue)>),
    Struct(StructRef),
    Function(HostFunction),
    Time(SystemTime),
    Script(ScriptValue),
}

impl HostValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(value) => Some(*value),
            HostValue::Uint(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Sequence(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    /// Structural for plain data; identity for structs and functions.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Uint(a), HostValue::Uint(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Sequence(a), HostValue::Sequence(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Struct(a), HostValue::Struct(b)) => a.ptr_eq(b),
            (HostValue::Function(a), HostValue::Function(b)) => a.ptr_eq(b),
            (HostValue::Time(a), HostValue::Time(b)) => a == b,
            (HostValue::Script(a), HostValue::Script(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<ScriptValue> for HostValue {
    fn from(value: ScriptValue) -> Self {
        HostValue::Script(value)
    }
}
