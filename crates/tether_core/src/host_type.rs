//! Typed conversion to and from `HostValue`
//!
//! `HostType` replaces runtime reflection: every type that may appear as a
//! bound struct field, function parameter or return value states its
//! descriptor and how it converts. Implemented here for primitives,
//! sequences, maps, time, raw script handles and shared structs; bound
//! structs get it from `host_struct!`.

use crate::descriptor::{resolve, FloatWidth, IntWidth, TypeDescriptor};
use crate::function::HostFunction;
use crate::structure::{HostStruct, StructRef};
use crate::value::HostValue;
use parking_lot::Mutex;
use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::SystemTime;
use crate::handle::ScriptValue;

pub trait HostType: Sized + Send + 'static {
    /// Trailing variadic parameter marker (see `Rest`).
    const IS_REST: bool = false;

    fn descriptor() -> TypeDescriptor;

    fn to_host(&self) -> HostValue;

    /// `None` when `value` has the wrong shape.
    fn from_host(value: HostValue) -> Option<Self>;
}

/// A host struct shared between host code and script. Writes from either
/// side are visible to the other.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Trailing variadic parameter: collects every remaining script argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Deref for Rest<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

impl<T> DerefMut for Rest<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.0
    }
}

/// A value that exists only on the host side. Outbound it becomes
/// `undefined`; inbound it never converts.
#[derive(Debug, Clone, Default)]
pub struct HostOnly<T>(pub T);

impl HostType for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Bool
    }

    fn to_host(&self) -> HostValue {
        HostValue::Bool(*self)
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Bool(value) => Some(value),
            _ => None,
        }
    }
}

impl HostType for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::String
    }

    fn to_host(&self) -> HostValue {
        HostValue::String(self.clone())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::String(value) => Some(value),
            _ => None,
        }
    }
}

// Wrapping casts: the marshaler already applied the script integer
// conversion for the declared width.
macro_rules! impl_host_int {
    ($($ty:ty => $variant:ident($width:ident)),* $(,)?) => {
        $(
            impl HostType for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::$variant(IntWidth::$width)
                }

                fn to_host(&self) -> HostValue {
                    HostValue::$variant(*self as _)
                }

                fn from_host(value: HostValue) -> Option<Self> {
                    match value {
                        HostValue::Int(value) => Some(value as $ty),
                        HostValue::Uint(value) => Some(value as $ty),
                        HostValue::Float(value) => Some(value as $ty),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_host_int!(
    i8 => Int(W8),
    i16 => Int(W16),
    i32 => Int(W32),
    i64 => Int(W64),
    isize => Int(Word),
    u8 => Uint(W8),
    u16 => Uint(W16),
    u32 => Uint(W32),
    u64 => Uint(W64),
    usize => Uint(Word),
);

macro_rules! impl_host_float {
    ($($ty:ty => $width:ident),* $(,)?) => {
        $(
            impl HostType for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Float(FloatWidth::$width)
                }

                fn to_host(&self) -> HostValue {
                    HostValue::Float(*self as f64)
                }

                fn from_host(value: HostValue) -> Option<Self> {
                    match value {
                        HostValue::Float(value) => Some(value as $ty),
                        HostValue::Int(value) => Some(value as $ty),
                        HostValue::Uint(value) => Some(value as $ty),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_host_float!(f32 => F32, f64 => F64);

impl<T: HostType> HostType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Sequence(Box::new(resolve::<T>()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Sequence(self.iter().map(HostType::to_host).collect())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Sequence(items) => items.into_iter().map(T::from_host).collect(),
            _ => None,
        }
    }
}

impl<T: HostType> HostType for Rest<T> {
    const IS_REST: bool = true;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Sequence(Box::new(resolve::<T>()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Sequence(self.0.iter().map(HostType::to_host).collect())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        Vec::<T>::from_host(value).map(Rest)
    }
}

impl<K, V> HostType for HashMap<K, V>
where
    K: HostType + Eq + Hash,
    V: HostType,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(resolve::<K>()), Box::new(resolve::<V>()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Map(
            self.iter()
                .map(|(key, value)| (key.to_host(), value.to_host()))
                .collect(),
        )
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Map(entries) => Some(
                entries
                    .into_iter()
                    .filter_map(|(key, value)| Some((K::from_host(key)?, V::from_host(value)?)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl<K, V> HostType for BTreeMap<K, V>
where
    K: HostType + Ord,
    V: HostType,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(resolve::<K>()), Box::new(resolve::<V>()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Map(
            self.iter()
                .map(|(key, value)| (key.to_host(), value.to_host()))
                .collect(),
        )
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Map(entries) => Some(
                entries
                    .into_iter()
                    .filter_map(|(key, value)| Some((K::from_host(key)?, V::from_host(value)?)))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl HostType for SystemTime {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Time
    }

    fn to_host(&self) -> HostValue {
        HostValue::Time(*self)
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Time(value) => Some(value),
            _ => None,
        }
    }
}

impl HostType for ScriptValue {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Handle
    }

    fn to_host(&self) -> HostValue {
        HostValue::Script(self.clone())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Script(value) => Some(value),
            HostValue::Undefined => Some(ScriptValue::Undefined),
            _ => None,
        }
    }
}

impl HostType for HostFunction {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Function(Arc::new(crate::descriptor::FunctionSignature::dynamic()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Function(self.clone())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Function(function) => Some(function),
            _ => None,
        }
    }
}

impl<T: HostStruct + HostType + Default + Clone> HostType for Shared<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Pointer(Box::new(resolve::<T>()))
    }

    fn to_host(&self) -> HostValue {
        HostValue::Struct(StructRef::new(self.clone()))
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Struct(target) => target.downcast::<T>(),
            _ => None,
        }
    }
}

impl<T: Send + 'static> HostType for HostOnly<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Unsupported {
            type_name: type_name::<T>(),
        }
    }

    fn to_host(&self) -> HostValue {
        HostValue::Undefined
    }

    fn from_host(_value: HostValue) -> Option<Self> {
        None
    }
}
