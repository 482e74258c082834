//! Type descriptors
//!
//! A `TypeDescriptor` is the shape of a host type as the bridge sees it. It is
//! derived once per type through `HostType::descriptor` and cached by `TypeId`;
//! host types do not change shape at runtime.

use crate::function::HostFunction;
use crate::host_type::HostType;
use crate::structure::StructDescriptor;
use crate::value::HostValue;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use crate::handle::ScriptValue;
use tracing::trace;

/// Integer width. `Word` is the platform word (`isize`/`usize`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    Word,
}

impl IntWidth {
    /// Narrower than a machine word: carried as the script integer type.
    pub fn is_narrow(self) -> bool {
        matches!(self, IntWidth::W8 | IntWidth::W16 | IntWidth::W32)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F32,
    F64,
}

/// Lazy reference to a struct's descriptor.
///
/// Struct descriptors are resolved on demand so that self-referential
/// structs (a field of type `Shared<Self>`) can be described.
#[derive(Copy, Clone)]
pub struct StructType {
    type_id: TypeId,
    name: &'static str,
    describe: fn() -> &'static StructDescriptor,
}

impl StructType {
    pub fn new(type_id: TypeId, name: &'static str, describe: fn() -> &'static StructDescriptor) -> Self {
        Self {
            type_id,
            name,
            describe,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn descriptor(&self) -> &'static StructDescriptor {
        (self.describe)()
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StructType").field(&self.name).finish()
    }
}

/// Parameter and return shapes of a host function.
///
/// When `variadic` is set the last parameter is a `Sequence` that collects
/// every trailing argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<TypeDescriptor>,
    pub variadic: bool,
    pub returns: Vec<TypeDescriptor>,
}

impl FunctionSignature {
    pub fn new(params: Vec<TypeDescriptor>, variadic: bool, returns: Vec<TypeDescriptor>) -> Self {
        Self {
            params,
            variadic,
            returns,
        }
    }

    /// `(...values) -> value` over raw script handles.
    pub fn dynamic() -> Self {
        Self {
            params: vec![TypeDescriptor::Sequence(Box::new(TypeDescriptor::Handle))],
            variadic: true,
            returns: vec![TypeDescriptor::Handle],
        }
    }

    /// Parameters bound one-to-one to arguments.
    pub fn fixed_count(&self) -> usize {
        if self.variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        }
    }

    /// Element type of the trailing variadic parameter.
    pub fn rest_element(&self) -> Option<&TypeDescriptor> {
        if !self.variadic {
            return None;
        }
        match self.params.last() {
            Some(TypeDescriptor::Sequence(element)) => Some(element),
            _ => None,
        }
    }
}

/// Classification of a host type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Bool,
    String,
    Int(IntWidth),
    Uint(IntWidth),
    Float(FloatWidth),
    Sequence(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Struct(StructType),
    Function(Arc<FunctionSignature>),
    Pointer(Box<TypeDescriptor>),
    /// Wall-clock instant, bridged to the script Date.
    Time,
    /// Raw script value, passed through untouched.
    Handle,
    Unsupported { type_name: &'static str },
}

impl TypeDescriptor {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TypeDescriptor::Unsupported { .. })
    }

    /// The struct behind a struct or pointer-to-struct descriptor.
    pub fn struct_type(&self) -> Option<StructType> {
        match self {
            TypeDescriptor::Struct(struct_type) => Some(*struct_type),
            TypeDescriptor::Pointer(inner) => match inner.as_ref() {
                TypeDescriptor::Struct(struct_type) => Some(*struct_type),
                _ => None,
            },
            _ => None,
        }
    }

    /// Short name used in diagnostics.
    pub fn kind_name(&self) -> String {
        match self {
            TypeDescriptor::Bool => "bool".to_string(),
            TypeDescriptor::String => "string".to_string(),
            TypeDescriptor::Int(width) => format!("int{}", width_suffix(*width)),
            TypeDescriptor::Uint(width) => format!("uint{}", width_suffix(*width)),
            TypeDescriptor::Float(FloatWidth::F32) => "float32".to_string(),
            TypeDescriptor::Float(FloatWidth::F64) => "float64".to_string(),
            TypeDescriptor::Sequence(element) => format!("[]{}", element.kind_name()),
            TypeDescriptor::Map(key, value) => {
                format!("map[{}]{}", key.kind_name(), value.kind_name())
            }
            TypeDescriptor::Struct(struct_type) => struct_type.name().to_string(),
            TypeDescriptor::Function(_) => "func".to_string(),
            TypeDescriptor::Pointer(inner) => format!("*{}", inner.kind_name()),
            TypeDescriptor::Time => "time".to_string(),
            TypeDescriptor::Handle => "value".to_string(),
            TypeDescriptor::Unsupported { type_name } => type_name.to_string(),
        }
    }

    /// The value a freshly declared host variable of this type holds.
    pub fn zero_value(&self) -> HostValue {
        match self {
            TypeDescriptor::Bool => HostValue::Bool(false),
            TypeDescriptor::String => HostValue::String(String::new()),
            TypeDescriptor::Int(_) => HostValue::Int(0),
            TypeDescriptor::Uint(_) => HostValue::Uint(0),
            TypeDescriptor::Float(_) => HostValue::Float(0.0),
            TypeDescriptor::Sequence(_) => HostValue::Sequence(Vec::new()),
            TypeDescriptor::Map(_, _) => HostValue::Map(Vec::new()),
            TypeDescriptor::Struct(struct_type) => {
                HostValue::Struct(struct_type.descriptor().zero())
            }
            TypeDescriptor::Pointer(inner) => inner.zero_value(),
            TypeDescriptor::Function(signature) => {
                HostValue::Function(HostFunction::unset(signature.clone()))
            }
            TypeDescriptor::Time => HostValue::Time(SystemTime::UNIX_EPOCH),
            TypeDescriptor::Handle => HostValue::Script(ScriptValue::Undefined),
            TypeDescriptor::Unsupported { .. } => HostValue::Undefined,
        }
    }
}

fn width_suffix(width: IntWidth) -> &'static str {
    match width {
        IntWidth::W8 => "8",
        IntWidth::W16 => "16",
        IntWidth::W32 => "32",
        IntWidth::W64 => "64",
        IntWidth::Word => "",
    }
}

static DESCRIPTORS: Lazy<DashMap<TypeId, TypeDescriptor>> = Lazy::new(DashMap::new);

/// Descriptor of `T`, computed once per type.
pub fn resolve<T: HostType>() -> TypeDescriptor {
    let id = TypeId::of::<T>();
    if let Some(cached) = DESCRIPTORS.get(&id) {
        return cached.clone();
    }
    // computed outside the map: element descriptors resolve recursively
    let descriptor = T::descriptor();
    trace!(type_name = std::any::type_name::<T>(), kind = %descriptor.kind_name(), "resolved host type");
    DESCRIPTORS.insert(id, descriptor.clone());
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_type::{HostOnly, Rest, Shared};
    use std::collections::HashMap;

    #[derive(Debug, Clone, Default)]
    struct Gauge {
        value: i32,
    }

    crate::host_struct!(Gauge { value: i32 });

    #[test]
    fn primitives_classify_by_width() {
        assert_eq!(resolve::<bool>(), TypeDescriptor::Bool);
        assert_eq!(resolve::<String>(), TypeDescriptor::String);
        assert_eq!(resolve::<i16>(), TypeDescriptor::Int(IntWidth::W16));
        assert_eq!(resolve::<u32>(), TypeDescriptor::Uint(IntWidth::W32));
        assert_eq!(resolve::<i64>(), TypeDescriptor::Int(IntWidth::W64));
        assert_eq!(resolve::<usize>(), TypeDescriptor::Uint(IntWidth::Word));
        assert_eq!(resolve::<f32>(), TypeDescriptor::Float(FloatWidth::F32));
        assert!(IntWidth::W32.is_narrow());
        assert!(!IntWidth::W64.is_narrow());
    }

    #[test]
    fn aggregates_nest() {
        assert_eq!(
            resolve::<Vec<u8>>(),
            TypeDescriptor::Sequence(Box::new(TypeDescriptor::Uint(IntWidth::W8)))
        );
        assert_eq!(
            resolve::<HashMap<String, f64>>(),
            TypeDescriptor::Map(
                Box::new(TypeDescriptor::String),
                Box::new(TypeDescriptor::Float(FloatWidth::F64))
            )
        );
        assert_eq!(resolve::<Rest<String>>(), resolve::<Vec<String>>());
    }

    #[test]
    fn structs_and_pointers() {
        let by_value = resolve::<Gauge>();
        let pointer = resolve::<Shared<Gauge>>();
        assert!(matches!(by_value, TypeDescriptor::Struct(_)));
        assert!(matches!(pointer, TypeDescriptor::Pointer(_)));
        assert_eq!(by_value.struct_type(), pointer.struct_type());
        assert_eq!(by_value.kind_name(), "Gauge");
    }

    #[test]
    fn unsupported_types_are_marked() {
        assert!(resolve::<HostOnly<std::fs::File>>().is_unsupported());
        assert_eq!(
            resolve::<HostOnly<std::fs::File>>().zero_value(),
            HostValue::Undefined
        );
    }

    #[test]
    fn resolution_is_cached() {
        let first = resolve::<Vec<Vec<i8>>>();
        assert!(DESCRIPTORS.contains_key(&TypeId::of::<Vec<Vec<i8>>>()));
        assert_eq!(resolve::<Vec<Vec<i8>>>(), first);
    }

    #[test]
    fn variadic_signature_splits_parameters() {
        let signature = FunctionSignature::new(
            vec![
                TypeDescriptor::String,
                TypeDescriptor::Sequence(Box::new(TypeDescriptor::Bool)),
            ],
            true,
            Vec::new(),
        );
        assert_eq!(signature.fixed_count(), 1);
        assert_eq!(signature.rest_element(), Some(&TypeDescriptor::Bool));
    }
}
