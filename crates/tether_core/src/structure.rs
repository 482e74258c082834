//! Bound host structs
//!
//! Rust has no runtime reflection, so a struct exposed to script describes
//! itself once through `host_struct!`: which fields are visible (in
//! declaration order, optionally renamed by a tag) and which methods can be
//! called. The descriptor is built on first use and lives for the process.

use crate::descriptor::{resolve, FunctionSignature, StructType, TypeDescriptor};
use crate::error::CallError;
use crate::function::HostFunction;
use crate::host_type::{shared, HostType, Shared};
use crate::value::HostValue;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Field and method access on a bound struct, implemented by `host_struct!`.
pub trait HostStruct: Send + 'static {
    fn describe() -> &'static StructDescriptor
    where
        Self: Sized;

    fn descriptor(&self) -> &'static StructDescriptor;

    /// Field `index` in declaration order.
    fn field(&self, index: usize) -> HostValue;

    /// Store a value already produced by `FieldDescriptor::convert`.
    /// Returns `false` when it is not of the field's type.
    fn store_field(&mut self, index: usize, value: Box<dyn Any + Send>) -> bool;

    /// Returns `false` (leaving the field untouched) when `value` does not
    /// convert to the field type.
    fn set_field(&mut self, index: usize, value: HostValue) -> bool {
        let Some(field) = self.descriptor().fields().get(index) else {
            return false;
        };
        match field.convert(value) {
            Some(converted) => self.store_field(index, converted),
            None => false,
        }
    }
}

/// A script-visible field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: &'static str,
    tag: Option<&'static str>,
    ty: TypeDescriptor,
    index: usize,
    convert: fn(HostValue) -> Option<Box<dyn Any + Send>>,
}

impl FieldDescriptor {
    /// Native (Rust) field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Alternate script name from `#[script_field = "..."]`.
    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    /// The name script code addresses the field by.
    pub fn script_name(&self) -> &'static str {
        self.tag.unwrap_or(self.name)
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Typed form of `value` for `HostStruct::store_field`. Needs no access
    /// to the struct that will receive it.
    pub fn convert(&self, value: HostValue) -> Option<Box<dyn Any + Send>> {
        (self.convert)(value)
    }
}

fn convert_field<F: HostType>(value: HostValue) -> Option<Box<dyn Any + Send>> {
    F::from_host(value).map(|converted| Box::new(converted) as Box<dyn Any + Send>)
}

pub type MethodCall =
    Arc<dyn Fn(&StructRef, Vec<HostValue>) -> Result<Vec<HostValue>, CallError> + Send + Sync>;

/// A script-callable method.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: &'static str,
    signature: Arc<FunctionSignature>,
    call: MethodCall,
}

impl MethodDescriptor {
    pub fn new<F>(name: &'static str, signature: FunctionSignature, call: F) -> Self
    where
        F: Fn(&StructRef, Vec<HostValue>) -> Result<Vec<HostValue>, CallError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            signature: Arc::new(signature),
            call: Arc::new(call),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn signature(&self) -> &Arc<FunctionSignature> {
        &self.signature
    }

    /// The method with its receiver fixed.
    pub fn bind(&self, target: &StructRef) -> HostFunction {
        let call = self.call.clone();
        let target = target.clone();
        HostFunction::from_parts(self.name, self.signature.clone(), move |args| {
            target
                .with_resolved(|receiver| call(receiver, args))
                .unwrap_or_else(|| {
                    Err(CallError::Receiver {
                        expected: target.type_name(),
                    })
                })
        })
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

pub struct StructDescriptor {
    struct_type: StructType,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
    zero: fn() -> StructRef,
}

impl StructDescriptor {
    pub fn builder<T: HostStruct + Default>(name: &'static str) -> StructDescriptorBuilder {
        StructDescriptorBuilder {
            struct_type: StructType::new(TypeId::of::<T>(), name, T::describe),
            fields: Vec::new(),
            methods: Vec::new(),
            zero: zero_of::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.struct_type.name()
    }

    pub fn type_id(&self) -> TypeId {
        self.struct_type.type_id()
    }

    pub fn struct_type(&self) -> StructType {
        self.struct_type
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// `(tag, field index)` for every tagged field.
    pub fn special_fields(&self) -> Vec<(&'static str, usize)> {
        self.fields
            .iter()
            .filter_map(|field| field.tag.map(|tag| (tag, field.index)))
            .collect()
    }

    /// A fresh zero-valued instance.
    pub fn zero(&self) -> StructRef {
        (self.zero)()
    }
}

impl fmt::Debug for StructDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructDescriptor")
            .field("name", &self.name())
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .finish()
    }
}

fn zero_of<T: HostStruct + Default>() -> StructRef {
    StructRef::new(shared(T::default()))
}

pub struct StructDescriptorBuilder {
    struct_type: StructType,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
    zero: fn() -> StructRef,
}

impl StructDescriptorBuilder {
    pub fn field<F: HostType>(mut self, name: &'static str, tag: Option<&'static str>) -> Self {
        let index = self.fields.len();
        self.fields.push(FieldDescriptor {
            name,
            tag,
            ty: resolve::<F>(),
            index,
            convert: convert_field::<F>,
        });
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> StructDescriptor {
        StructDescriptor {
            struct_type: self.struct_type,
            fields: self.fields,
            methods: self.methods,
            zero: self.zero,
        }
    }
}

#[derive(Clone)]
enum Target {
    Owned {
        object: Arc<Mutex<dyn HostStruct>>,
        typed: Arc<dyn Any + Send + Sync>,
    },
    /// By-value struct field `index` of `parent`.
    Field { parent: Box<StructRef>, index: usize },
}

/// Shared handle to a live host struct of any bound type, or to a by-value
/// struct field inside one.
#[derive(Clone)]
pub struct StructRef {
    target: Target,
    descriptor: &'static StructDescriptor,
}

impl StructRef {
    pub fn new<T: HostStruct>(target: Shared<T>) -> Self {
        let typed: Arc<dyn Any + Send + Sync> = target.clone();
        Self {
            target: Target::Owned {
                object: target,
                typed,
            },
            descriptor: T::describe(),
        }
    }

    pub fn descriptor(&self) -> &'static StructDescriptor {
        self.descriptor
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.name()
    }

    /// Reads lock the struct; a method running on the same instance holds
    /// the lock for its whole call.
    pub fn field(&self, index: usize) -> HostValue {
        match &self.target {
            Target::Owned { object, .. } => object.lock().field(index),
            Target::Field { .. } => self
                .resolve()
                .map(|current| current.field(index))
                .unwrap_or_default(),
        }
    }

    pub fn set_field(&self, index: usize, value: HostValue) -> bool {
        match &self.target {
            Target::Owned { object, .. } => {
                let Some(field) = self.descriptor.fields().get(index) else {
                    return false;
                };
                // converting may read this same struct, so it runs unlocked
                let Some(converted) = field.convert(value) else {
                    return false;
                };
                object.lock().store_field(index, converted)
            }
            Target::Field { .. } => self
                .with_resolved(|current| current.set_field(index, value))
                .unwrap_or(false),
        }
    }

    /// View of by-value struct field `index` that reads and writes through
    /// this struct. `None` when that field is not a by-value struct.
    pub fn project(&self, index: usize) -> Option<StructRef> {
        let field = self.descriptor.fields().get(index)?;
        let TypeDescriptor::Struct(struct_type) = field.ty() else {
            return None;
        };
        Some(StructRef {
            target: Target::Field {
                parent: Box::new(self.clone()),
                index,
            },
            descriptor: struct_type.descriptor(),
        })
    }

    pub fn is_projection(&self) -> bool {
        matches!(self.target, Target::Field { .. })
    }

    /// A projection's current field value, copied out of the parent.
    fn resolve(&self) -> Option<StructRef> {
        match &self.target {
            Target::Owned { .. } => Some(self.clone()),
            Target::Field { parent, index } => match parent.field(*index) {
                HostValue::Struct(current) => Some(current),
                _ => None,
            },
        }
    }

    /// Run `f` against the struct itself. A projection hands `f` a copy of
    /// the field and stores the copy back into the parent afterwards.
    pub fn with_resolved<R>(&self, f: impl FnOnce(&StructRef) -> R) -> Option<R> {
        match &self.target {
            Target::Owned { .. } => Some(f(self)),
            Target::Field { parent, index } => {
                let current = self.resolve()?;
                let result = f(&current);
                parent.set_field(*index, HostValue::Struct(current));
                Some(result)
            }
        }
    }

    /// The shared struct. For a projection this is a detached copy.
    pub fn downcast<T: HostStruct>(&self) -> Option<Shared<T>> {
        match &self.target {
            Target::Owned { typed, .. } => typed.clone().downcast::<Mutex<T>>().ok(),
            Target::Field { .. } => self.resolve()?.downcast(),
        }
    }

    pub fn ptr_eq(&self, other: &StructRef) -> bool {
        match (&self.target, &other.target) {
            (Target::Owned { typed: a, .. }, Target::Owned { typed: b, .. }) => Arc::ptr_eq(a, b),
            (
                Target::Field { parent: a, index: i },
                Target::Field { parent: b, index: j },
            ) => i == j && a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for StructRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Owned { typed, .. } => f
                .debug_struct("StructRef")
                .field("type", &self.type_name())
                .field("address", &format_args!("{:p}", Arc::as_ptr(typed)))
                .finish(),
            Target::Field { parent, index } => f
                .debug_struct("StructRef")
                .field("type", &self.type_name())
                .field("parent", parent)
                .field("field", index)
                .finish(),
        }
    }
}
