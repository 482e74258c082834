use crate::error::BindError;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tether_core::{FieldDescriptor, MethodDescriptor, StructDescriptor};

/// Class metadata shared by every instance of a bound struct.
pub struct BindingMeta {
    class_name: String,
    descriptor: &'static StructDescriptor,
    special_fields: Vec<(&'static str, usize)>,
}

impl BindingMeta {
    /// Tagged fields are collected here once per class.
    pub fn new(class_name: impl Into<String>, descriptor: &'static StructDescriptor) -> Self {
        Self {
            class_name: class_name.into(),
            descriptor,
            special_fields: descriptor.special_fields(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn descriptor(&self) -> &'static StructDescriptor {
        self.descriptor
    }

    pub fn special_fields(&self) -> &[(&'static str, usize)] {
        &self.special_fields
    }

    /// Tagged field by tag, else untagged field by native name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        let fields = self.descriptor.fields();
        if let Some((_, index)) = self.special_fields.iter().find(|(tag, _)| *tag == name) {
            return fields.get(*index);
        }
        fields
            .iter()
            .find(|field| field.tag().is_none() && field.name() == name)
    }

    pub fn method(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.descriptor.method(name)
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.field(name).is_some() || self.method(name).is_some()
    }

    /// Script-visible member names: fields in declaration order, then methods.
    pub fn member_names(&self) -> impl Iterator<Item = &'static str> {
        let descriptor = self.descriptor;
        descriptor
            .fields()
            .iter()
            .map(FieldDescriptor::script_name)
            .chain(descriptor.methods().iter().map(MethodDescriptor::name))
    }

    pub fn qualified(&self, member: &str) -> String {
        format!("{}.{}", self.class_name, member)
    }
}

impl fmt::Debug for BindingMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingMeta")
            .field("class_name", &self.class_name)
            .field("type", &self.descriptor.name())
            .field("special_fields", &self.special_fields)
            .finish()
    }
}

/// Bound struct types of one runtime, keyed by host type. Append-only.
///
/// The script constructor of each class lives on the global object; the
/// registry only keeps what the host side needs to recognise instances.
#[derive(Default)]
pub struct BindingRegistry {
    entries: RwLock<HashMap<TypeId, Arc<BindingMeta>>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, meta: Arc<BindingMeta>) -> Result<Arc<BindingMeta>, BindError> {
        let type_id = meta.descriptor().type_id();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&type_id) {
            return Err(duplicate(meta.class_name(), existing));
        }
        entries.insert(type_id, Arc::clone(&meta));
        Ok(meta)
    }

    /// `DuplicateBinding` when `descriptor`'s type is already registered.
    pub fn check_vacant(
        &self,
        name: &str,
        descriptor: &StructDescriptor,
    ) -> Result<(), BindError> {
        match self.entries.read().get(&descriptor.type_id()) {
            Some(existing) => Err(duplicate(name, existing)),
            None => Ok(()),
        }
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<BindingMeta>> {
        self.entries.read().get(&type_id).cloned()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.entries.read().contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .values()
            .map(|meta| meta.class_name().to_string())
            .collect();
        names.sort();
        names
    }
}

fn duplicate(name: &str, existing: &BindingMeta) -> BindError {
    BindError::DuplicateBinding {
        name: name.to_string(),
        type_name: existing.descriptor().name().to_string(),
    }
}
