//! Instance wrappers
//!
//! The class object behind every bound instance: the host struct, the class
//! metadata and the per-instance bag of properties script assigned that have
//! no host field. Script only ever sees it as the target of the instance
//! proxy (see `interceptor`).
//!
//! QuickJS drops a class payload when its object is collected; the `Drop`
//! impl below is therefore the instance finalizer, and the only place an
//! ownership table entry is released.

use crate::ownership::OwnershipTable;
use crate::registry::BindingMeta;
use once_cell::sync::OnceCell;
use rquickjs::class::Trace;
use rquickjs::{Class, Ctx, Object, Value};
use std::sync::Arc;
use tether_core::StructRef;

/// A bound instance as script holds it.
pub type Instance<'js> = Class<'js, InstanceWrapper<'js>>;

#[derive(Trace)]
#[rquickjs::class]
pub struct InstanceWrapper<'js> {
    #[qjs(skip_trace)]
    target: StructRef,
    #[qjs(skip_trace)]
    meta: Arc<BindingMeta>,
    #[qjs(skip_trace)]
    ownership: Arc<OwnershipTable>,
    #[qjs(skip_trace)]
    owner_id: OnceCell<u64>,
    /// Null-prototype object; keys are the dynamic property names.
    dynamic: Object<'js>,
}

impl<'js> InstanceWrapper<'js> {
    pub fn new(
        ctx: &Ctx<'js>,
        target: StructRef,
        meta: Arc<BindingMeta>,
        ownership: Arc<OwnershipTable>,
    ) -> rquickjs::Result<Self> {
        let dynamic = Object::new(ctx.clone())?;
        dynamic.set_prototype(None)?;
        Ok(Self {
            target,
            meta,
            ownership,
            owner_id: OnceCell::new(),
            dynamic,
        })
    }

    pub fn target(&self) -> &StructRef {
        &self.target
    }

    pub fn meta(&self) -> &Arc<BindingMeta> {
        &self.meta
    }

    pub fn owner_id(&self) -> Option<u64> {
        self.owner_id.get().copied()
    }

    /// Enter the struct into the ownership table. Idempotent: a wrapper that
    /// already has an owner id keeps it.
    pub(crate) fn retain(&self) -> u64 {
        *self.owner_id.get_or_init(|| {
            self.ownership
                .retain(self.target.clone(), self.meta.class_name())
        })
    }

    pub fn get_dynamic(&self, name: &str) -> rquickjs::Result<Option<Value<'js>>> {
        if !self.dynamic.contains_key(name)? {
            return Ok(None);
        }
        self.dynamic.get(name).map(Some)
    }

    pub fn has_dynamic(&self, name: &str) -> rquickjs::Result<bool> {
        self.dynamic.contains_key(name)
    }

    /// Upsert in place.
    pub fn set_dynamic(&self, name: &str, value: Value<'js>) -> rquickjs::Result<()> {
        self.dynamic.set(name, value)
    }

    /// `false` when there was nothing to delete.
    pub fn delete_dynamic(&self, name: &str) -> rquickjs::Result<bool> {
        if !self.dynamic.contains_key(name)? {
            return Ok(false);
        }
        self.dynamic.remove(name)?;
        Ok(true)
    }

    /// Live dynamic names. Array-index names come first in ascending order,
    /// the others in insertion order.
    pub fn dynamic_names(&self) -> rquickjs::Result<Vec<String>> {
        self.dynamic.keys::<String>().collect()
    }
}

impl Drop for InstanceWrapper<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.owner_id.get() {
            self.ownership.release(*id);
        }
    }
}
