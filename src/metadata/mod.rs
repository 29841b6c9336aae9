//! Entity metadata registry.
//!
//! Each [`Entity`] describes itself once; the resulting [`EntityDescriptor`]
//! is cached for the lifetime of the process, keyed by `TypeId`.
//!
//! ```text
//! ┌──────────────┐  describe::<T>()  ┌──────────────────────────────┐
//! │  T: Entity   │ ────────────────► │ DashMap<TypeId, Arc<Desc>>   │
//! └──────────────┘   (first call     └──────────────────────────────┘
//!                     computes)
//! ```
//!
//! Population follows compute-once, publish-idempotently: the descriptor is
//! built outside any shard lock and the first published value wins. A race
//! that builds the same descriptor twice is harmless.

mod descriptor;
mod record;
mod value;

pub use descriptor::{
    Cardinality, DescriptorBuilder, EntityDescriptor, EntityRef, FieldDescriptor, ForeignKey,
    NavigationMember,
};
pub use record::{downcast_child, AttachError, BuildFn, Entity, RecordError};
pub use value::{ConversionError, DataType, FromValue, Value};

pub(crate) use value::KeyPart;

use std::any::TypeId;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

static REGISTRY: LazyLock<DashMap<TypeId, Arc<EntityDescriptor>>> = LazyLock::new(DashMap::new);

/// Get the cached descriptor for `T`, describing it on first use.
pub fn describe<T: Entity>() -> Arc<EntityDescriptor> {
    let type_id = TypeId::of::<T>();
    if let Some(existing) = REGISTRY.get(&type_id) {
        return Arc::clone(existing.value());
    }

    let built = Arc::new(T::describe());
    log::debug!(
        "described entity {} ({} fields, {} navigations)",
        built.name(),
        built.fields().len(),
        built.navigations().len()
    );

    Arc::clone(REGISTRY.entry(type_id).or_insert(built).value())
}

/// Number of described entity types (diagnostics).
pub fn registered_count() -> usize {
    REGISTRY.len()
}
