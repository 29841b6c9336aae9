//! The `Entity` trait implemented by every mapped type.
//!
//! Rust has no runtime reflection, so an entity exposes its fields by slot
//! (the field's ordinal in its descriptor) and accepts nested objects through
//! `attach`. The materializer never touches a field by name at row time.

use std::any::Any;

use super::descriptor::EntityDescriptor;
use super::value::{ConversionError, Value};

/// A type mapped to a table (or a projection shape without a table).
pub trait Entity: Default + Send + 'static {
    /// Describe columns, keys and relationships. Called once per process;
    /// use [`crate::metadata::describe`] to get the cached descriptor.
    fn describe() -> EntityDescriptor;

    /// Assign the field at `slot`.
    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError>;

    /// Read the field at `slot` (used by INSERT/UPDATE and key extraction).
    fn field(&self, slot: usize) -> Value;

    /// Attach a nested object built for the navigation `member`.
    ///
    /// Single-valued navigations are set, collection navigations are appended to.
    fn attach(&mut self, member: &str, child: Box<dyn Any>) -> Result<(), AttachError> {
        let _ = child;
        Err(AttachError::UnknownMember(member.to_string()))
    }
}

/// A nested object could not be attached to its parent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttachError {
    #[error("no navigation member named '{0}'")]
    UnknownMember(String),

    #[error("navigation '{member}' expects {expected}")]
    TypeMismatch {
        member: String,
        expected: &'static str,
    },
}

/// Failure while assembling a record from its parts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("field slot {slot}: {source}")]
    Field {
        slot: usize,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// Downcast a child handed to [`Entity::attach`].
pub fn downcast_child<T: Entity>(member: &str, child: Box<dyn Any>) -> Result<T, AttachError> {
    child
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| AttachError::TypeMismatch {
            member: member.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

/// Build a `T` from slot values and already-built children.
///
/// Stored in each descriptor as a plain function pointer so nested objects of
/// any type can be constructed without knowing `T` at the call site.
pub(crate) fn build_record<T: Entity>(
    fields: Vec<(usize, Value)>,
    children: Vec<(String, Box<dyn Any>)>,
) -> Result<Box<dyn Any>, RecordError> {
    let mut record = T::default();
    for (slot, value) in fields {
        record
            .set_field(slot, value)
            .map_err(|source| RecordError::Field { slot, source })?;
    }
    for (member, child) in children {
        record.attach(&member, child)?;
    }
    Ok(Box::new(record))
}

/// Function pointer type produced by [`build_record`].
pub type BuildFn =
    fn(Vec<(usize, Value)>, Vec<(String, Box<dyn Any>)>) -> Result<Box<dyn Any>, RecordError>;
