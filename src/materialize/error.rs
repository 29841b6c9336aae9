//! Materialization errors.

use crate::metadata::{AttachError, EntityDescriptor, RecordError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterializeError {
    /// A row could not be turned into an object member.
    #[error("cannot materialize {entity}.{member}: {reason}")]
    Materialization {
        entity: String,
        member: String,
        reason: String,
    },

    /// Column count of the result differs from the compiled shape.
    #[error("result has {actual} columns, shape expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Failure reported by the row source.
    #[error("cursor error: {0}")]
    Cursor(String),

    #[error("member '{member}': expected {expected}, found {found}")]
    Conversion {
        member: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl MaterializeError {
    pub(crate) fn materialization(
        entity: &str,
        member: &str,
        reason: impl Into<String>,
    ) -> Self {
        MaterializeError::Materialization {
            entity: entity.to_string(),
            member: member.to_string(),
            reason: reason.into(),
        }
    }

    /// Name the member behind a failed record build.
    pub(crate) fn from_record(entity: &EntityDescriptor, err: RecordError) -> Self {
        match err {
            RecordError::Field { slot, source } => MaterializeError::Conversion {
                member: entity
                    .fields()
                    .get(slot)
                    .map(|f| f.member.clone())
                    .unwrap_or_else(|| format!("#{}", slot)),
                expected: source.expected,
                found: source.found,
            },
            RecordError::Attach(attach) => {
                let member = match &attach {
                    AttachError::UnknownMember(member) => member.clone(),
                    AttachError::TypeMismatch { member, .. } => member.clone(),
                };
                MaterializeError::materialization(entity.name(), &member, attach.to_string())
            }
        }
    }
}

pub type MaterializeResult<T> = Result<T, MaterializeError>;
