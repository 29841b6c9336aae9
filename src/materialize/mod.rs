//! Result materializer.
//!
//! Turns the rows of an executed SELECT back into objects using the
//! [`ResultShape`] recorded at compile time:
//!
//! ```text
//! ResultCursor ──rows──► Materialized<T> ──► T, T, T ...
//!                             │
//!                  Extractor (cached per type + shape)
//!                  adjacency grouping on the root key
//!                  per-navigation seen-key sets
//! ```
//!
//! Results without collections yield one object per row. Results with
//! collections must arrive ordered by the root key, which the compiler
//! guarantees by appending it to ORDER BY.

mod builder;
mod cursor;
mod error;
mod extractor;

pub use builder::{Materialized, Scalars};
pub use cursor::{ResultCursor, VecCursor};
pub use error::{MaterializeError, MaterializeResult};
pub use extractor::{cached_count, extractor_for, Extractor, NavigationPlan, ObjectPlan};

use crate::compiler::ResultShape;
use crate::metadata::{describe, Entity, FromValue};

/// Read objects of type `T` from `cursor`.
///
/// Fails up front when the cursor's column count differs from `shape`;
/// per-row failures surface through the returned iterator.
pub fn materialize<T: Entity, C: ResultCursor>(
    cursor: C,
    shape: &ResultShape,
) -> MaterializeResult<Materialized<T, C>> {
    check_width(cursor.column_count(), shape.column_count())?;
    let extractor = extractor_for(describe::<T>(), shape)?;
    Ok(Materialized::new(cursor, extractor))
}

/// Read single-column values, e.g. an aggregate or a projected member.
pub fn materialize_scalars<V: FromValue, C: ResultCursor>(
    cursor: C,
    shape: &ResultShape,
) -> MaterializeResult<Scalars<V, C>> {
    check_width(shape.column_count(), 1)?;
    check_width(cursor.column_count(), 1)?;
    let member = shape
        .columns
        .first()
        .map(|c| c.member.clone())
        .unwrap_or_default();
    Ok(Scalars::new(cursor, member))
}

/// The single value of a scalar query, `None` when no row came back.
pub fn materialize_scalar<V: FromValue, C: ResultCursor>(
    cursor: C,
    shape: &ResultShape,
) -> MaterializeResult<Option<V>> {
    materialize_scalars(cursor, shape)?.next().transpose()
}

fn check_width(actual: usize, expected: usize) -> MaterializeResult<()> {
    if actual != expected {
        return Err(MaterializeError::ShapeMismatch { expected, actual });
    }
    Ok(())
}
