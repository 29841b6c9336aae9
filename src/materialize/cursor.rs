//! Forward-only row sources.

use std::collections::VecDeque;

use super::error::{MaterializeError, MaterializeResult};
use crate::metadata::Value;

/// A forward-only result set produced by whoever executed the command.
///
/// Cells are positional and must follow the compiled column order. A cursor
/// is consumed by one materialization at a time.
pub trait ResultCursor {
    /// Number of columns in every row.
    fn column_count(&self) -> usize;

    /// The next row, or `None` once the result is exhausted.
    fn next_row(&mut self) -> MaterializeResult<Option<Vec<Value>>>;
}

impl<C: ResultCursor + ?Sized> ResultCursor for &mut C {
    fn column_count(&self) -> usize {
        (**self).column_count()
    }

    fn next_row(&mut self) -> MaterializeResult<Option<Vec<Value>>> {
        (**self).next_row()
    }
}

/// In-memory cursor over buffered rows.
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl VecCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    /// Build from `(column, ..)` names and rows of anything convertible.
    pub fn from_rows<V: Into<Value>>(columns: &[&str], rows: Vec<Vec<V>>) -> Self {
        Self::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl ResultCursor for VecCursor {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn next_row(&mut self) -> MaterializeResult<Option<Vec<Value>>> {
        let Some(row) = self.rows.pop_front() else {
            return Ok(None);
        };
        if row.len() != self.columns.len() {
            return Err(MaterializeError::Cursor(format!(
                "row has {} cells for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        Ok(Some(row))
    }
}
