//! Result shape descriptors.
//!
//! A compiled SELECT carries a description of its column layout: which
//! output column feeds which member of which object, where each nested
//! object's columns start, and which columns identify a row for fan-out
//! de-duplication. The materializer consumes nothing else.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Role of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Feeds a member of its owning object.
    Member,
    /// Non-NULL iff the navigation it precedes produced a row.
    Split,
    /// Hidden identity column of the root object.
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Source column, or the member name for computed expressions.
    pub name: String,
    /// Unique output name in the SELECT list.
    pub output: String,
    /// Table alias the column was read from.
    pub alias: Option<String>,
    pub member: String,
    /// Navigation owning the column; `None` for the root object.
    pub owner: Option<usize>,
    pub kind: ColumnKind,
}

/// Column range of one nested object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavigationDescriptor {
    /// Canonical path from the root, e.g. `Order.Customer.Address`.
    pub path: String,
    pub member: String,
    /// Parent navigation; `None` when attached to the root object.
    pub parent: Option<usize>,
    pub start_index: usize,
    pub field_count: usize,
    pub split_index: Option<usize>,
    pub collection: bool,
    /// Row positions identifying one child (collections only).
    pub key_columns: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultShape {
    pub columns: Vec<ColumnDescriptor>,
    pub navigations: Vec<NavigationDescriptor>,
    /// Row positions identifying the root object. Set when the result
    /// fans out through a collection.
    pub root_key: Vec<usize>,
    /// Single value per row instead of an object.
    pub scalar: bool,
}

impl ResultShape {
    /// A single computed column.
    pub fn scalar(output: &str) -> Self {
        Self {
            columns: vec![ColumnDescriptor {
                name: output.to_string(),
                output: output.to_string(),
                alias: None,
                member: output.to_string(),
                owner: None,
                kind: ColumnKind::Member,
            }],
            scalar: true,
            ..Default::default()
        }
    }

    pub fn has_collections(&self) -> bool {
        self.navigations.iter().any(|n| n.collection)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Accumulates columns and navigations with unique output names.
#[derive(Debug, Default)]
pub(crate) struct ShapeBuilder {
    shape: ResultShape,
    used: HashSet<String>,
}

impl ShapeBuilder {
    /// `base`, or `base1`, `base2`, ... when taken.
    fn unique(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.used.contains(&candidate) {
            candidate = format!("{}{}", base, n);
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }

    /// Add a column, returning its row position and output name.
    pub fn push(
        &mut self,
        name: &str,
        alias: Option<&str>,
        member: &str,
        owner: Option<usize>,
        kind: ColumnKind,
    ) -> (usize, String) {
        let output = self.unique(member);
        self.shape.columns.push(ColumnDescriptor {
            name: name.to_string(),
            output: output.clone(),
            alias: alias.map(Into::into),
            member: member.to_string(),
            owner,
            kind,
        });
        (self.shape.columns.len() - 1, output)
    }

    /// Open a navigation whose member columns start at the next position.
    pub fn begin_navigation(
        &mut self,
        path: &str,
        member: &str,
        parent: Option<usize>,
        split_index: Option<usize>,
        collection: bool,
    ) -> usize {
        self.shape.navigations.push(NavigationDescriptor {
            path: path.to_string(),
            member: member.to_string(),
            parent,
            start_index: self.shape.columns.len(),
            field_count: 0,
            split_index,
            collection,
            key_columns: Vec::new(),
        });
        self.shape.navigations.len() - 1
    }

    pub fn finish_navigation(&mut self, index: usize, key_columns: Vec<usize>) {
        let end = self.shape.columns.len();
        if let Some(nav) = self.shape.navigations.get_mut(index) {
            nav.field_count = end - nav.start_index;
            nav.key_columns = key_columns;
        }
    }

    pub fn set_root_key(&mut self, positions: Vec<usize>) {
        self.shape.root_key = positions;
    }

    pub fn mark_scalar(&mut self) {
        self.shape.scalar = true;
    }

    pub fn finish(self) -> ResultShape {
        self.shape
    }
}
