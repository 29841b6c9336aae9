//! Plan operations.

use std::sync::Arc;

use super::ast::Lambda;
use super::ErasedPlan;
use crate::metadata::Value;

/// Sort direction of an ordering operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// How an explicit join combines its two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `Join`: inner equi-join.
    Inner,
    /// `GroupJoin`: left outer equi-join.
    Left,
    /// Cartesian product without keys.
    Cross,
}

/// Terminal scalar operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Any,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    /// SQL function name. `Any` renders through `COUNT`.
    pub fn function_name(&self) -> &'static str {
        match self {
            AggregateKind::Any | AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Avg => "AVG",
        }
    }

    /// Whether the operation needs a value selector.
    pub fn needs_selector(&self) -> bool {
        matches!(
            self,
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max | AggregateKind::Avg
        )
    }
}

/// UPDATE targeting.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateTarget {
    /// Every non-key, non-identity column, matched by primary key.
    /// `values` are the entity's field values by slot.
    Entity { values: Vec<Value> },
    /// Assignments from an initializer lambda (`o => new Order { .. }`),
    /// applied to rows matched by the preceding Where operations.
    Assign(Lambda),
}

/// DELETE targeting.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    /// Match by primary key values, in key order.
    Key(Vec<Value>),
    /// Match by the preceding Where operations.
    Matching,
}

/// A single fluent call recorded on a plan.
#[derive(Debug, Clone)]
pub enum PlanOperation {
    Where(Lambda),
    Select(Lambda),
    OrderBy {
        key: Lambda,
        direction: Direction,
    },
    ThenBy {
        key: Lambda,
        direction: Direction,
    },
    GroupBy {
        key: Lambda,
        element: Option<Lambda>,
    },
    Join {
        kind: JoinKind,
        inner: Arc<ErasedPlan>,
        outer_key: Option<Lambda>,
        inner_key: Option<Lambda>,
        result: Lambda,
    },
    Skip(u64),
    Take(u64),
    Distinct,
    Union(Arc<ErasedPlan>),
    Include {
        path: Lambda,
        filter: Option<Lambda>,
    },
    Insert {
        /// Field values by slot, one entry per row.
        rows: Vec<Vec<Value>>,
        capture_identity: bool,
    },
    Update(UpdateTarget),
    Delete(DeleteTarget),
    Aggregate {
        kind: AggregateKind,
        selector: Option<Lambda>,
    },
    AsSubQuery,
}

impl PlanOperation {
    /// Operation name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            PlanOperation::Where(_) => "Where",
            PlanOperation::Select(_) => "Select",
            PlanOperation::OrderBy {
                direction: Direction::Ascending,
                ..
            } => "OrderBy",
            PlanOperation::OrderBy { .. } => "OrderByDescending",
            PlanOperation::ThenBy {
                direction: Direction::Ascending,
                ..
            } => "ThenBy",
            PlanOperation::ThenBy { .. } => "ThenByDescending",
            PlanOperation::GroupBy { .. } => "GroupBy",
            PlanOperation::Join {
                kind: JoinKind::Left,
                ..
            } => "GroupJoin",
            PlanOperation::Join { .. } => "Join",
            PlanOperation::Skip(_) => "Skip",
            PlanOperation::Take(_) => "Take",
            PlanOperation::Distinct => "Distinct",
            PlanOperation::Union(_) => "Union",
            PlanOperation::Include { .. } => "Include",
            PlanOperation::Insert { .. } => "Insert",
            PlanOperation::Update(_) => "Update",
            PlanOperation::Delete(_) => "Delete",
            PlanOperation::Aggregate { kind, .. } => match kind {
                AggregateKind::Any => "Any",
                AggregateKind::Count => "Count",
                AggregateKind::Sum => "Sum",
                AggregateKind::Min => "Min",
                AggregateKind::Max => "Max",
                AggregateKind::Avg => "Avg",
            },
            PlanOperation::AsSubQuery => "AsSubQuery",
        }
    }

    /// Whether this operation ends the plan (nothing may follow it).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanOperation::Insert { .. }
                | PlanOperation::Update(_)
                | PlanOperation::Delete(_)
                | PlanOperation::Aggregate { .. }
        )
    }
}
