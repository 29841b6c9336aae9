//! Immutable query plans.
//!
//! A [`QueryPlan`] is an append-only sequence of [`PlanOperation`]s. Every
//! fluent call returns a new plan that shares its prefix with the receiver,
//! so plans are cheap to branch and safe to compile from many threads.
//!
//! ```text
//! base ──► Where ──► OrderBy ──► Take(5)      (plan a)
//!                       └──────► Skip(10)     (plan b, shares Where+OrderBy)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::plan::{lambda, param, NodeExt, QueryPlan};
//!
//! let plan = QueryPlan::<Order>::new()
//!     .filter(lambda("o", param("o").member("Customer").member("Name").eq("Acme")))
//!     .order_by(lambda("o", param("o").member("Id")))
//!     .take(5);
//! ```

pub mod ast;
pub mod operation;

pub use ast::{
    captured, cond, init, lambda, lambda2, lit, list, null, param, record, BinaryOp, Lambda,
    Method, Node, NodeExt, UnaryOp,
};
pub use operation::{
    AggregateKind, DeleteTarget, Direction, JoinKind, PlanOperation, UpdateTarget,
};

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::metadata::{Entity, EntityDescriptor, EntityRef, Value};

/// Output shape of a `GroupBy` before it is projected.
pub struct Grouping;

/// Output shape of a terminal aggregate (`Count`, `Any`, `Sum`, ...).
pub struct Scalar;

struct PlanNode {
    op: PlanOperation,
    prev: Option<Arc<PlanNode>>,
}

/// A plan with its output type erased. Used for join and union operands.
#[derive(Clone)]
pub struct ErasedPlan {
    root: EntityRef,
    tail: Option<Arc<PlanNode>>,
    len: usize,
}

impl ErasedPlan {
    fn new(root: EntityRef) -> Self {
        Self {
            root,
            tail: None,
            len: 0,
        }
    }

    fn push(&self, op: PlanOperation) -> Self {
        Self {
            root: self.root,
            tail: Some(Arc::new(PlanNode {
                op,
                prev: self.tail.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Descriptor of the entity the plan reads from.
    pub fn root(&self) -> Arc<EntityDescriptor> {
        self.root.resolve()
    }

    /// Operations in insertion order.
    pub fn operations(&self) -> Vec<&PlanOperation> {
        let mut ops = Vec::with_capacity(self.len);
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            ops.push(&node.op);
            cursor = node.prev.as_deref();
        }
        ops.reverse();
        ops
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether two plans share the same operation storage.
    pub fn shares_prefix_with(&self, other: &ErasedPlan) -> bool {
        let mut mine = self.tail.as_ref();
        while let Some(node) = mine {
            let mut theirs = other.tail.as_ref();
            while let Some(candidate) = theirs {
                if Arc::ptr_eq(node, candidate) {
                    return true;
                }
                theirs = candidate.prev.as_ref();
            }
            mine = node.prev.as_ref();
        }
        false
    }
}

impl fmt::Debug for ErasedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.operations().iter().map(|op| op.name()).collect();
        f.debug_struct("Plan")
            .field("root", &self.root.type_name())
            .field("operations", &names)
            .finish()
    }
}

/// An immutable query plan producing values of type `T`.
pub struct QueryPlan<T> {
    inner: ErasedPlan,
    _shape: PhantomData<fn() -> T>,
}

impl<T> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _shape: PhantomData,
        }
    }
}

impl<T> fmt::Debug for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<T: Entity> QueryPlan<T> {
    /// Start a plan reading every row of `T`'s table.
    pub fn new() -> Self {
        Self::wrap(ErasedPlan::new(EntityRef::of::<T>()))
    }

    /// INSERT the given entities as a single multi-row statement.
    pub fn insert(rows: &[T]) -> Self {
        Self::insert_rows(rows, false)
    }

    /// INSERT one entity and read back its generated identity value.
    pub fn insert_returning_identity(row: &T) -> Self {
        Self::insert_rows(std::slice::from_ref(row), true)
    }

    fn insert_rows(rows: &[T], capture_identity: bool) -> Self {
        let field_count = crate::metadata::describe::<T>().fields().len();
        let rows = rows
            .iter()
            .map(|row| (0..field_count).map(|slot| row.field(slot)).collect())
            .collect();
        Self::new().then(PlanOperation::Insert {
            rows,
            capture_identity,
        })
    }

    /// UPDATE every non-key column of `entity`, matched by its primary key.
    pub fn update(entity: &T) -> Self {
        let field_count = crate::metadata::describe::<T>().fields().len();
        let values = (0..field_count).map(|slot| entity.field(slot)).collect();
        Self::new().then(PlanOperation::Update(UpdateTarget::Entity { values }))
    }

    /// DELETE the row with `entity`'s primary key.
    pub fn delete(entity: &T) -> Self {
        let desc = crate::metadata::describe::<T>();
        let key = desc.key_slots().into_iter().map(|slot| entity.field(slot)).collect();
        Self::new().then(PlanOperation::Delete(DeleteTarget::Key(key)))
    }

    /// DELETE by primary key values.
    pub fn delete_by_key(key: Vec<Value>) -> Self {
        Self::new().then(PlanOperation::Delete(DeleteTarget::Key(key)))
    }
}

impl<T: Entity> Default for QueryPlan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryPlan<T> {
    fn wrap(inner: ErasedPlan) -> Self {
        Self {
            inner,
            _shape: PhantomData,
        }
    }

    fn then(&self, op: PlanOperation) -> Self {
        Self::wrap(self.inner.push(op))
    }

    fn then_as<R>(&self, op: PlanOperation) -> QueryPlan<R> {
        QueryPlan::wrap(self.inner.push(op))
    }

    /// The type-erased plan.
    pub fn erased(&self) -> &ErasedPlan {
        &self.inner
    }

    pub fn operations(&self) -> Vec<&PlanOperation> {
        self.inner.operations()
    }

    // -------------------------------------------------------------------------
    // Filtering and projection
    // -------------------------------------------------------------------------

    /// Where. Multiple filters are AND-ed in insertion order; a filter after
    /// `group_by` becomes HAVING.
    pub fn filter(&self, predicate: Lambda) -> Self {
        self.then(PlanOperation::Where(predicate))
    }

    /// Project into a new shape.
    pub fn select<R>(&self, projection: Lambda) -> QueryPlan<R> {
        self.then_as(PlanOperation::Select(projection))
    }

    pub fn distinct(&self) -> Self {
        self.then(PlanOperation::Distinct)
    }

    // -------------------------------------------------------------------------
    // Ordering
    // -------------------------------------------------------------------------

    pub fn order_by(&self, key: Lambda) -> Self {
        self.then(PlanOperation::OrderBy {
            key,
            direction: Direction::Ascending,
        })
    }

    pub fn order_by_desc(&self, key: Lambda) -> Self {
        self.then(PlanOperation::OrderBy {
            key,
            direction: Direction::Descending,
        })
    }

    pub fn then_by(&self, key: Lambda) -> Self {
        self.then(PlanOperation::ThenBy {
            key,
            direction: Direction::Ascending,
        })
    }

    pub fn then_by_desc(&self, key: Lambda) -> Self {
        self.then(PlanOperation::ThenBy {
            key,
            direction: Direction::Descending,
        })
    }

    // -------------------------------------------------------------------------
    // Grouping
    // -------------------------------------------------------------------------

    pub fn group_by(&self, key: Lambda) -> QueryPlan<Grouping> {
        self.then_as(PlanOperation::GroupBy { key, element: None })
    }

    /// Group with an element selector; aggregates over the group see the
    /// selected element instead of the source row.
    pub fn group_by_element(&self, key: Lambda, element: Lambda) -> QueryPlan<Grouping> {
        self.then_as(PlanOperation::GroupBy {
            key,
            element: Some(element),
        })
    }

    // -------------------------------------------------------------------------
    // Joins and set operations
    // -------------------------------------------------------------------------

    /// Inner equi-join. `result` is a two-parameter lambda over (outer, inner).
    pub fn join<U, R>(
        &self,
        inner: &QueryPlan<U>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> QueryPlan<R> {
        self.join_with(JoinKind::Inner, inner, Some(outer_key), Some(inner_key), result)
    }

    /// Left outer equi-join.
    pub fn group_join<U, R>(
        &self,
        inner: &QueryPlan<U>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> QueryPlan<R> {
        self.join_with(JoinKind::Left, inner, Some(outer_key), Some(inner_key), result)
    }

    pub fn cross_join<U, R>(&self, inner: &QueryPlan<U>, result: Lambda) -> QueryPlan<R> {
        self.join_with(JoinKind::Cross, inner, None, None, result)
    }

    fn join_with<U, R>(
        &self,
        kind: JoinKind,
        inner: &QueryPlan<U>,
        outer_key: Option<Lambda>,
        inner_key: Option<Lambda>,
        result: Lambda,
    ) -> QueryPlan<R> {
        self.then_as(PlanOperation::Join {
            kind,
            inner: Arc::new(inner.inner.clone()),
            outer_key,
            inner_key,
            result,
        })
    }

    /// UNION ALL with another plan of the same shape.
    pub fn union(&self, other: &QueryPlan<T>) -> Self {
        self.then(PlanOperation::Union(Arc::new(other.inner.clone())))
    }

    // -------------------------------------------------------------------------
    // Paging
    // -------------------------------------------------------------------------

    pub fn skip(&self, count: u64) -> Self {
        self.then(PlanOperation::Skip(count))
    }

    /// Take at most `count` rows. `0` means unbounded.
    pub fn take(&self, count: u64) -> Self {
        self.then(PlanOperation::Take(count))
    }

    /// Freeze everything so far into a derived table.
    pub fn as_subquery(&self) -> Self {
        self.then(PlanOperation::AsSubQuery)
    }

    // -------------------------------------------------------------------------
    // Eager loading
    // -------------------------------------------------------------------------

    /// Load a navigation path, e.g. `o => o.Lines` or `o => o.Customer.Address`.
    pub fn include(&self, path: Lambda) -> Self {
        self.then(PlanOperation::Include { path, filter: None })
    }

    /// Load a navigation path, keeping only children matching `filter`.
    /// The filter becomes part of the join condition, not the WHERE clause.
    pub fn include_filtered(&self, path: Lambda, filter: Lambda) -> Self {
        self.then(PlanOperation::Include {
            path,
            filter: Some(filter),
        })
    }

    // -------------------------------------------------------------------------
    // Terminal operations
    // -------------------------------------------------------------------------

    pub fn count(&self) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Count, None)
    }

    pub fn count_where(&self, predicate: Lambda) -> QueryPlan<Scalar> {
        self.filter(predicate).count()
    }

    pub fn any(&self) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Any, None)
    }

    pub fn any_where(&self, predicate: Lambda) -> QueryPlan<Scalar> {
        self.filter(predicate).any()
    }

    pub fn sum(&self, selector: Lambda) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Sum, Some(selector))
    }

    pub fn min(&self, selector: Lambda) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Min, Some(selector))
    }

    pub fn max(&self, selector: Lambda) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Max, Some(selector))
    }

    pub fn average(&self, selector: Lambda) -> QueryPlan<Scalar> {
        self.aggregate(AggregateKind::Avg, Some(selector))
    }

    fn aggregate(&self, kind: AggregateKind, selector: Option<Lambda>) -> QueryPlan<Scalar> {
        self.then_as(PlanOperation::Aggregate { kind, selector })
    }

    /// UPDATE matched rows with the assignments of an initializer lambda.
    pub fn update_set(&self, assignments: Lambda) -> Self {
        self.then(PlanOperation::Update(UpdateTarget::Assign(assignments)))
    }

    /// DELETE every row matched by the preceding filters.
    pub fn delete_matching(&self) -> Self {
        self.then(PlanOperation::Delete(DeleteTarget::Matching))
    }
}
