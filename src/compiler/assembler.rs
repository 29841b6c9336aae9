//! SELECT assembly.
//!
//! Walks a [`SelectTree`] clause by clause, rendering each through its
//! visitor, then appends the navigation joins the visitors registered.
//! Visiting order fixes alias and parameter numbering:
//!
//! 1. FROM (a derived source is assembled first, in its own alias scope)
//! 2. explicit JOINs, in declaration order
//! 3. WHERE, GROUP BY, HAVING
//! 4. SELECT list
//! 5. ORDER BY, then paging
//! 6. navigation LEFT JOINs, in first-registration order
//! 7. UNION ALL siblings, each in its own alias scope

use super::alias::AliasKey;
use super::builder::{FragmentBuilder, Scope};
use super::reducer::{SelectTree, TreeSource, GROUP, SOURCE};
use super::shape::ResultShape;
use super::visitor::{
    AggregateVisitor, Env, Fragment, GroupBinding, JoinVisitor, Layout, OrderByVisitor,
    RowBinding, SelectVisitor, WhereVisitor,
};
use super::{CompileError, CompileResult};
use crate::plan::JoinKind;
use crate::sql::{JoinType, OrderByExpr, Query, SelectExpr, Source, TableRef};

/// Output column of terminal aggregates.
pub const AGGREGATE_OUTPUT: &str = "Value";

/// An assembled SELECT.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub query: Query,
    pub shape: ResultShape,
    /// How an enclosing SELECT reads this one as a derived table.
    pub layout: Layout,
}

/// Assemble `tree` in the builder's current scope.
pub fn assemble(cx: &mut FragmentBuilder<'_>, tree: &SelectTree) -> CompileResult<Assembled> {
    let alias = cx.resolve_alias(AliasKey::Primary)?;
    let (from, row) = source(cx, &tree.source, &alias)?;
    let mut env = Env::new().with(SOURCE, row);
    let root = tree
        .source_entity()
        .map(|e| e.name().to_string())
        .unwrap_or_else(|| "Result".to_string());

    let mut joins = Vec::with_capacity(tree.joins.len());
    for (i, join) in tree.joins.iter().enumerate() {
        let alias = cx.resolve_alias(AliasKey::Join(i + 1))?;
        let (joined, row) = source(cx, &join.source, &alias)?;
        env = env.with(&join.var, row);
        let on = match (&join.outer_key, &join.inner_key) {
            (Some(outer), Some(inner)) => Some(JoinVisitor::new().on_clause(cx, &env, outer, inner)?),
            _ => None,
        };
        let join_type = match join.kind {
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Left => JoinType::Left,
            JoinKind::Cross => JoinType::Cross,
        };
        joins.push((join_type, joined, on));
    }

    let filter = WhereVisitor::new("WHERE").conjunction(cx, &env, &tree.wheres)?;

    let mut group_keys = Vec::new();
    if let Some(group) = &tree.group_by {
        group_keys = OrderByVisitor::group_by().keys(cx, &env, &group.key)?;
        env = env.with(
            GROUP,
            Fragment::Group(Box::new(GroupBinding {
                key: group.key.clone(),
                element: group.element.clone(),
            })),
        );
    }
    let having = WhereVisitor::new("HAVING").conjunction(cx, &env, &tree.havings)?;

    let (select, shape, layout, root_key) = match &tree.aggregate {
        Some((kind, selector)) => {
            let value = AggregateVisitor::new().terminal(cx, &env, *kind, selector.as_ref())?;
            let layout = Layout::Column(AGGREGATE_OUTPUT.to_string(), value.data_type);
            let select = vec![SelectExpr::new(value.expr).with_alias(AGGREGATE_OUTPUT)];
            (select, ResultShape::scalar(AGGREGATE_OUTPUT), layout, Vec::new())
        }
        None => {
            let p = SelectVisitor::new().project(cx, &env, &tree.shape, &tree.includes, &root)?;
            (p.select, p.shape, p.layout, p.root_key)
        }
    };

    let mut order_by = Vec::new();
    if tree.aggregate.is_none() {
        order_by = OrderByVisitor::order_by().order(cx, &env, &tree.order_by)?;
        // rows of one root object must stay adjacent
        for key in root_key {
            if !order_by.iter().any(|o: &OrderByExpr| o.expr == key) {
                order_by.push(OrderByExpr::asc(key));
            }
        }
    }

    let mut query = Query::new().select(select).from(from);
    if tree.distinct {
        query = query.distinct();
    }
    for (join_type, source, on) in joins {
        query = query.join(join_type, source, on);
    }
    for nav in cx.take_navigation_joins() {
        query = query.left_join(nav.table, nav.on);
    }
    if let Some(filter) = filter {
        query = query.filter(filter);
    }
    if !group_keys.is_empty() {
        query = query.group_by(group_keys);
    }
    if let Some(having) = having {
        query = query.having(having);
    }
    if !order_by.is_empty() {
        query = query.order_by(order_by);
    }
    if tree.skip > 0 {
        query = query.offset(tree.skip);
    }
    if let Some(take) = tree.take {
        query = query.limit(take);
    }

    for sibling in &tree.unions {
        let other = cx.scoped(Scope::Derived, |cx| assemble(cx, sibling))?;
        if other.shape.column_count() != shape.column_count() {
            return Err(CompileError::plan(format!(
                "UNION operands have {} and {} columns",
                shape.column_count(),
                other.shape.column_count()
            )));
        }
        query = query.union_all(other.query);
    }

    log::debug!(
        "assembled SELECT over {} ({} columns, {} navigations)",
        root,
        shape.column_count(),
        shape.navigations.len()
    );
    Ok(Assembled {
        query,
        shape,
        layout,
    })
}

/// FROM/JOIN source for `source` under `alias`, and the row it binds.
fn source(cx: &mut FragmentBuilder<'_>, source: &TreeSource, alias: &str) -> CompileResult<(Source, Fragment)> {
    match source {
        TreeSource::Table(entity) => {
            let table = entity
                .table()
                .ok_or_else(|| CompileError::UnknownEntity(entity.name().to_string()))?;
            let table = TableRef::new(table)
                .with_schema(entity.schema())
                .with_alias(alias);
            Ok((
                Source::Table(table),
                Fragment::Row(RowBinding::table(alias, entity.clone())),
            ))
        }
        TreeSource::Subquery(inner) => {
            let inner = cx.scoped(Scope::Derived, |cx| assemble(cx, inner))?;
            let row = inner.layout.rebind(alias)?;
            Ok((Source::derived(inner.query, alias), row))
        }
    }
}
