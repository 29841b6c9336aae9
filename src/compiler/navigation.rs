//! Navigation joins and correlated collection subqueries.
//!
//! A single-valued navigation (`o.Customer`) becomes a LEFT JOIN registered
//! with the [`FragmentBuilder`] under its path, so every reference to the
//! same path shares one alias. A collection navigation used through a method
//! (`o.Lines.Any(..)`, `o.Lines.Count()`) becomes a correlated subquery
//! instead and never multiplies the outer rows.

use super::alias::AliasKey;
use super::builder::{FragmentBuilder, Scope};
use super::visitor::{
    as_predicate, as_value, expect_scalar, lambda_arg, ClauseVisitor, CollectionBinding, Env,
    Fragment, RowBinding, Scalar,
};
use super::{CompileError, CompileResult};
use crate::metadata::{DataType, NavigationMember};
use crate::plan::{Method, Node};
use crate::sql::{count, func, lit_int, table_col, Expr, ExprExt, Query, SelectExpr, TableRef};

/// Resolve `row.member`: a column, a joined row or a collection.
pub fn row_member(cx: &mut FragmentBuilder<'_>, row: &RowBinding, member: &str) -> CompileResult<Fragment> {
    if row.entity.field(member).is_some() {
        return row.field(member).map(Fragment::Scalar);
    }
    match row.entity.navigation(member) {
        Some(nav) if nav.is_collection() => Ok(Fragment::Collection(CollectionBinding {
            parent: row.clone(),
            navigation: nav.clone(),
        })),
        Some(nav) => join_navigation(cx, row, nav).map(Fragment::Row),
        None => Err(CompileError::UnknownMember {
            entity: row.entity.name().to_string(),
            member: member.to_string(),
        }),
    }
}

/// LEFT JOIN the target of `nav` to `parent`, reusing an existing join for
/// the same path.
pub fn join_navigation(
    cx: &mut FragmentBuilder<'_>,
    parent: &RowBinding,
    nav: &NavigationMember,
) -> CompileResult<RowBinding> {
    let fk = nav.foreign_key.as_ref().ok_or_else(|| {
        CompileError::plan(format!(
            "navigation '{}.{}' declares no join columns",
            parent.entity.name(),
            nav.member
        ))
    })?;
    if parent.alias.is_none() {
        return Err(CompileError::plan(format!(
            "navigation '{}.{}' needs an aliased source",
            parent.entity.name(),
            nav.member
        )));
    }

    let target = nav.target.resolve();
    let table = target
        .table()
        .ok_or_else(|| CompileError::UnknownEntity(target.name().to_string()))?
        .to_string();
    let parent_cols = fk
        .local
        .iter()
        .map(|m| parent.member_expr(m))
        .collect::<CompileResult<Vec<_>>>()?;
    let target_cols = fk
        .referenced
        .iter()
        .map(|m| {
            target
                .column_of(m)
                .map(str::to_string)
                .ok_or_else(|| CompileError::UnknownMember {
                    entity: target.name().to_string(),
                    member: m.clone(),
                })
        })
        .collect::<CompileResult<Vec<_>>>()?;

    let path = format!("{}.{}", parent.path, nav.member);
    let schema = target.schema().map(str::to_string);
    let alias = cx.navigation_join(&path, |alias| {
        let on = join_condition(&parent_cols, alias, &target_cols)?;
        let table = TableRef::new(&table)
            .with_schema(schema.as_deref())
            .with_alias(alias);
        Ok((table, on))
    })?;

    Ok(RowBinding {
        alias: Some(alias),
        entity: target,
        path,
        columns: None,
        optional: true,
    })
}

/// `parent[i] = alias.child[i]` for every column pair, AND-ed.
fn join_condition(parent_cols: &[Expr], alias: &str, child_cols: &[String]) -> CompileResult<Expr> {
    let mut terms = parent_cols
        .iter()
        .zip(child_cols)
        .map(|(p, c)| p.clone().eq(table_col(alias, c)));
    let first = terms
        .next()
        .ok_or_else(|| CompileError::plan("navigation declares an empty key"))?;
    Ok(terms.fold(first, |acc, t| acc.and(t)))
}

/// `Any`, `All`, `Count`, `Sum`, `Min`, `Max` and `Average` over a
/// collection navigation, as a correlated subquery.
pub fn collection_method<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    collection: &CollectionBinding,
    method: &Method,
    args: &[Node],
    node: &Node,
) -> CompileResult<Fragment> {
    let clause = v.clause();
    let lambda = lambda_arg(args, clause, node)?;
    let needs_lambda = matches!(
        method,
        Method::All | Method::Sum | Method::Min | Method::Max | Method::Average
    );
    let allowed = matches!(
        method,
        Method::Any
            | Method::All
            | Method::Count
            | Method::Sum
            | Method::Min
            | Method::Max
            | Method::Average
    );
    if !allowed || (needs_lambda && lambda.is_none()) {
        return Err(CompileError::unsupported(clause, node));
    }

    let nav = &collection.navigation;
    let parent = &collection.parent;
    let fk = nav.foreign_key.as_ref().ok_or_else(|| {
        CompileError::plan(format!(
            "navigation '{}.{}' declares no join columns",
            parent.entity.name(),
            nav.member
        ))
    })?;
    let child = nav.target.resolve();
    let table = child
        .table()
        .ok_or_else(|| CompileError::UnknownEntity(child.name().to_string()))?
        .to_string();
    let parent_cols = fk
        .local
        .iter()
        .map(|m| parent.member_expr(m))
        .collect::<CompileResult<Vec<_>>>()?;

    cx.scoped(Scope::Correlated, |cx| {
        let alias = cx.resolve_alias(AliasKey::Primary)?;
        let row = RowBinding::table(&alias, child.clone());
        let child_cols = fk
            .referenced
            .iter()
            .map(|m| {
                child
                    .column_of(m)
                    .map(str::to_string)
                    .ok_or_else(|| CompileError::UnknownMember {
                        entity: child.name().to_string(),
                        member: m.clone(),
                    })
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let mut filter = join_condition(&parent_cols, &alias, &child_cols)?;

        let body = match lambda {
            Some(l) => {
                let param = l.param().unwrap_or_default();
                let inner_env = env.bind(param, Fragment::Row(row.clone()));
                Some(expect_scalar(v.visit(cx, &inner_env, &l.body)?, clause, node)?)
            }
            None => None,
        };

        let (select, data_type) = match (method, body) {
            (Method::Any, body) | (Method::Count, body) => {
                if let Some(pred) = body {
                    filter = filter.and(as_predicate(pred));
                }
                if *method == Method::Any {
                    (lit_int(1), Some(DataType::Bool))
                } else {
                    (count(Expr::Star { table: None }), Some(DataType::Int))
                }
            }
            (Method::All, Some(pred)) => {
                filter = filter.and(as_predicate(pred).not());
                (lit_int(1), Some(DataType::Bool))
            }
            (Method::Average, Some(sel)) => (func("AVG", vec![as_value(sel)]), Some(DataType::Float)),
            (_, Some(sel)) => {
                let name = match method {
                    Method::Sum => "SUM",
                    Method::Min => "MIN",
                    _ => "MAX",
                };
                let data_type = sel.data_type;
                (func(name, vec![as_value(sel)]), data_type)
            }
            (_, None) => return Err(CompileError::unsupported(clause, node)),
        };

        let mut query = Query::new()
            .select(vec![SelectExpr::new(select)])
            .from(
                TableRef::new(&table)
                    .with_schema(child.schema())
                    .with_alias(&alias),
            );
        for join in cx.take_navigation_joins() {
            query = query.left_join(join.table, join.on);
        }
        query = query.filter(filter);

        let expr = match method {
            Method::Any => Expr::Exists {
                subquery: Box::new(query),
                negated: false,
            },
            Method::All => Expr::Exists {
                subquery: Box::new(query),
                negated: true,
            },
            _ => Expr::Subquery(Box::new(query)),
        };
        Ok(Fragment::Scalar(Scalar::new(expr, data_type)))
    })
}
