//! Aggregates: methods on a grouping and terminal scalar operations.

use super::{
    as_predicate, as_value, expect_scalar, lambda_arg, scalar_of, ClauseVisitor, Env, Fragment,
    GroupBinding, Scalar,
};
use crate::compiler::builder::FragmentBuilder;
use crate::compiler::{CompileError, CompileResult};
use crate::metadata::DataType;
use crate::plan::{AggregateKind, Lambda, Method, Node};
use crate::sql::{count, func, lit_int, Expr, ExprExt};

/// Renders terminal aggregates (`Count`, `Any`, `Sum`, ...) over the rows
/// of a query.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateVisitor;

impl AggregateVisitor {
    pub fn new() -> Self {
        Self
    }

    /// The single output expression of a terminal aggregate. `selector` is
    /// already normalized onto the source row.
    pub fn terminal(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        kind: AggregateKind,
        selector: Option<&Node>,
    ) -> CompileResult<Scalar> {
        match (kind, selector) {
            (AggregateKind::Count, _) => Ok(Scalar::new(star(), Some(DataType::Int))),
            (AggregateKind::Any, _) => Ok(Scalar::new(
                as_value(Scalar::new(count(lit_int(1)).gt(lit_int(0)), None)),
                Some(DataType::Bool),
            )),
            (_, Some(selector)) => {
                let value = scalar_of(self, cx, env, selector)?;
                Ok(apply(kind, value))
            }
            (_, None) => Err(CompileError::plan(format!(
                "{} needs a selector",
                kind.function_name()
            ))),
        }
    }
}

impl ClauseVisitor for AggregateVisitor {
    fn clause(&self) -> &'static str {
        "aggregate"
    }
}

fn star() -> Expr {
    count(Expr::Star { table: None })
}

fn apply(kind: AggregateKind, value: Scalar) -> Scalar {
    let data_type = match kind {
        AggregateKind::Avg => Some(DataType::Float),
        AggregateKind::Count | AggregateKind::Any => Some(DataType::Int),
        _ => value.data_type,
    };
    Scalar::new(func(kind.function_name(), vec![as_value(value)]), data_type)
}

/// `SUM(CASE WHEN p THEN 1 ELSE 0 END)`: rows of the group matching `p`.
fn matching(predicate: Expr) -> Expr {
    func(
        "SUM",
        vec![Expr::Case {
            operand: None,
            when_clauses: vec![(predicate, lit_int(1))],
            else_clause: Some(Box::new(lit_int(0))),
        }],
    )
}

/// Visit a lambda over one element of the group.
fn over_element<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    group: &GroupBinding,
    lambda: &Lambda,
    node: &Node,
) -> CompileResult<Scalar> {
    let element = v.visit(cx, env, &group.element)?;
    let scope = env.bind(lambda.param().unwrap_or_default(), element);
    let fragment = v.visit(cx, &scope, &lambda.body)?;
    expect_scalar(fragment, v.clause(), node)
}

/// `g.Count()`, `g.Count(p)`, `g.Any(..)`, `g.All(p)`, `g.Sum(sel)`, ...
pub fn group_method<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    group: &GroupBinding,
    method: &Method,
    args: &[Node],
    node: &Node,
) -> CompileResult<Fragment> {
    let clause = v.clause();
    let lambda = lambda_arg(args, clause, node)?;
    let int = Some(DataType::Int);
    let boolean = Some(DataType::Bool);

    let scalar = match (method, lambda) {
        (Method::Count, None) => Scalar::new(star(), int),
        (Method::Count, Some(l)) => {
            let p = as_predicate(over_element(v, cx, env, group, l, node)?);
            Scalar::new(matching(p), int)
        }
        (Method::Any, None) => Scalar::new(star().gt(lit_int(0)), boolean),
        (Method::Any, Some(l)) => {
            let p = as_predicate(over_element(v, cx, env, group, l, node)?);
            Scalar::new(matching(p).gt(lit_int(0)), boolean)
        }
        (Method::All, Some(l)) => {
            let p = as_predicate(over_element(v, cx, env, group, l, node)?);
            Scalar::new(matching(p.not()).eq(lit_int(0)), boolean)
        }
        (Method::Sum | Method::Min | Method::Max | Method::Average, selector) => {
            let value = match selector {
                Some(l) => over_element(v, cx, env, group, l, node)?,
                // aggregate the element itself, which must be a scalar
                None => {
                    let element = v.visit(cx, env, &group.element)?;
                    expect_scalar(element, clause, node)?
                }
            };
            let kind = match method {
                Method::Sum => AggregateKind::Sum,
                Method::Min => AggregateKind::Min,
                Method::Max => AggregateKind::Max,
                _ => AggregateKind::Avg,
            };
            apply(kind, value)
        }
        _ => return Err(CompileError::unsupported(clause, node)),
    };
    Ok(Fragment::Scalar(scalar))
}
