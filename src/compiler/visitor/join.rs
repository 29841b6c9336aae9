//! Explicit join conditions.

use super::{as_value, ClauseVisitor, Env, Fragment};
use crate::compiler::builder::FragmentBuilder;
use crate::compiler::{CompileError, CompileResult};
use crate::plan::Node;
use crate::sql::{Expr, ExprExt};

/// Pairs an outer key with an inner key. Record keys compare member by
/// member in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinVisitor;

impl JoinVisitor {
    pub fn new() -> Self {
        Self
    }

    /// The ON condition for `outer = inner`.
    pub fn on_clause(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        outer: &Node,
        inner: &Node,
    ) -> CompileResult<Expr> {
        let outer_keys = self.key_columns(cx, env, outer)?;
        let inner_keys = self.key_columns(cx, env, inner)?;
        if outer_keys.len() != inner_keys.len() || outer_keys.is_empty() {
            return Err(CompileError::plan(format!(
                "join keys {} and {} have different arity",
                outer, inner
            )));
        }

        let mut terms = outer_keys
            .into_iter()
            .zip(inner_keys)
            .map(|(o, i)| o.eq(i));
        let first = terms
            .next()
            .ok_or_else(|| CompileError::unsupported(self.clause(), outer))?;
        Ok(terms.fold(first, |acc, t| acc.and(t)))
    }

    fn key_columns(&mut self, cx: &mut FragmentBuilder<'_>, env: &Env, node: &Node) -> CompileResult<Vec<Expr>> {
        let fragment = self.visit(cx, env, node)?;
        let mut out = Vec::new();
        self.flatten(fragment, node, &mut out)?;
        Ok(out)
    }

    fn flatten(&self, fragment: Fragment, node: &Node, out: &mut Vec<Expr>) -> CompileResult<()> {
        match fragment {
            Fragment::Scalar(s) => out.push(as_value(s)),
            Fragment::Record(fields) => {
                for (_, field) in fields {
                    self.flatten(field, node, out)?;
                }
            }
            Fragment::Row(row) => out.extend(row.key_exprs()?),
            _ => return Err(CompileError::unsupported(self.clause(), node)),
        }
        Ok(())
    }
}

impl ClauseVisitor for JoinVisitor {
    fn clause(&self) -> &'static str {
        "JOIN"
    }
}
