//! WHERE and HAVING predicates.

use super::{predicate_of, ClauseVisitor, Env};
use crate::compiler::builder::FragmentBuilder;
use crate::compiler::CompileResult;
use crate::plan::Node;
use crate::sql::{Expr, ExprExt};

/// Renders predicates. Used for WHERE, HAVING and include filters.
#[derive(Debug, Clone, Copy)]
pub struct WhereVisitor {
    clause: &'static str,
}

impl WhereVisitor {
    pub fn new(clause: &'static str) -> Self {
        Self { clause }
    }

    /// One predicate.
    pub fn predicate(&mut self, cx: &mut FragmentBuilder<'_>, env: &Env, node: &Node) -> CompileResult<Expr> {
        predicate_of(self, cx, env, node)
    }

    /// AND every predicate together, in order. `None` when there are none.
    pub fn conjunction(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        nodes: &[Node],
    ) -> CompileResult<Option<Expr>> {
        let mut combined: Option<Expr> = None;
        for node in nodes {
            let predicate = self.predicate(cx, env, node)?;
            combined = Some(match combined {
                Some(acc) => acc.and(predicate),
                None => predicate,
            });
        }
        Ok(combined)
    }
}

impl ClauseVisitor for WhereVisitor {
    fn clause(&self) -> &'static str {
        self.clause
    }
}
