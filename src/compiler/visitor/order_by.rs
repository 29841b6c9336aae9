//! ORDER BY and GROUP BY keys.

use super::{as_value, ClauseVisitor, Env, Fragment};
use crate::compiler::builder::FragmentBuilder;
use crate::compiler::{CompileError, CompileResult};
use crate::plan::{Direction, Node};
use crate::sql::{Expr, OrderByExpr};

/// Renders sort and grouping keys. Composite keys (records) flatten into
/// one expression per member.
#[derive(Debug, Clone, Copy)]
pub struct OrderByVisitor {
    grouping: bool,
}

impl OrderByVisitor {
    pub fn order_by() -> Self {
        Self { grouping: false }
    }

    pub fn group_by() -> Self {
        Self { grouping: true }
    }

    /// Expressions of one key lambda body.
    pub fn keys(&mut self, cx: &mut FragmentBuilder<'_>, env: &Env, node: &Node) -> CompileResult<Vec<Expr>> {
        let fragment = self.visit(cx, env, node)?;
        let mut out = Vec::new();
        self.flatten(fragment, node, &mut out)?;
        Ok(out)
    }

    fn flatten(&self, fragment: Fragment, node: &Node, out: &mut Vec<Expr>) -> CompileResult<()> {
        match fragment {
            Fragment::Scalar(s) => {
                // a literal sort key would be read as a column ordinal
                if matches!(s.expr, Expr::Literal(_) | Expr::Param(_)) {
                    log::debug!("dropping constant {} key {}", self.clause(), node);
                } else {
                    out.push(as_value(s));
                }
            }
            Fragment::Record(fields) => {
                for (_, field) in fields {
                    self.flatten(field, node, out)?;
                }
            }
            Fragment::Row(row) if self.grouping => {
                for field in row.entity.fields() {
                    out.push(row.member_expr(&field.member)?);
                }
            }
            Fragment::Row(row) => out.extend(row.key_exprs()?),
            _ => return Err(CompileError::unsupported(self.clause(), node)),
        }
        Ok(())
    }

    /// ORDER BY items in key order.
    pub fn order(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        keys: &[(Node, Direction)],
    ) -> CompileResult<Vec<OrderByExpr>> {
        let mut items = Vec::new();
        for (key, direction) in keys {
            for expr in self.keys(cx, env, key)? {
                items.push(match direction {
                    Direction::Ascending => OrderByExpr::asc(expr),
                    Direction::Descending => OrderByExpr::desc(expr),
                });
            }
        }
        Ok(items)
    }
}

impl ClauseVisitor for OrderByVisitor {
    fn clause(&self) -> &'static str {
        if self.grouping {
            "GROUP BY"
        } else {
            "ORDER BY"
        }
    }
}
