//! Plan compiler - turns a [`QueryPlan`](crate::plan::QueryPlan) into SQL.
//!
//! ```text
//! QueryPlan ─► reducer ─► SelectTree ─► assembler ─► Query ─► tokens ─► SQL
//!                                          │
//!                              visitors + navigation
//!                              (FragmentBuilder: params,
//!                               aliases, pending joins)
//! ```
//!
//! The reducer is pure: it folds plan operations into a [`SelectTree`] whose
//! lambdas are already normalized onto the tree's source variables. All
//! dialect, alias and parameter state lives in the [`FragmentBuilder`]
//! threaded through the assembler and the clause visitors.

pub mod alias;
pub mod assembler;
pub mod builder;
pub mod command;
pub mod navigation;
pub mod reducer;
pub mod shape;
pub mod visitor;

pub use alias::{AliasKey, AliasResolver};
pub use assembler::{assemble, Assembled};
pub use builder::{FragmentBuilder, Mark, NavJoin, Parameter, Scope};
pub use command::{compile_command, CommandKind, CompiledParts};
pub use reducer::{reduce, Reduced, SelectTree, TreeSource};
pub use shape::{ColumnDescriptor, ColumnKind, NavigationDescriptor, ResultShape};

use crate::plan::Node;

/// Errors raised while compiling a plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Malformed operation sequence.
    #[error("invalid plan: {0}")]
    Plan(String),

    #[error("unsupported expression in {clause}: {node}")]
    UnsupportedExpression { clause: &'static str, node: String },

    /// Two bindings resolved to the same alias. Never expected.
    #[error("alias '{alias}' is bound to {existing}, cannot bind it to {requested}")]
    AliasCollision {
        alias: String,
        existing: String,
        requested: String,
    },

    #[error("entity '{0}' is not mapped to a table")]
    UnknownEntity(String),

    #[error("'{entity}' has no member '{member}'")]
    UnknownMember { entity: String, member: String },
}

impl CompileError {
    pub(crate) fn plan(message: impl Into<String>) -> Self {
        CompileError::Plan(message.into())
    }

    pub(crate) fn unsupported(clause: &'static str, node: &Node) -> Self {
        CompileError::UnsupportedExpression {
            clause,
            node: node.to_string(),
        }
    }

    /// Whether the error is a caller mistake in the plan itself.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            CompileError::Plan(_)
                | CompileError::UnknownEntity(_)
                | CompileError::UnknownMember { .. }
        )
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
