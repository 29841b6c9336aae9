//! # Quarry
//!
//! An object-to-relational query compiler: immutable query plans over mapped
//! entities compile to multi-dialect SQL, and result rows materialize back
//! into typed objects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        QueryPlan<T> (immutable operation sequence)       │
//! │   filter, select, order_by, group_by, join, include ..   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [reducer]
//! ┌─────────────────────────────────────────────────────────┐
//! │     SelectTree (normalized lambdas, wrap decisions)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [assembler + clause visitors]
//! ┌─────────────────────────────────────────────────────────┐
//! │   SQL AST + parameters + ResultShape (column layout)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dialect]
//! ┌─────────────────────────────────────────────────────────┐
//! │              SQL text, ordered parameters                │
//! └─────────────────────────────────────────────────────────┘
//!
//!        rows ──► [materialize] ──► T, T, T ...
//! ```
//!
//! Executing commands is left to the caller; a [`compile::CompiledCommand`]
//! carries everything an executor needs and serializes to JSON.

pub mod compile;
pub mod compiler;
pub mod config;
pub mod materialize;
pub mod metadata;
pub mod plan;
pub mod sql;

pub use compile::{compile, CompileOptions, CompiledCommand};
pub use compiler::{CompileError, CompileResult};
pub use materialize::{materialize, MaterializeError};
pub use metadata::{describe, Entity, EntityDescriptor, Value};
pub use plan::QueryPlan;

/// Everything needed to describe entities, build plans and read results.
pub mod prelude {
    pub use crate::compile::{compile, CompileOptions, CompiledCommand};
    pub use crate::compiler::{CommandKind, CompileError, ResultShape};
    pub use crate::materialize::{
        materialize, materialize_scalar, materialize_scalars, MaterializeError, ResultCursor,
        VecCursor,
    };
    pub use crate::metadata::{
        describe, downcast_child, AttachError, ConversionError, DataType, Entity,
        EntityDescriptor, FromValue, Value,
    };
    pub use crate::plan::{
        captured, cond, init, lambda, lambda2, lit, list, null, param, record, Grouping, Lambda,
        Method, Node, NodeExt, QueryPlan, Scalar,
    };
    pub use crate::sql::Dialect;
}
