//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE)
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, IdentityCapture, SqlDialect};
pub use expr::{
    always, coalesce, col, count, func, lit_bool, lit_int, lit_null, lit_str, table_col,
    BinaryOperator, DatePart, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SetOperation, SortDir, Source,
    TableRef,
};
pub use token::{RenderedSql, Token, TokenStream};

pub use dml::{Delete, Insert, Update};
