//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible for everything the compiler emits:
//! - ANSI identifier quoting (`"`)
//! - Native boolean literals
//! - `$n` positional parameters
//! - RETURNING clause

use super::helpers;
use super::SqlDialect;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn parameter_placeholder(&self, ordinal: usize) -> String {
        helpers::placeholder_dollar(ordinal)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_postgres(name)
    }
}
