//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - `$n` positional parameters
//! - RETURNING clause
//! - EXTRACT for date parts

use super::helpers;
use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
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
