//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB), `` ` `` (MySQL), `[]` (T-SQL)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH vs TOP
//! - Boolean literals: true/false vs 1/0
//! - String concatenation: `||` vs `+` vs CONCAT()
//! - Parameter placeholders: `$1` vs `@p0` vs `?`
//! - Date-part extraction and identity capture after INSERT
//!
//! The compiler only ever talks to `&dyn SqlDialect`, so a backend outside
//! this crate plugs in by implementing the trait.
//!
//! # Usage
//!
//! ```ignore
//! use quarry::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```

mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod tsql;

pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use tsql::TSql;

use std::str::FromStr;

use super::expr::DatePart;
use super::token::TokenStream;

/// How a dialect reads back a generated identity value after INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCapture {
    /// `INSERT ... RETURNING col`
    Returning,
    /// `INSERT ... OUTPUT INSERTED.col VALUES ...`
    Output,
    /// A trailing statement, e.g. `; SELECT LAST_INSERT_ID()`.
    TrailingSelect(&'static str),
    /// Not supported.
    Unsupported,
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - ANSI/PostgreSQL/DuckDB: `"identifier"`
    /// - MySQL: `` `identifier` ``
    /// - T-SQL: `[identifier]`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    /// Override for Unicode prefix (T-SQL N'...').
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    ///
    /// - PostgreSQL/DuckDB: `true`/`false`
    /// - MySQL/T-SQL: `1`/`0`
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// Format a date literal.
    ///
    /// - ANSI/PostgreSQL/DuckDB: `DATE 'YYYY-MM-DD'`
    /// - T-SQL/MySQL: `'YYYY-MM-DD'` (no DATE keyword)
    fn format_date_literal(&self, date: &str) -> String {
        format!("DATE {}", helpers::quote_string_single(date))
    }

    /// Format a timestamp literal.
    fn format_timestamp_literal(&self, ts: &str) -> String {
        format!("TIMESTAMP {}", helpers::quote_string_single(ts))
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Placeholder for the parameter at `ordinal` (0-based, in text order).
    ///
    /// - ANSI/MySQL: `?`
    /// - PostgreSQL/DuckDB: `$1`, `$2`, ...
    /// - T-SQL: `@p0`, `@p1`, ...
    fn parameter_placeholder(&self, ordinal: usize) -> String {
        let _ = ordinal;
        "?".into()
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    ///
    /// - ANSI/PostgreSQL/DuckDB/MySQL: `LIMIT n OFFSET m` (default)
    /// - T-SQL: `OFFSET m ROWS FETCH NEXT n ROWS ONLY` (override)
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    ///
    /// T-SQL requires ORDER BY when using OFFSET FETCH.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    /// Whether a bare limit (no offset) renders as `SELECT TOP n`.
    fn uses_top_for_limit(&self) -> bool {
        false
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// String concatenation operator or function.
    ///
    /// - ANSI/PostgreSQL/DuckDB: `||`
    /// - T-SQL: `+`
    /// - MySQL: `CONCAT()` (|| is OR by default)
    fn concat_operator(&self) -> &'static str {
        "||"
    }

    /// Whether this dialect supports the `||` concat operator.
    ///
    /// MySQL uses `||` as logical OR by default.
    fn supports_concat_operator(&self) -> bool {
        true
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// Extract a date part from an expression.
    ///
    /// - ANSI/PostgreSQL/DuckDB: `EXTRACT(YEAR FROM x)`
    /// - T-SQL: `DATEPART(year, x)`
    /// - MySQL: `YEAR(x)`
    fn emit_date_part(&self, part: DatePart, expr: TokenStream) -> TokenStream {
        helpers::emit_date_part_extract(part, expr)
    }

    // =========================================================================
    // INSERT identity capture
    // =========================================================================

    /// Whether this dialect supports RETURNING clause.
    fn supports_returning(&self) -> bool {
        true
    }

    /// Whether an UPDATE or DELETE may filter through a subquery that reads
    /// its own target table. MySQL only allows it through a derived table.
    fn subquery_can_read_target(&self) -> bool {
        true
    }

    /// How a generated identity value is read back after INSERT.
    fn identity_capture(&self) -> IdentityCapture {
        if self.supports_returning() {
            IdentityCapture::Returning
        } else {
            IdentityCapture::Unsupported
        }
    }

    // =========================================================================
    // Function Remapping
    // =========================================================================

    /// Remap a function name for this dialect.
    ///
    /// Different databases use different names for the same functions:
    /// - `LENGTH` → `LEN` (T-SQL)
    /// - `SUBSTRING` → `SUBSTR` (DuckDB accepts both)
    /// - `COALESCE` stays portable
    ///
    /// Returns `Some(new_name)` if the function should be remapped, `None` to keep original.
    /// The input is matched case-insensitively.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        // Default: no remapping
        let _ = name;
        None
    }
}

/// Built-in SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    DuckDb,
    TSql,
    MySql,
    Postgres,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn format_date_literal(&self, date: &str) -> String {
        self.dialect().format_date_literal(date)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        self.dialect().format_timestamp_literal(ts)
    }

    fn parameter_placeholder(&self, ordinal: usize) -> String {
        self.dialect().parameter_placeholder(ordinal)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn uses_top_for_limit(&self) -> bool {
        self.dialect().uses_top_for_limit()
    }

    fn concat_operator(&self) -> &'static str {
        self.dialect().concat_operator()
    }

    fn supports_concat_operator(&self) -> bool {
        self.dialect().supports_concat_operator()
    }

    fn emit_date_part(&self, part: DatePart, expr: TokenStream) -> TokenStream {
        self.dialect().emit_date_part(part, expr)
    }

    fn supports_returning(&self) -> bool {
        self.dialect().supports_returning()
    }

    fn identity_capture(&self) -> IdentityCapture {
        self.dialect().identity_capture()
    }

    fn subquery_can_read_target(&self) -> bool {
        self.dialect().subquery_can_read_target()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::TSql),
            "mysql" => Ok(Dialect::MySql),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}
