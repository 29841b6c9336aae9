//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::expr::DatePart;
use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL (SQL Server, Azure SQL)
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
/// Used by: T-SQL for non-ASCII strings
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

/// Quote string with backslash escaping in addition to `''` (MySQL default
/// `sql_mode` treats backslash as an escape character).
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres, DuckDB
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: T-SQL, MySQL
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// `$1`, `$2`, ... (1-based).
/// Used by: Postgres, DuckDB
pub fn placeholder_dollar(ordinal: usize) -> String {
    format!("${}", ordinal + 1)
}

/// `@p0`, `@p1`, ... (0-based).
/// Used by: T-SQL
pub fn placeholder_named_at(ordinal: usize) -> String {
    format!("@p{}", ordinal)
}

// =============================================================================
// Pagination
// =============================================================================

/// A LIMIT, OFFSET or TOP count. Counts are checked against `i64::MAX` when
/// the plan is reduced; anything larger saturates.
pub fn row_count(n: u64) -> Token {
    Token::LitInt(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres, DuckDB, MySQL
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(row_count(lim));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(row_count(off));
    }

    ts
}

/// Emit LIMIT ... OFFSET ..., with MySQL's huge-limit idiom when only an
/// offset is present (MySQL rejects OFFSET without LIMIT).
pub fn emit_limit_offset_mysql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    match (limit, offset) {
        (None, Some(_)) => emit_limit_offset_standard(Some(u64::MAX >> 1), offset),
        _ => emit_limit_offset_standard(limit, offset),
    }
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Used by: T-SQL (SQL Server, Azure SQL)
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(row_count(off))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(row_count(lim))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Date Parts
// =============================================================================

/// `EXTRACT(YEAR FROM x)`.
/// Used by: Postgres, DuckDB
pub fn emit_date_part_extract(part: DatePart, expr: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("EXTRACT".into()))
        .lparen()
        .push(Token::Raw(part.keyword().into()))
        .space()
        .push(Token::From)
        .space()
        .append(&expr)
        .rparen();
    ts
}

/// `DATEPART(year, x)`.
/// Used by: T-SQL
pub fn emit_date_part_tsql(part: DatePart, expr: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("DATEPART".into()))
        .lparen()
        .push(Token::Raw(part.keyword().to_lowercase()))
        .comma()
        .space()
        .append(&expr)
        .rparen();
    ts
}

/// `YEAR(x)`, `MONTH(x)`, ...
/// Used by: MySQL
pub fn emit_date_part_function(part: DatePart, expr: TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName(part.keyword().into()))
        .lparen()
        .append(&expr)
        .rparen();
    ts
}

// =============================================================================
// Function Remapping
// =============================================================================

/// Remap functions for T-SQL dialect.
pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "LENGTH" => Some("LEN"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" => Some("GETDATE"),
        "IFNULL" | "NVL" => Some("ISNULL"),
        _ => None,
    }
}

/// Remap functions for MySQL dialect.
pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        // LENGTH counts bytes in MySQL
        "LENGTH" => Some("CHAR_LENGTH"),
        "SUBSTR" => Some("SUBSTRING"),
        "NVL" | "ISNULL" => Some("IFNULL"),
        _ => None,
    }
}

/// Remap functions for Postgres and DuckDB.
pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" | "ISNULL" => Some("COALESCE"),
        _ => None,
    }
}
