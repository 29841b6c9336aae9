//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL has significant differences from ANSI:
//! - Square bracket identifier quoting (`[name]`)
//! - No native boolean in SELECT (1/0 bit values)
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - TOP for simple limiting
//! - N'...' prefix for Unicode strings
//! - `@p0` named parameters
//! - OUTPUT INSERTED instead of RETURNING
//! - DATEPART for date-part extraction
//! - String concatenation with `+`

use super::helpers;
use super::{IdentityCapture, SqlDialect};
use crate::sql::expr::DatePart;
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // N'...' keeps non-ASCII text intact
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_date_literal(&self, date: &str) -> String {
        // T-SQL doesn't support DATE 'YYYY-MM-DD' syntax
        helpers::quote_string_single(date)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        helpers::quote_string_single(ts)
    }

    fn parameter_placeholder(&self, ordinal: usize) -> String {
        helpers::placeholder_named_at(ordinal)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn uses_top_for_limit(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn emit_date_part(&self, part: DatePart, expr: TokenStream) -> TokenStream {
        helpers::emit_date_part_tsql(part, expr)
    }

    fn supports_returning(&self) -> bool {
        // T-SQL uses OUTPUT instead of RETURNING
        false
    }

    fn identity_capture(&self) -> IdentityCapture {
        IdentityCapture::Output
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_tsql(name)
    }
}
