//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - `||` is logical OR by default (use CONCAT())
//! - `?` positional parameters
//! - LIMIT is mandatory when OFFSET is used
//! - No RETURNING clause (use LAST_INSERT_ID())
//! - YEAR()/MONTH()/... date-part functions

use super::helpers;
use super::{IdentityCapture, SqlDialect};
use crate::sql::expr::DatePart;
use crate::sql::token::TokenStream;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_date_literal(&self, date: &str) -> String {
        helpers::quote_string_backslash(date)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        helpers::quote_string_backslash(ts)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_mysql(limit, offset)
    }

    fn supports_concat_operator(&self) -> bool {
        // MySQL || is OR by default, use CONCAT() instead
        false
    }

    fn emit_date_part(&self, part: DatePart, expr: TokenStream) -> TokenStream {
        helpers::emit_date_part_function(part, expr)
    }

    fn supports_returning(&self) -> bool {
        // MySQL has no RETURNING, use LAST_INSERT_ID()
        false
    }

    fn identity_capture(&self) -> IdentityCapture {
        IdentityCapture::TrailingSelect("SELECT LAST_INSERT_ID()")
    }

    fn subquery_can_read_target(&self) -> bool {
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_mysql(name)
    }
}
