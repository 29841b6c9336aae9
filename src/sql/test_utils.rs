//! Parse-back checks for generated SQL.

use sqlparser::dialect::{DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use super::dialect::Dialect;

fn parser_dialect(dialect: Dialect) -> Box<dyn sqlparser::dialect::Dialect> {
    match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
    }
}

/// Number of statements in `sql` as parsed for `dialect`.
pub fn parse_statements(sql: &str, dialect: Dialect) -> Result<usize, String> {
    Parser::parse_sql(&*parser_dialect(dialect), sql)
        .map(|statements| statements.len())
        .map_err(|e| format!("{:?} rejects generated SQL: {}\n{}", dialect, e, sql))
}

/// Panic unless `sql` parses for `dialect`.
#[track_caller]
pub fn assert_parses(sql: &str, dialect: Dialect) {
    if let Err(message) = parse_statements(sql, dialect) {
        panic!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_batch_is_two_statements() {
        let sql = "INSERT INTO `Tickets` (`Title`) VALUES (?); SELECT LAST_INSERT_ID()";
        assert_eq!(parse_statements(sql, Dialect::MySql), Ok(2));
    }

    #[test]
    fn test_rejects_malformed_sql() {
        assert!(parse_statements("SELEC 1 FORM t", Dialect::Postgres).is_err());
    }
}
