//! DML (Data Manipulation Language) support.
//!
//! This module provides types and builders for generating DML statements
//! (INSERT, UPDATE, DELETE) across different SQL dialects.
//!
//! # Examples
//!
//! ```ignore
//! use quarry::sql::dml::{Insert, Update, Delete};
//! use quarry::sql::expr::{col, lit_str, lit_int, ExprExt};
//!
//! // INSERT
//! let insert = Insert::into("users")
//!     .columns(["name", "email"])
//!     .values([lit_str("Alice"), lit_str("alice@example.com")]);
//!
//! // UPDATE
//! let update = Update::table("users")
//!     .set("status", lit_str("active"))
//!     .filter(col("id").eq(lit_int(1)));
//!
//! // DELETE
//! let delete = Delete::from("users")
//!     .filter(col("status").eq(lit_str("inactive")));
//! ```

use super::dialect::{IdentityCapture, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

fn table_token(schema: &Option<String>, table: &str) -> Token {
    Token::QualifiedIdent {
        schema: schema.clone(),
        name: table.to_string(),
    }
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
    /// Generated column to read back after the insert.
    pub identity: Option<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            identity: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(Into::into);
        self
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add a row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values
            .push(vals.into_iter().map(|v| v.into()).collect());
        self
    }

    /// Read back a generated column using the dialect's identity capture.
    pub fn capture_identity(mut self, column: impl Into<String>) -> Self {
        self.identity = Some(column.into());
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();
        let capture = self
            .identity
            .as_ref()
            .map(|col| (col, dialect.identity_capture()));

        // INSERT INTO
        ts.push(Token::Insert).space().push(Token::Into).space();
        ts.push(table_token(&self.schema, &self.table));

        // Columns
        if !self.columns.is_empty() {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();
        }

        // T-SQL: OUTPUT goes before VALUES
        if let Some((col, IdentityCapture::Output)) = capture {
            ts.newline()
                .push(Token::Output)
                .space()
                .push(Token::Inserted)
                .push(Token::Dot)
                .push(Token::Ident(col.clone()));
        }

        // VALUES
        ts.newline().push(Token::Values);
        for (row_idx, row) in self.values.iter().enumerate() {
            if row_idx > 0 {
                ts.comma().newline().indent(1);
            } else {
                ts.space();
            }
            ts.lparen();
            for (i, val) in row.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&val.to_tokens_for_dialect(dialect));
            }
            ts.rparen();
        }

        match capture {
            Some((col, IdentityCapture::Returning)) => {
                ts.newline()
                    .push(Token::Returning)
                    .space()
                    .push(Token::Ident(col.clone()));
            }
            Some((_, IdentityCapture::TrailingSelect(select))) => {
                ts.push(Token::Semicolon)
                    .newline()
                    .push(Token::Raw(select.to_string()));
            }
            _ => {}
        }

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub schema: Option<String>,
    pub table: String,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            set: Vec::new(),
            filter: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(Into::into);
        self
    }

    /// Set a column to a value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.set.push((column.into(), value.into()));
        self
    }

    /// Add WHERE clause (ANDed with an existing one).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update).space();
        ts.push(table_token(&self.schema, &self.table));

        // SET clause
        ts.newline().push(Token::Set).space();
        for (i, (col, expr)) in self.set.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(col.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&expr.to_tokens_for_dialect(dialect));
        }

        if let Some(ref filter) = self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub schema: Option<String>,
    pub table: String,
    pub filter: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            filter: None,
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(Into::into);
        self
    }

    /// Add WHERE clause (ANDed with an existing one).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete).space().push(Token::From).space();
        ts.push(table_token(&self.schema, &self.table));

        if let Some(ref filter) = self.filter {
            ts.newline()
                .push(Token::Where)
                .space()
                .append(&filter.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// ============================================================================
// Tests
// ============================================================================
