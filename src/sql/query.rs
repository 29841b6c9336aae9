//! Query builder - construct SQL queries with a fluent API.

use super::dialect::{helpers, Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::token::{Token, TokenStream};

// =============================================================================
// Select Expression (column with optional alias)
// =============================================================================

/// A SELECT list item: expression with optional alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct SelectExpr {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectExpr {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

impl From<Expr> for SelectExpr {
    fn from(expr: Expr) -> Self {
        SelectExpr::new(expr)
    }
}

// =============================================================================
// Table Reference
// =============================================================================

/// A table reference with optional schema and alias.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: &str) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    pub fn with_schema(mut self, schema: Option<&str>) -> Self {
        self.schema = schema.map(Into::into);
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::QualifiedIdent {
            schema: self.schema.clone(),
            name: self.table.clone(),
        });
        if let Some(alias) = &self.alias {
            ts.space()
                .push(Token::As)
                .space()
                .push(Token::Ident(alias.clone()));
        }
        ts
    }
}

/// A FROM or JOIN source: a table, or a derived table with its alias.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(TableRef),
    Derived { query: Box<Query>, alias: String },
}

impl Source {
    pub fn derived(query: Query, alias: &str) -> Self {
        Source::Derived {
            query: Box::new(query),
            alias: alias.into(),
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        match self {
            Source::Table(table) => table.to_tokens(),
            Source::Derived { query, alias } => {
                let mut ts = TokenStream::new();
                ts.lparen()
                    .newline()
                    .append(&query.to_tokens_for_dialect(dialect))
                    .newline()
                    .rparen()
                    .space()
                    .push(Token::As)
                    .space()
                    .push(Token::Ident(alias.clone()));
                ts
            }
        }
    }
}

impl From<TableRef> for Source {
    fn from(table: TableRef) -> Self {
        Source::Table(table)
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub source: Source,
    pub on: Option<Expr>,
}

impl Join {
    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self.join_type {
            JoinType::Inner => ts.push(Token::Inner),
            JoinType::Left => ts.push(Token::Left),
            JoinType::Cross => ts.push(Token::Cross),
        };

        ts.space().push(Token::Join).space();
        ts.append(&self.source.to_tokens_for_dialect(dialect));

        if let Some(on) = &self.on {
            ts.space().push(Token::On).space();
            ts.append(&on.to_tokens_for_dialect(dialect));
        }

        ts
    }
}

// =============================================================================
// ORDER BY
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

/// An ORDER BY expression.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderByExpr {
    pub expr: Expr,
    pub dir: SortDir,
}

impl OrderByExpr {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            dir: SortDir::Desc,
        }
    }

    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = self.expr.to_tokens_for_dialect(dialect);
        if self.dir == SortDir::Desc {
            ts.space().push(Token::Desc);
        }
        ts
    }
}

// =============================================================================
// LIMIT / OFFSET
// =============================================================================

/// LIMIT and OFFSET clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitOffset {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl LimitOffset {
    /// Convert to token stream using dialect-specific pagination.
    ///
    /// Delegates to `SqlDialect::emit_limit_offset()` for the actual formatting.
    pub fn to_tokens(&self, dialect: &dyn SqlDialect) -> TokenStream {
        dialect.emit_limit_offset(self.limit, self.offset)
    }

    /// A bare limit that a `TOP`-style dialect renders in the SELECT list.
    fn top(&self, dialect: &dyn SqlDialect) -> Option<u64> {
        match (self.limit, self.offset) {
            (Some(limit), None) if dialect.uses_top_for_limit() => Some(limit),
            _ => None,
        }
    }
}

// =============================================================================
// Set Operations
// =============================================================================

/// A UNION of two queries.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "SetOperation has no effect until converted to SQL with to_sql()"]
pub struct SetOperation {
    pub left: Box<Query>,
    pub all: bool,
    pub right: Box<Query>,
}

impl SetOperation {
    /// Create a UNION operation.
    pub fn union(left: Query, right: Query) -> Self {
        Self {
            left: Box::new(left),
            all: false,
            right: Box::new(right),
        }
    }

    /// Create a UNION ALL operation.
    pub fn union_all(left: Query, right: Query) -> Self {
        Self {
            left: Box::new(left),
            all: true,
            right: Box::new(right),
        }
    }

    /// Convert to tokens for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();

        // Left query (wrapped in parens for clarity)
        if self.left.set_op.is_some() {
            // Nested set operation - emit directly
            ts.append(&self.left.to_tokens_for_dialect(dialect));
        } else {
            ts.lparen();
            ts.append(&self.left.to_tokens_for_dialect(dialect));
            ts.rparen();
        }

        ts.newline().push(Token::Union);
        if self.all {
            ts.space().push(Token::All);
        }
        ts.newline();

        ts.lparen();
        ts.append(&self.right.to_tokens_for_dialect(dialect));
        ts.rparen();

        ts
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// A SELECT query.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "Query has no effect until converted to SQL with to_sql() or to_tokens()"]
pub struct Query {
    pub select: Vec<SelectExpr>,
    pub distinct: bool,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit_offset: Option<LimitOffset>,
    /// UNION with another query. When set, every other field is ignored.
    pub set_op: Option<Box<SetOperation>>,
}

impl Query {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SELECT list.
    pub fn select(mut self, exprs: Vec<impl Into<SelectExpr>>) -> Self {
        self.select = exprs.into_iter().map(|e| e.into()).collect();
        self
    }

    /// Add DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Set the FROM source.
    pub fn from(mut self, source: impl Into<Source>) -> Self {
        self.from = Some(source.into());
        self
    }

    /// Add a JOIN.
    pub fn join(mut self, join_type: JoinType, source: impl Into<Source>, on: Option<Expr>) -> Self {
        self.joins.push(Join {
            join_type,
            source: source.into(),
            on,
        });
        self
    }

    /// Add a LEFT JOIN.
    pub fn left_join(self, source: impl Into<Source>, on: Expr) -> Self {
        self.join(JoinType::Left, source, Some(on))
    }

    /// Add a WHERE condition (ANDed with existing conditions).
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    /// Set the HAVING clause.
    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(condition);
        self
    }

    /// Set the ORDER BY clause.
    pub fn order_by(mut self, exprs: Vec<OrderByExpr>) -> Self {
        self.order_by = exprs;
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.limit_offset.get_or_insert_with(LimitOffset::default).offset = Some(offset);
        self
    }

    /// Combine with another query using UNION ALL.
    pub fn union_all(self, other: Query) -> Query {
        Query {
            set_op: Some(Box::new(SetOperation::union_all(self, other))),
            ..Default::default()
        }
    }

    /// Convert to token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        // If this query is a container for a set operation, emit that instead
        if let Some(ref set_op) = self.set_op {
            return set_op.to_tokens_for_dialect(dialect);
        }

        let mut ts = TokenStream::new();
        let top = self.limit_offset.as_ref().and_then(|lo| lo.top(dialect));

        // SELECT
        ts.push(Token::Select);
        if self.distinct {
            ts.space().push(Token::Distinct);
        }
        if let Some(n) = top {
            ts.space().push(Token::Top).space().push(helpers::row_count(n));
        }

        // Columns
        for (i, select_expr) in self.select.iter().enumerate() {
            if i == 0 {
                ts.newline().indent(1);
            } else {
                ts.comma().newline().indent(1);
            }
            ts.append(&select_expr.to_tokens_for_dialect(dialect));
        }

        // FROM
        if let Some(from) = &self.from {
            ts.newline().push(Token::From).space();
            ts.append(&from.to_tokens_for_dialect(dialect));
        }

        // JOINs
        for join in &self.joins {
            ts.newline();
            ts.append(&join.to_tokens_for_dialect(dialect));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens_for_dialect(dialect));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            ts.newline().push(Token::GroupBy).space();
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&expr.to_tokens_for_dialect(dialect));
            }
        }

        // HAVING
        if let Some(having) = &self.having {
            ts.newline().push(Token::Having).space();
            ts.append(&having.to_tokens_for_dialect(dialect));
        }

        // ORDER BY
        let paginated = self.limit_offset.is_some() && top.is_none();
        let needs_order_by_placeholder =
            dialect.requires_order_by_for_offset() && self.order_by.is_empty() && paginated;

        if !self.order_by.is_empty() {
            ts.newline().push(Token::OrderBy).space();
            for (i, order_expr) in self.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&order_expr.to_tokens_for_dialect(dialect));
            }
        } else if needs_order_by_placeholder {
            // OFFSET/FETCH needs an ORDER BY; the row order is then unspecified
            ts.newline()
                .push(Token::OrderBy)
                .space()
                .lparen()
                .push(Token::Select)
                .space()
                .push(Token::Null)
                .rparen();
        }

        // LIMIT / OFFSET
        if let (Some(lo), true) = (&self.limit_offset, paginated) {
            ts.newline();
            ts.append(&lo.to_tokens(dialect));
        }

        ts
    }

    /// Generate SQL string for a specific dialect.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        self.to_tokens_for_dialect(dialect).serialize(dialect)
    }
}

impl std::fmt::Display for Query {
    /// Formats the query using the default dialect (DuckDB).
    ///
    /// For dialect-specific SQL, use [`Query::to_sql`] instead.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql(&Dialect::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================
