//! Expression AST - the SQL side of compilation.
//!
//! This module provides a strongly-typed AST for SQL expressions
//! with exhaustive pattern matching enforced by the compiler. Operator
//! precedence is resolved at rendering time, so builders never insert
//! parentheses by hand.

use super::dialect::SqlDialect;
use super::query::Query;
use super::token::{Token, TokenStream};

// =============================================================================
// Expression AST
// =============================================================================

/// A SQL expression.
///
/// Every variant must be handled in `to_tokens_for_dialect()` - the compiler enforces this.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference: optional_table.column
    Column {
        table: Option<String>,
        column: String,
    },

    /// Literal values
    Literal(Literal),

    /// Bound parameter, by id in the command's parameter list.
    Param(usize),

    /// Binary operation: left op right
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation: op expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// Function call: name(args...)
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },

    /// CASE WHEN... THEN... ELSE... END
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },

    /// Scalar subquery: (SELECT ...)
    Subquery(Box<Query>),

    /// EXISTS (SELECT ...)
    Exists {
        subquery: Box<Query>,
        negated: bool,
    },

    /// IN: expr IN (values...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IN subquery: expr IN (SELECT ...)
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Query>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE with ESCAPE: expr LIKE pattern ESCAPE escape_char
    LikeEscape {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape_char: char,
        negated: bool,
    },

    /// Date-part extraction, rendered per dialect.
    DatePart { part: DatePart, expr: Box<Expr> },

    /// Wildcard: * or table.*
    Star { table: Option<String> },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Raw SQL expression passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized.
    /// Values always go through `Expr::Param` or `Expr::Literal`.
    Raw(String),
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    /// Exact numeric, kept as its canonical text.
    Decimal(String),
    String(String),
    Bool(bool),
    Date(String),
    Timestamp(String),
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    // String
    Concat,
    Like,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::Ne
            | BinaryOperator::Lt
            | BinaryOperator::Gt
            | BinaryOperator::Lte
            | BinaryOperator::Gte
            | BinaryOperator::Like => 4,
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Concat => 5,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 6,
        }
    }

    /// Whether `a op (b op c)` equals `(a op b) op c`.
    pub fn is_associative(&self) -> bool {
        matches!(
            self,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::Plus
                | BinaryOperator::Mul
                | BinaryOperator::Concat
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// Date parts understood by [`SqlDialect::emit_date_part`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    /// Upper-case keyword (`YEAR`, `MONTH`, ...).
    pub fn keyword(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }

    /// Parse a member name (`Year`, `Month`, ...).
    pub fn from_member(member: &str) -> Option<Self> {
        match member {
            "Year" => Some(DatePart::Year),
            "Month" => Some(DatePart::Month),
            "Day" => Some(DatePart::Day),
            "Hour" => Some(DatePart::Hour),
            "Minute" => Some(DatePart::Minute),
            "Second" => Some(DatePart::Second),
            _ => None,
        }
    }
}

const PREC_NOT: u8 = 3;
const PREC_PREDICATE: u8 = 4;
const PREC_UNARY_MINUS: u8 = 7;
const PREC_ATOM: u8 = 8;

// =============================================================================
// Expression to Tokens
// =============================================================================

impl Expr {
    /// Binding strength of the expression's outermost operator.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op, .. } => op.precedence(),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            } => PREC_NOT,
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                ..
            } => PREC_UNARY_MINUS,
            Expr::In { .. }
            | Expr::InSubquery { .. }
            | Expr::IsNull { .. }
            | Expr::LikeEscape { .. } => PREC_PREDICATE,
            Expr::Exists { negated: true, .. } => PREC_NOT,
            _ => PREC_ATOM,
        }
    }

    /// Convert this expression to a token stream for a specific dialect.
    pub fn to_tokens_for_dialect(&self, dialect: &dyn SqlDialect) -> TokenStream {
        let mut ts = TokenStream::new();

        match self {
            Expr::Column { table, column } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Ident(column.clone()));
            }

            Expr::Literal(lit) => {
                ts.push(match lit {
                    Literal::Int(n) => Token::LitInt(*n),
                    Literal::Float(f) => Token::LitFloat(*f),
                    Literal::Decimal(d) => Token::Raw(d.clone()),
                    Literal::String(s) => Token::LitString(s.clone()),
                    Literal::Bool(b) => Token::LitBool(*b),
                    Literal::Date(d) => Token::Raw(dialect.format_date_literal(d)),
                    Literal::Timestamp(t) => Token::Raw(dialect.format_timestamp_literal(t)),
                    Literal::Null => Token::LitNull,
                });
            }

            Expr::Param(id) => {
                ts.push(Token::Param(*id));
            }

            Expr::BinaryOp { left, op, right } => {
                // Handle CONCAT specially for dialects that don't support || operator
                if *op == BinaryOperator::Concat && !dialect.supports_concat_operator() {
                    ts.push(Token::FunctionName("CONCAT".into()));
                    ts.lparen();
                    ts.append(&left.to_tokens_for_dialect(dialect));
                    ts.comma().space();
                    ts.append(&right.to_tokens_for_dialect(dialect));
                    ts.rparen();
                } else {
                    let prec = op.precedence();
                    // Comparisons do not chain: (a = b) = c keeps its parens
                    let left_paren = left.precedence() < prec
                        || (left.precedence() == prec && prec == PREC_PREDICATE);
                    let right_paren = right.precedence() < prec
                        || (right.precedence() == prec && !op.is_associative());
                    append_operand(&mut ts, left, left_paren, dialect);
                    ts.space();
                    ts.push(binary_op_to_token(*op));
                    ts.space();
                    append_operand(&mut ts, right, right_paren, dialect);
                }
            }

            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => {
                    ts.push(Token::Not).space();
                    append_operand(&mut ts, expr, expr.precedence() < PREC_NOT, dialect);
                }
                UnaryOperator::Minus => {
                    ts.push(Token::Minus);
                    append_operand(&mut ts, expr, expr.precedence() < PREC_ATOM, dialect);
                }
            },

            Expr::Function {
                name,
                args,
                distinct,
            } => {
                ts.push(Token::FunctionName(name.clone()));
                ts.lparen();
                if *distinct {
                    ts.push(Token::Distinct).space();
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(&arg.to_tokens_for_dialect(dialect));
                }
                ts.rparen();
            }

            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                ts.push(Token::Case);
                if let Some(op) = operand {
                    ts.space().append(&op.to_tokens_for_dialect(dialect));
                }
                for (when, then) in when_clauses {
                    ts.space().push(Token::When).space();
                    ts.append(&when.to_tokens_for_dialect(dialect));
                    ts.space().push(Token::Then).space();
                    ts.append(&then.to_tokens_for_dialect(dialect));
                }
                if let Some(else_expr) = else_clause {
                    ts.space().push(Token::Else).space();
                    ts.append(&else_expr.to_tokens_for_dialect(dialect));
                }
                ts.space().push(Token::End);
            }

            Expr::Subquery(query) => {
                ts.lparen();
                ts.append(&query.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Exists { subquery, negated } => {
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Exists).space().lparen();
                ts.append(&subquery.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                // Empty IN list: "x IN ()" is invalid SQL
                // "x IN ()" is always false, "x NOT IN ()" always true
                if values.is_empty() {
                    ts.append(&constant_predicate(*negated));
                } else {
                    append_operand(&mut ts, expr, expr.precedence() <= PREC_PREDICATE, dialect);
                    if *negated {
                        ts.space().push(Token::Not);
                    }
                    ts.space().push(Token::In).space().lparen();
                    for (i, val) in values.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.append(&val.to_tokens_for_dialect(dialect));
                    }
                    ts.rparen();
                }
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                append_operand(&mut ts, expr, expr.precedence() <= PREC_PREDICATE, dialect);
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::In).space().lparen();
                ts.append(&subquery.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::IsNull { expr, negated } => {
                append_operand(&mut ts, expr, expr.precedence() <= PREC_PREDICATE, dialect);
                ts.space();
                ts.push(if *negated {
                    Token::IsNotNull
                } else {
                    Token::IsNull
                });
            }

            Expr::LikeEscape {
                expr,
                pattern,
                escape_char,
                negated,
            } => {
                append_operand(&mut ts, expr, expr.precedence() <= PREC_PREDICATE, dialect);
                if *negated {
                    ts.space().push(Token::Not);
                }
                ts.space().push(Token::Like).space();
                append_operand(
                    &mut ts,
                    pattern,
                    pattern.precedence() <= PREC_PREDICATE,
                    dialect,
                );
                ts.space()
                    .push(Token::Escape)
                    .space()
                    .push(Token::LitString(escape_char.to_string()));
            }

            Expr::DatePart { part, expr } => {
                ts.append(&dialect.emit_date_part(*part, expr.to_tokens_for_dialect(dialect)));
            }

            Expr::Star { table } => {
                if let Some(t) = table {
                    ts.push(Token::Ident(t.clone()));
                    ts.push(Token::Dot);
                }
                ts.push(Token::Star);
            }

            Expr::Paren(inner) => {
                ts.lparen();
                ts.append(&inner.to_tokens_for_dialect(dialect));
                ts.rparen();
            }

            Expr::Raw(sql) => {
                ts.push(Token::Raw(sql.clone()));
            }
        }

        ts
    }

    /// Whether this expression is a boolean-valued predicate (as opposed to
    /// a value that needs an explicit comparison to be used as one).
    pub fn is_predicate(&self) -> bool {
        match self {
            Expr::BinaryOp { op, .. } => matches!(
                op,
                BinaryOperator::Eq
                    | BinaryOperator::Ne
                    | BinaryOperator::Lt
                    | BinaryOperator::Gt
                    | BinaryOperator::Lte
                    | BinaryOperator::Gte
                    | BinaryOperator::And
                    | BinaryOperator::Or
                    | BinaryOperator::Like
            ),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            } => true,
            Expr::Exists { .. }
            | Expr::In { .. }
            | Expr::InSubquery { .. }
            | Expr::IsNull { .. }
            | Expr::LikeEscape { .. } => true,
            Expr::Paren(inner) => inner.is_predicate(),
            _ => false,
        }
    }
}

fn append_operand(ts: &mut TokenStream, expr: &Expr, paren: bool, dialect: &dyn SqlDialect) {
    if paren {
        ts.lparen();
        ts.append(&expr.to_tokens_for_dialect(dialect));
        ts.rparen();
    } else {
        ts.append(&expr.to_tokens_for_dialect(dialect));
    }
}

/// `1 = 1` / `1 = 0`: a constant predicate every dialect accepts in WHERE.
fn constant_predicate(value: bool) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::LitInt(1))
        .space()
        .push(Token::Eq)
        .space()
        .push(Token::LitInt(if value { 1 } else { 0 }));
    ts
}

fn binary_op_to_token(op: BinaryOperator) -> Token {
    match op {
        BinaryOperator::Eq => Token::Eq,
        BinaryOperator::Ne => Token::Ne,
        BinaryOperator::Lt => Token::Lt,
        BinaryOperator::Gt => Token::Gt,
        BinaryOperator::Lte => Token::Lte,
        BinaryOperator::Gte => Token::Gte,
        BinaryOperator::And => Token::And,
        BinaryOperator::Or => Token::Or,
        BinaryOperator::Plus => Token::Plus,
        BinaryOperator::Minus => Token::Minus,
        BinaryOperator::Mul => Token::Mul,
        BinaryOperator::Div => Token::Div,
        BinaryOperator::Mod => Token::Mod,
        BinaryOperator::Concat => Token::Concat,
        BinaryOperator::Like => Token::Like,
    }
}

// =============================================================================
// Builder DSL
// =============================================================================

/// Column reference.
pub fn col(name: &str) -> Expr {
    Expr::Column {
        table: None,
        column: name.into(),
    }
}

/// Qualified column reference: table.column
pub fn table_col(table: &str, column: &str) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        column: column.into(),
    }
}

/// Integer literal.
pub fn lit_int(n: i64) -> Expr {
    Expr::Literal(Literal::Int(n))
}

/// String literal.
pub fn lit_str(s: &str) -> Expr {
    Expr::Literal(Literal::String(s.into()))
}

/// Boolean literal.
pub fn lit_bool(b: bool) -> Expr {
    Expr::Literal(Literal::Bool(b))
}

/// NULL literal.
pub fn lit_null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Constant predicate (`1 = 1` or `1 = 0`).
pub fn always(value: bool) -> Expr {
    lit_int(1).eq(lit_int(if value { 1 } else { 0 }))
}

/// COUNT(expr)
pub fn count(expr: Expr) -> Expr {
    func("COUNT", vec![expr])
}

/// COALESCE(args...)
pub fn coalesce(args: Vec<Expr>) -> Expr {
    func("COALESCE", args)
}

/// Generic function call.
pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
        distinct: false,
    }
}

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    // Comparison
    fn eq(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Eq, other.into())
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Ne, other.into())
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gt, other.into())
    }

    fn gte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Gte, other.into())
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lt, other.into())
    }

    fn lte(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Lte, other.into())
    }

    // Logical
    fn and(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::And, other.into())
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Or, other.into())
    }

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self.into_expr()),
        }
    }

    // Null checks
    fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: false,
        }
    }

    fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self.into_expr()),
            negated: true,
        }
    }

    // Arithmetic
    fn add(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Plus, other.into())
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Minus, other.into())
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Mul, other.into())
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Div, other.into())
    }

    /// LIKE with an explicit escape character.
    fn like_escape(self, pattern: impl Into<Expr>, escape_char: char) -> Expr {
        Expr::LikeEscape {
            expr: Box::new(self.into_expr()),
            pattern: Box::new(pattern.into()),
            escape_char,
            negated: false,
        }
    }

    fn concat(self, other: impl Into<Expr>) -> Expr {
        binary(self.into_expr(), BinaryOperator::Concat, other.into())
    }

    fn in_list(self, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(self.into_expr()),
            values,
            negated: false,
        }
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        lit_int(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        lit_str(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        lit_bool(b)
    }
}
