//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings.

use super::dialect::SqlDialect;

/// SQL Token - every possible element in a SQL statement.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Inner,
    Left,
    Outer,
    Cross,
    GroupBy,
    Having,
    OrderBy,
    Asc,
    Desc,
    Limit,
    Offset,
    Fetch,
    Next,
    First,
    Rows,
    Only,
    Top,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Like,
    Escape,
    IsNull,
    IsNotNull,
    Distinct,
    All,
    Union,
    Exists,
    Null,
    True,
    False,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Returning,
    Output,
    Inserted,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Semicolon,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Concat,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// Boolean literal
    LitBool(bool),
    /// NULL literal
    LitNull,
    /// Bound parameter, by id in the command's parameter list.
    ///
    /// Ids are renumbered into text order by [`TokenStream::render`].
    Param(usize),

    // === Function Names ===
    /// Function name, remapped per dialect (e.g. LENGTH → LEN on T-SQL).
    FunctionName(String),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized
    /// and can lead to SQL injection vulnerabilities. Only use with trusted,
    /// static SQL fragments. Values always go through `Token::Param` or the
    /// escaping literal tokens.
    Raw(String),
}

impl Token {
    /// Serialize this token to a string for the given dialect.
    ///
    /// `Param(n)` renders as the placeholder for ordinal `n`.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Inner => "INNER".into(),
            Token::Left => "LEFT".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::Having => "HAVING".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Fetch => "FETCH".into(),
            Token::Next => "NEXT".into(),
            Token::First => "FIRST".into(),
            Token::Rows => "ROWS".into(),
            Token::Only => "ONLY".into(),
            Token::Top => "TOP".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::Like => "LIKE".into(),
            Token::Escape => "ESCAPE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::All => "ALL".into(),
            Token::Union => "UNION".into(),
            Token::Exists => "EXISTS".into(),
            Token::Null => "NULL".into(),
            Token::True => "TRUE".into(),
            Token::False => "FALSE".into(),

            // DML keywords
            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Delete => "DELETE".into(),
            Token::Returning => "RETURNING".into(),
            Token::Output => "OUTPUT".into(),
            Token::Inserted => "INSERTED".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Semicolon => ";".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),
            Token::Mod => "%".into(),
            Token::Concat => dialect.concat_operator().into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { schema, name } => match schema {
                Some(s) => format!(
                    "{}.{}",
                    dialect.quote_identifier(s),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                // no SQL literal for NaN or infinity; those are bound as parameters
                if !f.is_finite() {
                    log::warn!("non-finite float {} rendered as NULL", f);
                    return dialect.format_null().into();
                }
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_string()
            }
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => dialect.format_null().into(),
            Token::Param(ordinal) => dialect.parameter_placeholder(*ordinal),

            // Function names with dialect-specific remapping
            Token::FunctionName(name) => match dialect.remap_function(name) {
                Some(remapped) => remapped.to_uppercase(),
                None => name.to_uppercase(),
            },

            // Escape hatch
            Token::Raw(s) => s.clone(),
        }
    }
}

/// Output of [`TokenStream::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    /// Parameter ids in placeholder order. An id appears once per occurrence.
    pub parameter_order: Vec<usize>,
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    /// Serialize, numbering parameters in the order they appear in the text.
    ///
    /// With `pretty == false`, newlines collapse to single spaces (none
    /// directly inside parentheses) and indentation is dropped.
    pub fn render(&self, dialect: &dyn SqlDialect, pretty: bool) -> RenderedSql {
        let mut sql = String::new();
        let mut parameter_order = Vec::new();

        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Param(id) => {
                    sql.push_str(&dialect.parameter_placeholder(parameter_order.len()));
                    parameter_order.push(*id);
                }
                Token::Newline if !pretty => {
                    let after_open = sql.ends_with('(') || sql.ends_with(' ') || sql.is_empty();
                    let before_close = matches!(self.tokens.get(i + 1), Some(Token::RParen));
                    if !after_open && !before_close {
                        sql.push(' ');
                    }
                }
                Token::Indent(_) if !pretty => {}
                other => sql.push_str(&other.serialize(dialect)),
            }
        }

        RenderedSql {
            sql,
            parameter_order,
        }
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
