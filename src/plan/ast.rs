//! Lambda AST - the operands of plan operations.
//!
//! Plan operations carry lambdas whose bodies are trees of [`Node`]. The
//! compiler binds each lambda parameter positionally to whatever row shape
//! the operation sees (the primary table, a join pair, a group, a derived
//! table), so parameters are untyped names here.

use std::fmt;

use crate::metadata::Value;

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal value.
    Constant(Value),

    /// Constant list, e.g. the receiver of `ids.Contains(o.Id)`.
    List(Vec<Value>),

    /// Reference to a lambda parameter.
    Parameter(String),

    /// Value captured from the caller's environment. Always rendered as a
    /// bound parameter, even when literals are inlined.
    Captured { name: String, value: Value },

    /// `target.member`
    Member { target: Box<Node>, member: String },

    /// `target.method(args...)`, or a static call when `target` is `None`.
    Call {
        target: Option<Box<Node>>,
        method: Method,
        args: Vec<Node>,
    },

    Unary { op: UnaryOp, operand: Box<Node> },

    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `test ? if_true : if_false`
    Conditional {
        test: Box<Node>,
        if_true: Box<Node>,
        if_false: Box<Node>,
    },

    /// Anonymous record or constructor projection: `new { A = .., B = .. }`.
    New {
        type_name: Option<String>,
        members: Vec<(String, Node)>,
    },

    /// Object-initializer projection: `new Dto { A = .., B = .. }`.
    Init {
        type_name: String,
        bindings: Vec<(String, Node)>,
    },

    /// `target[index]`
    Index { target: Box<Node>, index: Box<Node> },

    /// Nested lambda, as an argument of `Any`, `Sum`, ...
    Lambda(Box<Lambda>),
}

/// A lambda: parameter names and a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Node) -> Self {
        Self { params, body }
    }

    /// Name of the first parameter, if any.
    pub fn param(&self) -> Option<&str> {
        self.params.first().map(|s| s.as_str())
    }
}

/// Methods with a rendering rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    // Strings
    Contains,
    StartsWith,
    EndsWith,
    ToUpper,
    ToLower,
    Trim,
    Substring,
    // Collections and groups
    Any,
    All,
    Count,
    Sum,
    Min,
    Max,
    Average,
    /// Anything else; rejected by the visitor with its name.
    Other(String),
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::Contains => "Contains",
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::ToUpper => "ToUpper",
            Method::ToLower => "ToLower",
            Method::Trim => "Trim",
            Method::Substring => "Substring",
            Method::Any => "Any",
            Method::All => "All",
            Method::Count => "Count",
            Method::Sum => "Sum",
            Method::Min => "Min",
            Method::Max => "Max",
            Method::Average => "Average",
            Method::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `a ?? b`
    Coalesce,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Coalesce => "??",
        }
    }
}

// =============================================================================
// Diagnostics rendering
// =============================================================================

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Constant(v) => write!(f, "{}", v),
            Node::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Node::Parameter(name) => f.write_str(name),
            Node::Captured { name, .. } => f.write_str(name),
            Node::Member { target, member } => write!(f, "{}.{}", target, member),
            Node::Call {
                target,
                method,
                args,
            } => {
                if let Some(t) = target {
                    write!(f, "{}.", t)?;
                }
                write!(f, "{}(", method.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
            Node::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!({})", operand),
                UnaryOp::Negate => write!(f, "-({})", operand),
            },
            Node::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Node::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
            Node::New { type_name, members } => {
                write!(f, "new {}{{ ", type_name.as_deref().unwrap_or(""))?;
                write_bindings(f, members)?;
                f.write_str(" }")
            }
            Node::Init {
                type_name,
                bindings,
            } => {
                write!(f, "new {} {{ ", type_name)?;
                write_bindings(f, bindings)?;
                f.write_str(" }")
            }
            Node::Index { target, index } => write!(f, "{}[{}]", target, index),
            Node::Lambda(lambda) => write!(f, "{}", lambda),
        }
    }
}

fn write_bindings(f: &mut fmt::Formatter<'_>, bindings: &[(String, Node)]) -> fmt::Result {
    for (i, (name, node)) in bindings.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{} = {}", name, node)?;
    }
    Ok(())
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.len() {
            1 => write!(f, "{} => {}", self.params[0], self.body),
            _ => write!(f, "({}) => {}", self.params.join(", "), self.body),
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Reference a lambda parameter.
pub fn param(name: &str) -> Node {
    Node::Parameter(name.to_string())
}

/// A literal.
pub fn lit(value: impl Into<Value>) -> Node {
    Node::Constant(value.into())
}

/// A NULL literal.
pub fn null() -> Node {
    Node::Constant(Value::Null)
}

/// A value captured from the caller (always parameterized).
pub fn captured(name: &str, value: impl Into<Value>) -> Node {
    Node::Captured {
        name: name.to_string(),
        value: value.into(),
    }
}

/// A constant list.
pub fn list<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Node {
    Node::List(values.into_iter().map(Into::into).collect())
}

/// Single-parameter lambda.
pub fn lambda(param: &str, body: Node) -> Lambda {
    Lambda::new(vec![param.to_string()], body)
}

/// Two-parameter lambda (join result selectors).
pub fn lambda2(first: &str, second: &str, body: Node) -> Lambda {
    Lambda::new(vec![first.to_string(), second.to_string()], body)
}

/// Anonymous record: `new { name = node, ... }`.
pub fn record(members: Vec<(&str, Node)>) -> Node {
    Node::New {
        type_name: None,
        members: members
            .into_iter()
            .map(|(n, node)| (n.to_string(), node))
            .collect(),
    }
}

/// Object initializer: `new Type { name = node, ... }`.
pub fn init(type_name: &str, bindings: Vec<(&str, Node)>) -> Node {
    Node::Init {
        type_name: type_name.to_string(),
        bindings: bindings
            .into_iter()
            .map(|(n, node)| (n.to_string(), node))
            .collect(),
    }
}

/// `test ? if_true : if_false`
pub fn cond(test: Node, if_true: impl Into<Node>, if_false: impl Into<Node>) -> Node {
    Node::Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true.into()),
        if_false: Box::new(if_false.into()),
    }
}

// =============================================================================
// Builder trait
// =============================================================================

/// Extension trait for building nodes fluently.
pub trait NodeExt: Sized {
    fn into_node(self) -> Node;

    fn member(self, name: &str) -> Node {
        Node::Member {
            target: Box::new(self.into_node()),
            member: name.to_string(),
        }
    }

    fn call(self, method: Method, args: Vec<Node>) -> Node {
        Node::Call {
            target: Some(Box::new(self.into_node())),
            method,
            args,
        }
    }

    fn index(self, index: impl Into<Node>) -> Node {
        Node::Index {
            target: Box::new(self.into_node()),
            index: Box::new(index.into()),
        }
    }

    // Comparison
    fn eq(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Eq, other.into())
    }

    fn ne(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Ne, other.into())
    }

    fn lt(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Lt, other.into())
    }

    fn gt(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Gt, other.into())
    }

    fn lte(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Lte, other.into())
    }

    fn gte(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Gte, other.into())
    }

    // Logical
    fn and(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::And, other.into())
    }

    fn or(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Or, other.into())
    }

    fn not(self) -> Node {
        Node::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self.into_node()),
        }
    }

    fn negate(self) -> Node {
        Node::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self.into_node()),
        }
    }

    // Arithmetic
    fn add(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Add, other.into())
    }

    fn sub(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Sub, other.into())
    }

    fn mul(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Mul, other.into())
    }

    fn div(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Div, other.into())
    }

    fn rem(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Mod, other.into())
    }

    /// `self ?? other`
    fn coalesce(self, other: impl Into<Node>) -> Node {
        binary(self.into_node(), BinaryOp::Coalesce, other.into())
    }

    // Strings
    fn contains(self, value: impl Into<Node>) -> Node {
        self.call(Method::Contains, vec![value.into()])
    }

    fn starts_with(self, value: impl Into<Node>) -> Node {
        self.call(Method::StartsWith, vec![value.into()])
    }

    fn ends_with(self, value: impl Into<Node>) -> Node {
        self.call(Method::EndsWith, vec![value.into()])
    }

    fn to_upper(self) -> Node {
        self.call(Method::ToUpper, vec![])
    }

    fn to_lower(self) -> Node {
        self.call(Method::ToLower, vec![])
    }

    fn trim(self) -> Node {
        self.call(Method::Trim, vec![])
    }

    // Collections and groups
    fn any(self) -> Node {
        self.call(Method::Any, vec![])
    }

    fn any_where(self, predicate: Lambda) -> Node {
        self.call(Method::Any, vec![Node::Lambda(Box::new(predicate))])
    }

    fn all(self, predicate: Lambda) -> Node {
        self.call(Method::All, vec![Node::Lambda(Box::new(predicate))])
    }

    fn count(self) -> Node {
        self.call(Method::Count, vec![])
    }

    fn count_where(self, predicate: Lambda) -> Node {
        self.call(Method::Count, vec![Node::Lambda(Box::new(predicate))])
    }

    fn sum(self, selector: Lambda) -> Node {
        self.call(Method::Sum, vec![Node::Lambda(Box::new(selector))])
    }

    fn min(self, selector: Lambda) -> Node {
        self.call(Method::Min, vec![Node::Lambda(Box::new(selector))])
    }

    fn max(self, selector: Lambda) -> Node {
        self.call(Method::Max, vec![Node::Lambda(Box::new(selector))])
    }

    fn average(self, selector: Lambda) -> Node {
        self.call(Method::Average, vec![Node::Lambda(Box::new(selector))])
    }
}

impl NodeExt for Node {
    fn into_node(self) -> Node {
        self
    }
}

fn binary(left: Node, op: BinaryOp, right: Node) -> Node {
    Node::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

macro_rules! node_from_literal {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Node::Constant(value.into())
                }
            }
        )*
    };
}

node_from_literal!(Value, bool, i64, i32, f64, &str, String);
