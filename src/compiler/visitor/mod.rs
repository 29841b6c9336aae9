//! Expression visitors - lambda bodies to SQL fragments.
//!
//! Traversal lives in the `walk_*` functions; each clause visitor implements
//! [`ClauseVisitor`] and overrides only the hooks whose rendering differs in
//! its clause. Visiting yields a [`Fragment`], which is either a SQL scalar
//! or a structured binding (a table row, a collection, a record, a group)
//! that later member accesses resolve against.

pub mod aggregate;
pub mod join;
pub mod order_by;
pub mod select;
pub mod where_clause;

pub use aggregate::AggregateVisitor;
pub use join::JoinVisitor;
pub use order_by::OrderByVisitor;
pub use select::{Layout, Projection, SelectVisitor};
pub use where_clause::WhereVisitor;

use std::collections::HashMap;
use std::sync::Arc;

use super::builder::FragmentBuilder;
use super::navigation;
use super::{CompileError, CompileResult};
use crate::metadata::{DataType, EntityDescriptor, NavigationMember, Value};
use crate::plan::{BinaryOp, Lambda, Method, Node, UnaryOp};
use crate::sql::{
    always, func, lit_bool, lit_int, lit_null, BinaryOperator, DatePart, Expr,
    ExprExt, Literal, UnaryOperator,
};

// =============================================================================
// Fragments
// =============================================================================

/// A SQL expression with its inferred storage type.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub expr: Expr,
    pub data_type: Option<DataType>,
}

impl Scalar {
    pub fn new(expr: Expr, data_type: Option<DataType>) -> Self {
        Self { expr, data_type }
    }

    fn boolean(expr: Expr) -> Self {
        Self::new(expr, Some(DataType::Bool))
    }

    fn is_textual(&self) -> bool {
        self.data_type.map(|t| t.is_textual()).unwrap_or(false)
    }
}

/// A table row (or derived-table row) in scope.
#[derive(Debug, Clone)]
pub struct RowBinding {
    /// `None` renders unqualified columns (UPDATE/DELETE targets).
    pub alias: Option<String>,
    pub entity: Arc<EntityDescriptor>,
    /// Scope-unique key; navigation joins extend it with member names.
    pub path: String,
    /// Member to output-column map for rows read from a derived table.
    pub columns: Option<Arc<HashMap<String, String>>>,
    /// Reached through a LEFT JOIN, so possibly absent.
    pub optional: bool,
}

impl RowBinding {
    pub fn table(alias: &str, entity: Arc<EntityDescriptor>) -> Self {
        Self {
            alias: Some(alias.to_string()),
            entity,
            path: alias.to_string(),
            columns: None,
            optional: false,
        }
    }

    pub fn unqualified(entity: Arc<EntityDescriptor>) -> Self {
        Self {
            alias: None,
            path: entity.name().to_string(),
            entity,
            columns: None,
            optional: false,
        }
    }

    /// Column expression for a mapped member.
    pub fn member_expr(&self, member: &str) -> CompileResult<Expr> {
        self.field(member).map(|s| s.expr)
    }

    pub fn field(&self, member: &str) -> CompileResult<Scalar> {
        let unknown = || CompileError::UnknownMember {
            entity: self.entity.name().to_string(),
            member: member.to_string(),
        };
        let (_, field) = self.entity.field(member).ok_or_else(unknown)?;
        let column = match &self.columns {
            Some(columns) => columns.get(member).cloned().ok_or_else(unknown)?,
            None => field.column.clone(),
        };
        let expr = Expr::Column {
            table: self.alias.clone(),
            column,
        };
        Ok(Scalar::new(expr, Some(field.data_type)))
    }

    pub fn key_exprs(&self) -> CompileResult<Vec<Expr>> {
        self.entity
            .key_fields()
            .map(|f| self.member_expr(&f.member))
            .collect()
    }
}

/// A one-to-many navigation of a row, not yet joined.
#[derive(Debug, Clone)]
pub struct CollectionBinding {
    pub parent: RowBinding,
    pub navigation: NavigationMember,
}

/// A `GroupBy` result: key and element expressions over the source rows.
#[derive(Debug, Clone)]
pub struct GroupBinding {
    pub key: Node,
    pub element: Node,
}

/// Result of visiting a node.
#[derive(Debug, Clone)]
pub enum Fragment {
    Scalar(Scalar),
    Row(RowBinding),
    Collection(CollectionBinding),
    Record(Vec<(String, Fragment)>),
    Group(Box<GroupBinding>),
    List(Vec<Value>),
}

impl Fragment {
    fn kind(&self) -> &'static str {
        match self {
            Fragment::Scalar(_) => "scalar",
            Fragment::Row(_) => "row",
            Fragment::Collection(_) => "collection",
            Fragment::Record(_) => "record",
            Fragment::Group(_) => "group",
            Fragment::List(_) => "list",
        }
    }
}

/// Variable bindings visible to a lambda body.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: Vec<(String, Fragment)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, fragment: Fragment) -> Self {
        self.vars.push((name.to_string(), fragment));
        self
    }

    /// A child scope with one more binding. Shadows outer names.
    pub fn bind(&self, name: &str, fragment: Fragment) -> Self {
        self.clone().with(name, fragment)
    }

    pub fn get(&self, name: &str) -> Option<&Fragment> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }
}

// =============================================================================
// Visitor trait
// =============================================================================

/// Per-clause rendering hooks over the shared traversal.
pub trait ClauseVisitor {
    /// Clause name used in diagnostics.
    fn clause(&self) -> &'static str;

    fn visit(&mut self, cx: &mut FragmentBuilder<'_>, env: &Env, node: &Node) -> CompileResult<Fragment> {
        walk(self, cx, env, node)
    }

    fn visit_constant(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        value: &Value,
        hint: Option<DataType>,
    ) -> CompileResult<Fragment> {
        Ok(Fragment::Scalar(walk_constant(cx, value, hint)))
    }

    fn visit_member(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        target: &Node,
        member: &str,
        node: &Node,
    ) -> CompileResult<Fragment> {
        walk_member(self, cx, env, target, member, node)
    }

    fn visit_call(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        target: Option<&Node>,
        method: &Method,
        args: &[Node],
        node: &Node,
    ) -> CompileResult<Fragment> {
        walk_call(self, cx, env, target, method, args, node)
    }

    fn visit_unary(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        op: UnaryOp,
        operand: &Node,
        node: &Node,
    ) -> CompileResult<Fragment> {
        walk_unary(self, cx, env, op, operand, node)
    }

    fn visit_binary(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        op: BinaryOp,
        left: &Node,
        right: &Node,
        node: &Node,
    ) -> CompileResult<Fragment> {
        walk_binary(self, cx, env, op, left, right, node)
    }

    fn visit_record(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        members: &[(String, Node)],
    ) -> CompileResult<Fragment> {
        let mut fields = Vec::with_capacity(members.len());
        for (name, member) in members {
            fields.push((name.clone(), self.visit(cx, env, member)?));
        }
        Ok(Fragment::Record(fields))
    }
}

// =============================================================================
// Coercions
// =============================================================================

/// Expect a scalar fragment.
pub fn expect_scalar(fragment: Fragment, clause: &'static str, node: &Node) -> CompileResult<Scalar> {
    match fragment {
        Fragment::Scalar(s) => Ok(s),
        other => {
            log::debug!("{} in {}: expected scalar, found {}", node, clause, other.kind());
            Err(CompileError::unsupported(clause, node))
        }
    }
}

/// Use a scalar where SQL needs a predicate. Boolean leaves become explicit
/// comparisons and constant booleans become `1 = 1` / `1 = 0`.
pub fn as_predicate(scalar: Scalar) -> Expr {
    match scalar.expr {
        Expr::Literal(Literal::Bool(b)) => always(b),
        expr if expr.is_predicate() => expr,
        expr => expr.eq(lit_bool(true)),
    }
}

/// Use a scalar where SQL needs a value. Predicates become
/// `CASE WHEN p THEN true ELSE false END`.
pub fn as_value(scalar: Scalar) -> Expr {
    if scalar.expr.is_predicate() {
        Expr::Case {
            operand: None,
            when_clauses: vec![(scalar.expr, lit_bool(true))],
            else_clause: Some(Box::new(lit_bool(false))),
        }
    } else {
        scalar.expr
    }
}

pub fn predicate_of<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    node: &Node,
) -> CompileResult<Expr> {
    let fragment = v.visit(cx, env, node)?;
    Ok(as_predicate(expect_scalar(fragment, v.clause(), node)?))
}

pub fn scalar_of<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    node: &Node,
) -> CompileResult<Scalar> {
    let fragment = v.visit(cx, env, node)?;
    expect_scalar(fragment, v.clause(), node)
}

/// A nested lambda argument (`l => l.Qty > 2`).
pub(crate) fn lambda_arg<'n>(
    args: &'n [Node],
    clause: &'static str,
    node: &Node,
) -> CompileResult<Option<&'n Lambda>> {
    match args {
        [] => Ok(None),
        [Node::Lambda(lambda)] if lambda.params.len() == 1 => Ok(Some(lambda)),
        _ => Err(CompileError::unsupported(clause, node)),
    }
}

pub(crate) fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

// =============================================================================
// Traversal
// =============================================================================

pub fn walk<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    node: &Node,
) -> CompileResult<Fragment> {
    match node {
        Node::Constant(value) => v.visit_constant(cx, value, None),
        Node::List(values) => Ok(Fragment::List(values.clone())),
        Node::Parameter(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::plan(format!("unbound lambda parameter '{}'", name))),
        Node::Captured { value, .. } => {
            Ok(Fragment::Scalar(Scalar::new(cx.bind_param(value.clone(), None), value.data_type())))
        }
        Node::Member { target, member } => v.visit_member(cx, env, target, member, node),
        Node::Call {
            target,
            method,
            args,
        } => v.visit_call(cx, env, target.as_deref(), method, args, node),
        Node::Unary { op, operand } => v.visit_unary(cx, env, *op, operand, node),
        Node::Binary { op, left, right } => v.visit_binary(cx, env, *op, left, right, node),
        Node::Conditional {
            test,
            if_true,
            if_false,
        } => {
            let test = predicate_of(v, cx, env, test)?;
            let (t, f) = visit_operands(v, cx, env, if_true, if_false)?;
            let t = expect_scalar(t, v.clause(), node)?;
            let f = expect_scalar(f, v.clause(), node)?;
            let data_type = t.data_type.or(f.data_type);
            Ok(Fragment::Scalar(Scalar::new(
                Expr::Case {
                    operand: None,
                    when_clauses: vec![(test, as_value(t))],
                    else_clause: Some(Box::new(as_value(f))),
                },
                data_type,
            )))
        }
        Node::New { members, .. } => v.visit_record(cx, env, members),
        Node::Init { bindings, .. } => v.visit_record(cx, env, bindings),
        Node::Index { target, index } => walk_index(v, cx, env, target, index, node),
        Node::Lambda(_) => Err(CompileError::unsupported(v.clause(), node)),
    }
}

/// Constants: booleans and NULL inline, everything else through
/// [`FragmentBuilder::bind`].
pub fn walk_constant(cx: &mut FragmentBuilder<'_>, value: &Value, hint: Option<DataType>) -> Scalar {
    match value {
        Value::Null => Scalar::new(lit_null(), hint),
        Value::Bool(b) => Scalar::boolean(lit_bool(*b)),
        other => {
            let data_type = hint.or_else(|| other.data_type());
            Scalar::new(cx.bind(other.clone(), data_type), data_type)
        }
    }
}

fn is_value_node(node: &Node) -> bool {
    matches!(node, Node::Constant(_) | Node::Captured { .. })
}

/// A null literal, or a captured variable whose value is null.
fn is_null_node(node: &Node) -> bool {
    matches!(
        node,
        Node::Constant(Value::Null)
            | Node::Captured {
                value: Value::Null,
                ..
            }
    )
}

/// Visit a value node using the storage type of the other operand.
fn visit_typed<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    node: &Node,
    hint: Option<DataType>,
) -> CompileResult<Fragment> {
    match node {
        Node::Constant(value) => v.visit_constant(cx, value, hint),
        Node::Captured { value, .. } => {
            let data_type = hint.or_else(|| value.data_type());
            Ok(Fragment::Scalar(Scalar::new(
                cx.bind_param(value.clone(), data_type),
                data_type,
            )))
        }
        _ => v.visit(cx, env, node),
    }
}

fn hint_of(fragment: &Fragment) -> Option<DataType> {
    match fragment {
        Fragment::Scalar(s) => s.data_type,
        _ => None,
    }
}

/// Visit both operands of a binary node. A constant operand is typed from
/// the column on the other side.
pub fn visit_operands<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    left: &Node,
    right: &Node,
) -> CompileResult<(Fragment, Fragment)> {
    if is_value_node(left) && !is_value_node(right) {
        let r = v.visit(cx, env, right)?;
        let l = visit_typed(v, cx, env, left, hint_of(&r))?;
        Ok((l, r))
    } else {
        let l = v.visit(cx, env, left)?;
        let r = visit_typed(v, cx, env, right, hint_of(&l))?;
        Ok((l, r))
    }
}

pub fn walk_member<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    target: &Node,
    member: &str,
    node: &Node,
) -> CompileResult<Fragment> {
    match v.visit(cx, env, target)? {
        Fragment::Row(row) => navigation::row_member(cx, &row, member),
        Fragment::Record(fields) => fields
            .into_iter()
            .find(|(name, _)| name == member)
            .map(|(_, fragment)| fragment)
            .ok_or_else(|| CompileError::UnknownMember {
                entity: "record".to_string(),
                member: member.to_string(),
            }),
        Fragment::Group(group) if member == "Key" => v.visit(cx, env, &group.key),
        Fragment::Collection(collection) if member == "Count" => {
            navigation::collection_method(v, cx, env, &collection, &Method::Count, &[], node)
        }
        Fragment::Scalar(s) => scalar_member(s, member).ok_or_else(|| CompileError::unsupported(v.clause(), node)),
        _ => Err(CompileError::unsupported(v.clause(), node)),
    }
}

/// Properties of scalar values: string length and date parts.
fn scalar_member(s: Scalar, member: &str) -> Option<Fragment> {
    if member == "Length" {
        return Some(Fragment::Scalar(Scalar::new(
            func("LENGTH", vec![s.expr]),
            Some(DataType::Int),
        )));
    }
    DatePart::from_member(member).map(|part| {
        Fragment::Scalar(Scalar::new(
            Expr::DatePart {
                part,
                expr: Box::new(s.expr),
            },
            Some(DataType::Int),
        ))
    })
}

pub fn walk_call<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    target: Option<&Node>,
    method: &Method,
    args: &[Node],
    node: &Node,
) -> CompileResult<Fragment> {
    let Some(target) = target else {
        return Err(CompileError::unsupported(v.clause(), node));
    };

    match v.visit(cx, env, target)? {
        Fragment::List(values) if *method == Method::Contains && args.len() == 1 => {
            let probe = scalar_of(v, cx, env, &args[0])?;
            let values = values
                .into_iter()
                .map(|value| walk_constant(cx, &value, probe.data_type).expr)
                .collect();
            Ok(Fragment::Scalar(Scalar::boolean(Expr::In {
                expr: Box::new(as_value(probe)),
                values,
                negated: false,
            })))
        }
        Fragment::Scalar(s) => string_method(v, cx, env, s, method, args, node),
        Fragment::Collection(collection) => {
            navigation::collection_method(v, cx, env, &collection, method, args, node)
        }
        Fragment::Group(group) => aggregate::group_method(v, cx, env, &group, method, args, node),
        _ => Err(CompileError::unsupported(v.clause(), node)),
    }
}

/// Escape LIKE wildcards with `\`.
pub fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn string_method<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    s: Scalar,
    method: &Method,
    args: &[Node],
    node: &Node,
) -> CompileResult<Fragment> {
    let text = Some(DataType::Text);
    match (method, args) {
        (Method::Contains | Method::StartsWith | Method::EndsWith, [arg]) => {
            let (prefix, suffix) = match method {
                Method::Contains => ("%", "%"),
                Method::StartsWith => ("", "%"),
                _ => ("%", ""),
            };
            let pattern = match arg {
                Node::Constant(Value::Text(needle)) => {
                    let pattern = format!("{}{}{}", prefix, escape_like(needle), suffix);
                    cx.bind(Value::Text(pattern), text)
                }
                Node::Captured {
                    value: Value::Text(needle),
                    ..
                } => {
                    let pattern = format!("{}{}{}", prefix, escape_like(needle), suffix);
                    cx.bind_param(Value::Text(pattern), text)
                }
                other => {
                    let needle = as_value(scalar_of(v, cx, env, other)?);
                    let mut pattern = needle;
                    if !prefix.is_empty() {
                        pattern = Expr::Literal(Literal::String(prefix.into())).concat(pattern);
                    }
                    if !suffix.is_empty() {
                        pattern = pattern.concat(Expr::Literal(Literal::String(suffix.into())));
                    }
                    pattern
                }
            };
            Ok(Fragment::Scalar(Scalar::boolean(
                as_value(s).like_escape(pattern, '\\'),
            )))
        }
        (Method::ToUpper, []) => Ok(Fragment::Scalar(Scalar::new(func("UPPER", vec![s.expr]), text))),
        (Method::ToLower, []) => Ok(Fragment::Scalar(Scalar::new(func("LOWER", vec![s.expr]), text))),
        (Method::Trim, []) => Ok(Fragment::Scalar(Scalar::new(func("TRIM", vec![s.expr]), text))),
        (Method::Substring, [start, rest @ ..]) if rest.len() <= 1 => {
            let int = Some(DataType::Int);
            let start = match start {
                Node::Constant(Value::Int(n)) => lit_int(n + 1),
                other => as_value(expect_scalar(visit_typed(v, cx, env, other, int)?, v.clause(), node)?)
                    .add(lit_int(1)),
            };
            let length = match rest.first() {
                Some(len) => as_value(expect_scalar(visit_typed(v, cx, env, len, int)?, v.clause(), node)?),
                None => func("LENGTH", vec![s.expr.clone()]),
            };
            Ok(Fragment::Scalar(Scalar::new(
                func("SUBSTRING", vec![s.expr, start, length]),
                text,
            )))
        }
        _ => Err(CompileError::unsupported(v.clause(), node)),
    }
}

pub fn walk_unary<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    op: UnaryOp,
    operand: &Node,
    node: &Node,
) -> CompileResult<Fragment> {
    let s = scalar_of(v, cx, env, operand)?;
    let expr = match op {
        UnaryOp::Not => match s.expr {
            Expr::Literal(Literal::Bool(b)) => always(!b),
            expr if expr.is_predicate() => expr.not(),
            // a negated boolean leaf compares against false
            expr => expr.eq(lit_bool(false)),
        },
        UnaryOp::Negate => {
            if s.expr.is_predicate() {
                return Err(CompileError::unsupported(v.clause(), node));
            }
            return Ok(Fragment::Scalar(Scalar::new(
                Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(s.expr),
                },
                s.data_type,
            )));
        }
    };
    Ok(Fragment::Scalar(Scalar::boolean(expr)))
}

pub fn walk_binary<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    op: BinaryOp,
    left: &Node,
    right: &Node,
    node: &Node,
) -> CompileResult<Fragment> {
    if op.is_logical() {
        let l = predicate_of(v, cx, env, left)?;
        let r = predicate_of(v, cx, env, right)?;
        let expr = if op == BinaryOp::And { l.and(r) } else { l.or(r) };
        return Ok(Fragment::Scalar(Scalar::boolean(expr)));
    }

    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        let negated = op == BinaryOp::Ne;
        if is_null_node(right) {
            return null_test(v, cx, env, left, negated, node);
        }
        if is_null_node(left) {
            return null_test(v, cx, env, right, negated, node);
        }
    }

    let (l, r) = visit_operands(v, cx, env, left, right)?;

    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        if let Some(pairs) = composite_pairs(&l, &r)? {
            let mut terms = pairs.into_iter().map(|(a, b)| a.eq(b));
            let first = terms
                .next()
                .ok_or_else(|| CompileError::unsupported(v.clause(), node))?;
            let all = terms.fold(first, |acc, t| acc.and(t));
            let expr = if op == BinaryOp::Ne { all.not() } else { all };
            return Ok(Fragment::Scalar(Scalar::boolean(expr)));
        }
    }

    let l = expect_scalar(l, v.clause(), node)?;
    let r = expect_scalar(r, v.clause(), node)?;
    let data_type = l.data_type.or(r.data_type);

    let scalar = match op {
        BinaryOp::Eq => Scalar::boolean(as_value(l).eq(as_value(r))),
        BinaryOp::Ne => Scalar::boolean(as_value(l).ne(as_value(r))),
        BinaryOp::Lt => Scalar::boolean(as_value(l).lt(as_value(r))),
        BinaryOp::Gt => Scalar::boolean(as_value(l).gt(as_value(r))),
        BinaryOp::Lte => Scalar::boolean(as_value(l).lte(as_value(r))),
        BinaryOp::Gte => Scalar::boolean(as_value(l).gte(as_value(r))),
        BinaryOp::Add if l.is_textual() || r.is_textual() => {
            Scalar::new(as_value(l).concat(as_value(r)), Some(DataType::Text))
        }
        BinaryOp::Add => Scalar::new(as_value(l).add(as_value(r)), data_type),
        BinaryOp::Sub => Scalar::new(as_value(l).sub(as_value(r)), data_type),
        BinaryOp::Mul => Scalar::new(as_value(l).mul(as_value(r)), data_type),
        BinaryOp::Div => Scalar::new(as_value(l).div(as_value(r)), data_type),
        BinaryOp::Mod => Scalar::new(binary(as_value(l), BinaryOperator::Mod, as_value(r)), data_type),
        BinaryOp::Coalesce => Scalar::new(
            crate::sql::coalesce(vec![as_value(l), as_value(r)]),
            data_type,
        ),
        BinaryOp::And | BinaryOp::Or => return Err(CompileError::unsupported(v.clause(), node)),
    };
    Ok(Fragment::Scalar(scalar))
}

/// Column pairs of a record or row equality, or `None` for scalars.
fn composite_pairs(l: &Fragment, r: &Fragment) -> CompileResult<Option<Vec<(Expr, Expr)>>> {
    match (l, r) {
        (Fragment::Record(a), Fragment::Record(b)) if a.len() == b.len() => {
            let mut pairs = Vec::with_capacity(a.len());
            for ((_, x), (_, y)) in a.iter().zip(b) {
                match composite_pairs(x, y)? {
                    Some(nested) => pairs.extend(nested),
                    None => match (x, y) {
                        (Fragment::Scalar(x), Fragment::Scalar(y)) => {
                            pairs.push((as_value(x.clone()), as_value(y.clone())))
                        }
                        _ => return Ok(None),
                    },
                }
            }
            Ok(Some(pairs))
        }
        (Fragment::Row(a), Fragment::Row(b)) if Arc::ptr_eq(&a.entity, &b.entity) => {
            Ok(Some(a.key_exprs()?.into_iter().zip(b.key_exprs()?).collect()))
        }
        _ => Ok(None),
    }
}

fn null_test<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    operand: &Node,
    negated: bool,
    node: &Node,
) -> CompileResult<Fragment> {
    let expr = match v.visit(cx, env, operand)? {
        Fragment::Scalar(s) => as_value(s),
        // a missing related row has a NULL key
        Fragment::Row(row) => row
            .key_exprs()?
            .into_iter()
            .next()
            .ok_or_else(|| CompileError::unsupported(v.clause(), node))?,
        _ => return Err(CompileError::unsupported(v.clause(), node)),
    };
    Ok(Fragment::Scalar(Scalar::boolean(Expr::IsNull {
        expr: Box::new(expr),
        negated,
    })))
}

fn walk_index<V: ClauseVisitor + ?Sized>(
    v: &mut V,
    cx: &mut FragmentBuilder<'_>,
    env: &Env,
    target: &Node,
    index: &Node,
    node: &Node,
) -> CompileResult<Fragment> {
    match (v.visit(cx, env, target)?, index) {
        (Fragment::List(values), Node::Constant(Value::Int(i))) => {
            let value = usize::try_from(*i)
                .ok()
                .and_then(|i| values.get(i))
                .ok_or_else(|| CompileError::plan(format!("index {} out of range in {}", i, node)))?;
            v.visit_constant(cx, value, None)
        }
        (Fragment::Record(fields), Node::Constant(Value::Text(name))) => fields
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| CompileError::UnknownMember {
                entity: "record".to_string(),
                member: name.clone(),
            }),
        _ => Err(CompileError::unsupported(v.clause(), node)),
    }
}
