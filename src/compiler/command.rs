//! Command assembly: SELECT through the assembler, INSERT/UPDATE/DELETE
//! directly from the reduced plan.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::alias::AliasKey;
use super::assembler::assemble;
use super::builder::{FragmentBuilder, Parameter, Scope};
use super::reducer::{Reduced, SOURCE};
use super::shape::ResultShape;
use super::visitor::{as_value, scalar_of, Env, Fragment, RowBinding, WhereVisitor};
use super::{CompileError, CompileResult};
use crate::metadata::{EntityDescriptor, Value};
use crate::plan::{DeleteTarget, Lambda, Node, UpdateTarget};
use crate::sql::{
    lit_int, table_col, Delete, Expr, ExprExt, IdentityCapture, Insert, Query, SelectExpr,
    Source, SqlDialect, TableRef, TokenStream, Update,
};

const DERIVED_KEYS: &str = "keys";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A compiled command before placeholder numbering.
#[derive(Debug, Clone)]
pub struct CompiledParts {
    pub kind: CommandKind,
    pub tokens: TokenStream,
    /// Parameters by id, as referenced from the tokens.
    pub parameters: Vec<Parameter>,
    /// Result layout. Empty for commands returning no rows.
    pub shape: ResultShape,
}

/// Compile a reduced plan for `dialect`.
pub fn compile_command(
    reduced: &Reduced,
    dialect: &dyn SqlDialect,
    parameterize: bool,
    alias_prefix: &str,
) -> CompileResult<CompiledParts> {
    let mut cx = FragmentBuilder::new(dialect, parameterize, alias_prefix);
    let (kind, tokens, shape) = match reduced {
        Reduced::Select(tree) => {
            let assembled = assemble(&mut cx, tree)?;
            let tokens = assembled.query.to_tokens_for_dialect(dialect);
            (CommandKind::Select, tokens, assembled.shape)
        }
        Reduced::Insert {
            entity,
            rows,
            capture_identity,
        } => {
            let (insert, shape) = insert(&mut cx, entity, rows, *capture_identity)?;
            (CommandKind::Insert, insert.to_tokens(dialect), shape)
        }
        Reduced::Update { tree, target } => {
            let entity = target_entity(tree.source_entity())?;
            let update = update(&mut cx, &entity, &tree.wheres, target)?;
            (CommandKind::Update, update.to_tokens(dialect), ResultShape::default())
        }
        Reduced::Delete { tree, target } => {
            let entity = target_entity(tree.source_entity())?;
            let delete = delete(&mut cx, &entity, &tree.wheres, target)?;
            (CommandKind::Delete, delete.to_tokens(dialect), ResultShape::default())
        }
    };
    log::debug!("compiled {:?} with {} parameters", kind, cx.parameters().len());
    Ok(CompiledParts {
        kind,
        tokens,
        parameters: cx.into_parameters(),
        shape,
    })
}

fn target_entity(entity: Option<Arc<EntityDescriptor>>) -> CompileResult<Arc<EntityDescriptor>> {
    entity.ok_or_else(|| CompileError::plan("data modification needs an entity source"))
}

fn table_of(entity: &EntityDescriptor) -> CompileResult<&str> {
    entity
        .table()
        .ok_or_else(|| CompileError::UnknownEntity(entity.name().to_string()))
}

// =============================================================================
// INSERT
// =============================================================================

fn insert(
    cx: &mut FragmentBuilder<'_>,
    entity: &EntityDescriptor,
    rows: &[Vec<Value>],
    capture_identity: bool,
) -> CompileResult<(Insert, ResultShape)> {
    if rows.is_empty() {
        return Err(CompileError::plan("Insert needs at least one row"));
    }
    let table = table_of(entity)?;
    let slots: Vec<usize> = entity
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_identity)
        .map(|(slot, _)| slot)
        .collect();

    let mut insert = Insert::into(table)
        .schema(entity.schema())
        .columns(slots.iter().map(|&slot| entity.fields()[slot].column.clone()));

    for row in rows {
        let mut values = Vec::with_capacity(slots.len());
        for &slot in &slots {
            let field = &entity.fields()[slot];
            let value = row.get(slot).cloned().unwrap_or(Value::Null);
            let value = match (&value, &field.default) {
                (Value::Null, Some(default)) => default.clone(),
                _ => value,
            };
            values.push(cx.bind(value, Some(field.data_type)));
        }
        insert = insert.values(values);
    }

    let mut shape = ResultShape::default();
    if capture_identity {
        let identity = entity
            .fields()
            .iter()
            .find(|f| f.is_identity)
            .ok_or_else(|| {
                CompileError::plan(format!("'{}' has no identity column to capture", entity.name()))
            })?;
        if cx.dialect().identity_capture() == IdentityCapture::Unsupported {
            return Err(CompileError::plan(format!(
                "{} cannot read back generated identity values",
                cx.dialect().name()
            )));
        }
        insert = insert.capture_identity(identity.column.clone());
        shape = ResultShape::scalar(&identity.column);
    }
    Ok((insert, shape))
}

// =============================================================================
// UPDATE
// =============================================================================

fn update(
    cx: &mut FragmentBuilder<'_>,
    entity: &Arc<EntityDescriptor>,
    wheres: &[Node],
    target: &UpdateTarget,
) -> CompileResult<Update> {
    let table = table_of(entity)?;
    let mut update = Update::table(table).schema(entity.schema());

    match target {
        UpdateTarget::Entity { values } => {
            for (slot, field) in entity.fields().iter().enumerate() {
                if field.is_key || field.is_identity {
                    continue;
                }
                let value = values.get(slot).cloned().unwrap_or(Value::Null);
                update = update.set(field.column.clone(), cx.bind(value, Some(field.data_type)));
            }
            if update.set.is_empty() {
                return Err(CompileError::plan(format!(
                    "'{}' has no updatable columns",
                    entity.name()
                )));
            }
            let key: Vec<Value> = entity
                .key_slots()
                .into_iter()
                .map(|slot| values.get(slot).cloned().unwrap_or(Value::Null))
                .collect();
            update = update.filter(key_filter(cx, entity, &key)?);
        }
        UpdateTarget::Assign(assignments) => {
            for (column, value) in assign(cx, entity, assignments)? {
                update = update.set(column, value);
            }
        }
    }

    if let Some(filter) = row_filter(cx, entity, wheres)? {
        update = update.filter(filter);
    }
    Ok(update)
}

/// `new T { Member = expr, ... }` as `(column, value)` pairs.
fn assign(
    cx: &mut FragmentBuilder<'_>,
    entity: &Arc<EntityDescriptor>,
    assignments: &Lambda,
) -> CompileResult<Vec<(String, Expr)>> {
    let bindings = match &assignments.body {
        Node::Init { bindings, .. } => bindings,
        Node::New { members, .. } => members,
        other => {
            return Err(CompileError::plan(format!(
                "update assignments must be an initializer, got {}",
                other
            )))
        }
    };
    let table = table_of(entity)?;
    let row = RowBinding::table(table, Arc::clone(entity));
    let env = Env::new().with(
        assignments.param().unwrap_or(SOURCE),
        Fragment::Row(row),
    );

    let mut out = Vec::with_capacity(bindings.len());
    for (member, node) in bindings {
        let (_, field) = entity.field(member).ok_or_else(|| CompileError::UnknownMember {
            entity: entity.name().to_string(),
            member: member.clone(),
        })?;
        let value = match node {
            Node::Constant(value) | Node::Captured { value, .. } => {
                cx.bind(value.clone(), Some(field.data_type))
            }
            other => as_value(scalar_of(&mut WhereVisitor::new("SET"), cx, &env, other)?),
        };
        out.push((field.column.clone(), value));
    }
    if cx.has_navigation_joins() {
        return Err(CompileError::plan("update assignments cannot read navigation members"));
    }
    if out.is_empty() {
        return Err(CompileError::plan("update assigns no columns"));
    }
    Ok(out)
}

// =============================================================================
// DELETE
// =============================================================================

fn delete(
    cx: &mut FragmentBuilder<'_>,
    entity: &Arc<EntityDescriptor>,
    wheres: &[Node],
    target: &DeleteTarget,
) -> CompileResult<Delete> {
    let table = table_of(entity)?;
    let mut delete = Delete::from(table).schema(entity.schema());
    if let DeleteTarget::Key(key) = target {
        delete = delete.filter(key_filter(cx, entity, key)?);
    }
    match row_filter(cx, entity, wheres)? {
        Some(filter) => delete = delete.filter(filter),
        None if *target == DeleteTarget::Matching => {
            log::warn!("DELETE without a filter removes every row of {}", table);
        }
        None => {}
    }
    Ok(delete)
}

// =============================================================================
// Row targeting
// =============================================================================

/// `key1 = v1 AND key2 = v2` over unqualified key columns.
fn key_filter(cx: &mut FragmentBuilder<'_>, entity: &Arc<EntityDescriptor>, key: &[Value]) -> CompileResult<Expr> {
    let row = RowBinding::unqualified(Arc::clone(entity));
    let fields: Vec<_> = entity.key_fields().collect();
    if fields.is_empty() {
        return Err(CompileError::plan(format!("'{}' declares no primary key", entity.name())));
    }
    if fields.len() != key.len() {
        return Err(CompileError::plan(format!(
            "'{}' has {} key members, got {} values",
            entity.name(),
            fields.len(),
            key.len()
        )));
    }
    let mut filter: Option<Expr> = None;
    for (field, value) in fields.into_iter().zip(key) {
        let term = row
            .member_expr(&field.member)?
            .eq(cx.bind(value.clone(), Some(field.data_type)));
        filter = Some(match filter {
            Some(acc) => acc.and(term),
            None => term,
        });
    }
    filter.ok_or_else(|| CompileError::plan("empty key"))
}

/// WHERE for an UPDATE or DELETE target. Predicates that navigate to other
/// tables select the target keys through a subquery instead:
///
/// ```text
/// k IN (SELECT t0.k FROM T t0 LEFT JOIN ... WHERE ...)
/// EXISTS (SELECT 1 FROM T t0 LEFT JOIN ... WHERE ... AND t0.k1 = T.k1 AND ...)
/// ```
fn row_filter(
    cx: &mut FragmentBuilder<'_>,
    entity: &Arc<EntityDescriptor>,
    wheres: &[Node],
) -> CompileResult<Option<Expr>> {
    if wheres.is_empty() {
        return Ok(None);
    }
    let table = table_of(entity)?.to_string();

    let mark = cx.mark();
    let (alias, filter, navs) = cx.scoped(Scope::Derived, |cx| {
        let alias = cx.resolve_alias(AliasKey::Primary)?;
        let env = Env::new().with(SOURCE, Fragment::Row(RowBinding::table(&alias, Arc::clone(entity))));
        let filter = WhereVisitor::new("WHERE").conjunction(cx, &env, wheres)?;
        Ok((alias, filter, cx.take_navigation_joins()))
    })?;

    if navs.is_empty() {
        cx.rollback(mark);
        let env = Env::new().with(SOURCE, Fragment::Row(RowBinding::table(&table, Arc::clone(entity))));
        return WhereVisitor::new("WHERE").conjunction(cx, &env, wheres);
    }

    log::debug!("target filter needs {} navigation joins; using a key subquery", navs.len());
    let keys: Vec<_> = entity.key_fields().map(|f| f.column.clone()).collect();
    if keys.is_empty() {
        return Err(CompileError::plan(format!(
            "'{}' declares no primary key to match navigating filters against",
            entity.name()
        )));
    }

    let source = TableRef::new(&table)
        .with_schema(entity.schema())
        .with_alias(&alias);
    let mut query = Query::new().from(source);
    for nav in navs {
        query = query.left_join(nav.table, nav.on);
    }
    if let Some(filter) = filter {
        query = query.filter(filter);
    }

    if !cx.dialect().subquery_can_read_target() {
        return Ok(Some(through_derived_keys(&table, &alias, &keys, query)));
    }

    let expr = match keys.as_slice() {
        [key] => Expr::InSubquery {
            expr: Box::new(table_col(&table, key)),
            subquery: Box::new(query.select(vec![SelectExpr::new(table_col(&alias, key))])),
            negated: false,
        },
        _ => {
            let mut query = query.select(vec![SelectExpr::new(lit_int(1))]);
            for key in &keys {
                query = query.filter(table_col(&alias, key).eq(table_col(&table, key)));
            }
            Expr::Exists {
                subquery: Box::new(query),
                negated: false,
            }
        }
    };
    Ok(Some(expr))
}

/// The target keys read through a derived table, for dialects that refuse a
/// subquery on the table being modified:
///
/// ```text
/// k IN (SELECT keys.k FROM (SELECT t0.k AS k FROM T t0 ...) AS keys)
/// EXISTS (SELECT 1 FROM (SELECT t0.k1 AS k1, ...) AS keys WHERE keys.k1 = T.k1 AND ...)
/// ```
fn through_derived_keys(table: &str, alias: &str, keys: &[String], query: Query) -> Expr {
    let inner = query.select(
        keys.iter()
            .map(|key| SelectExpr::new(table_col(alias, key)).with_alias(key))
            .collect(),
    );
    let outer = Query::new().from(Source::derived(inner, DERIVED_KEYS));
    match keys {
        [key] => Expr::InSubquery {
            expr: Box::new(table_col(table, key)),
            subquery: Box::new(outer.select(vec![SelectExpr::new(table_col(DERIVED_KEYS, key))])),
            negated: false,
        },
        _ => {
            let mut outer = outer.select(vec![SelectExpr::new(lit_int(1))]);
            for key in keys {
                outer = outer.filter(table_col(DERIVED_KEYS, key).eq(table_col(table, key)));
            }
            Expr::Exists {
                subquery: Box::new(outer),
                negated: false,
            }
        }
    }
}
