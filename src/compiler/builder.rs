//! Compilation state shared by the assembler and the clause visitors.

use std::cell::Cell;
use std::mem;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::alias::{AliasKey, AliasResolver};
use super::CompileResult;
use crate::metadata::{DataType, Value};
use crate::sql::{Expr, ExprExt, Literal, SqlDialect, TableRef};

/// A bound parameter of a compiled command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Value,
    /// Declared type of the column the value is compared with or assigned
    /// to, falling back to the value's own type.
    pub data_type: Option<DataType>,
}

/// A LEFT JOIN synthesized for a navigation path.
#[derive(Debug, Clone)]
pub struct NavJoin {
    pub path: String,
    pub alias: String,
    pub table: TableRef,
    pub on: Expr,
}

/// Which kind of nested SELECT a [`FragmentBuilder::scoped`] call opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A derived table; alias numbering restarts.
    Derived,
    /// A correlated subquery; aliases come from the shared `s` sequence.
    Correlated,
}

/// Checkpoint for [`FragmentBuilder::rollback`].
#[derive(Debug)]
pub struct Mark {
    params: usize,
    navs: usize,
    has_many: bool,
    aliases: AliasResolver,
    alias_position: usize,
    subqueries: usize,
}

/// Accumulates parameters, aliases and pending navigation joins while one
/// command is compiled.
pub struct FragmentBuilder<'d> {
    dialect: &'d dyn SqlDialect,
    parameterize: bool,
    alias_prefix: String,
    params: Vec<Parameter>,
    aliases: AliasResolver,
    navs: Vec<NavJoin>,
    has_many: bool,
    subqueries: Rc<Cell<usize>>,
}

impl<'d> FragmentBuilder<'d> {
    pub fn new(dialect: &'d dyn SqlDialect, parameterize: bool, alias_prefix: &str) -> Self {
        Self {
            dialect,
            parameterize,
            alias_prefix: alias_prefix.to_string(),
            params: Vec::new(),
            aliases: AliasResolver::new(alias_prefix),
            navs: Vec::new(),
            has_many: false,
            subqueries: Rc::new(Cell::new(0)),
        }
    }

    pub fn dialect(&self) -> &'d dyn SqlDialect {
        self.dialect
    }

    pub fn parameterize(&self) -> bool {
        self.parameterize
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    /// Bind a value: a parameter when parameterizing, else an inline literal.
    /// Values without a literal form are always parameters.
    pub fn bind(&mut self, value: Value, data_type: Option<DataType>) -> Expr {
        if !self.parameterize {
            if let Some(literal) = inline_literal(&value) {
                return literal;
            }
        }
        self.bind_param(value, data_type)
    }

    /// Bind a value as a parameter regardless of mode.
    pub fn bind_param(&mut self, value: Value, data_type: Option<DataType>) -> Expr {
        let data_type = data_type.or_else(|| value.data_type());
        self.params.push(Parameter { value, data_type });
        Expr::Param(self.params.len() - 1)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    pub fn into_parameters(self) -> Vec<Parameter> {
        self.params
    }

    // -------------------------------------------------------------------------
    // Aliases and navigation joins
    // -------------------------------------------------------------------------

    pub fn resolve_alias(&mut self, key: AliasKey) -> CompileResult<String> {
        self.aliases.resolve(key)
    }

    /// Alias of the join for `path`, registering it on first use. `make`
    /// receives the new alias and returns the joined table and condition.
    pub fn navigation_join(
        &mut self,
        path: &str,
        make: impl FnOnce(&str) -> CompileResult<(TableRef, Expr)>,
    ) -> CompileResult<String> {
        if let Some(existing) = self.navs.iter().find(|j| j.path == path) {
            return Ok(existing.alias.clone());
        }
        let alias = self.aliases.resolve(AliasKey::Path(path.to_string()))?;
        let (table, on) = make(&alias)?;
        log::debug!("navigation join {} as {}", path, alias);
        self.navs.push(NavJoin {
            path: path.to_string(),
            alias: alias.clone(),
            table,
            on,
        });
        Ok(alias)
    }

    /// AND an extra term into a registered join's condition.
    pub fn extend_join_condition(&mut self, path: &str, extra: Expr) {
        if let Some(join) = self.navs.iter_mut().find(|j| j.path == path) {
            let on = mem::replace(&mut join.on, Expr::Raw(String::new()));
            join.on = on.and(extra);
        }
    }

    pub fn has_navigation_joins(&self) -> bool {
        !self.navs.is_empty()
    }

    /// Drain the joins registered in the current scope, in registration order.
    pub fn take_navigation_joins(&mut self) -> Vec<NavJoin> {
        mem::take(&mut self.navs)
    }

    pub fn mark_has_many(&mut self) {
        self.has_many = true;
    }

    /// Whether a collection navigation fans out the current scope's rows.
    pub fn has_many(&self) -> bool {
        self.has_many
    }

    // -------------------------------------------------------------------------
    // Scopes and checkpoints
    // -------------------------------------------------------------------------

    /// Run `f` inside a nested SELECT scope with its own aliases and pending
    /// joins. Parameters stay shared with the enclosing command.
    pub fn scoped<R>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> CompileResult<R>,
    ) -> CompileResult<R> {
        let fresh = match scope {
            Scope::Derived => AliasResolver::new(&self.alias_prefix),
            Scope::Correlated => AliasResolver::sharing("s", Rc::clone(&self.subqueries)),
        };
        let aliases = mem::replace(&mut self.aliases, fresh);
        let navs = mem::take(&mut self.navs);
        let has_many = mem::replace(&mut self.has_many, false);

        let result = f(self);

        self.aliases = aliases;
        self.navs = navs;
        self.has_many = has_many;
        result
    }

    pub fn mark(&self) -> Mark {
        Mark {
            params: self.params.len(),
            navs: self.navs.len(),
            has_many: self.has_many,
            aliases: self.aliases.clone(),
            alias_position: self.aliases.position(),
            subqueries: self.subqueries.get(),
        }
    }

    /// Forget everything recorded since `mark`.
    pub fn rollback(&mut self, mark: Mark) {
        self.params.truncate(mark.params);
        self.navs.truncate(mark.navs);
        self.has_many = mark.has_many;
        self.aliases.rewind(mark.aliases, mark.alias_position);
        self.subqueries.set(mark.subqueries);
    }
}

fn inline_literal(value: &Value) -> Option<Expr> {
    let literal = match value {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Int(n) => Literal::Int(*n),
        Value::Float(x) if x.is_finite() => Literal::Float(*x),
        Value::Decimal(s) => Literal::Decimal(s.clone()),
        Value::Text(s) => Literal::String(s.clone()),
        Value::Date(s) => Literal::Date(s.clone()),
        Value::Timestamp(s) => Literal::Timestamp(s.clone()),
        Value::Float(_) | Value::Bytes(_) => return None,
    };
    Some(Expr::Literal(literal))
}
