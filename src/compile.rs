//! End-to-end compilation from a query plan to an executable command.
//!
//! This module provides the high-level API:
//!
//! ```text
//! QueryPlan → reduce → assemble → tokens → SQL + ordered parameters + shape
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::compile::{compile, CompileOptions};
//! use quarry::plan::{lambda, param, NodeExt, QueryPlan};
//! use quarry::sql::Dialect;
//!
//! let plan = QueryPlan::<Order>::new()
//!     .filter(lambda("o", param("o").member("Total").gt(100)))
//!     .order_by(lambda("o", param("o").member("Id")))
//!     .take(10);
//!
//! let options = CompileOptions::default().with_dialect(Dialect::Postgres);
//! let command = compile(&plan, &options)?;
//! println!("{}", command.sql);
//! ```

use serde::Serialize;

use crate::compiler::{
    compile_command, reduce, CommandKind, CompileError, CompileResult, Parameter, Reduced,
    ResultShape,
};
use crate::config::{CompilerSettings, SettingsError};
use crate::materialize::{self, Materialized, MaterializeResult, ResultCursor, Scalars};
use crate::metadata::{Entity, FromValue};
use crate::plan::{ErasedPlan, QueryPlan};
use crate::sql::{Dialect, SqlDialect};

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,

    /// Bind constants as parameters. When off, constants that have a safe
    /// literal form are inlined.
    pub parameterize: bool,

    /// Prefix of generated table aliases.
    pub alias_prefix: String,

    /// Break clauses onto separate lines.
    pub pretty: bool,

    /// Honor `insert_returning_identity`.
    pub identity_capture: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        let defaults = CompilerSettings::default();
        Self {
            dialect: Dialect::default(),
            parameterize: defaults.parameterize,
            alias_prefix: defaults.alias_prefix,
            pretty: defaults.pretty,
            identity_capture: defaults.identity_capture,
        }
    }
}

impl CompileOptions {
    /// Options from a loaded settings file.
    pub fn from_settings(settings: &CompilerSettings) -> Result<Self, SettingsError> {
        Ok(Self {
            dialect: settings.resolved_dialect()?,
            parameterize: settings.parameterize,
            alias_prefix: settings.alias_prefix.clone(),
            pretty: settings.pretty,
            identity_capture: settings.identity_capture,
        })
    }

    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Inline constants as literals instead of binding parameters.
    pub fn inline_literals(mut self) -> Self {
        self.parameterize = false;
        self
    }

    pub fn with_alias_prefix(mut self, prefix: &str) -> Self {
        self.alias_prefix = prefix.to_string();
        self
    }

    /// Render on a single line.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn without_identity_capture(mut self) -> Self {
        self.identity_capture = false;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A compiled command, ready to hand to an executor.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledCommand {
    /// The generated SQL string.
    pub sql: String,

    /// Parameters in placeholder order. A value bound once but referenced
    /// twice appears twice.
    pub parameters: Vec<Parameter>,

    pub kind: CommandKind,

    /// Column layout of the rows the command returns.
    pub shape: ResultShape,

    /// Name of the dialect used for generation.
    pub dialect: &'static str,
}

impl CompiledCommand {
    /// Whether the command produces rows to materialize.
    pub fn returns_rows(&self) -> bool {
        !self.shape.columns.is_empty()
    }

    /// Read the command's result rows as objects of type `T`.
    pub fn materialize<T: Entity, C: ResultCursor>(
        &self,
        cursor: C,
    ) -> MaterializeResult<Materialized<T, C>> {
        materialize::materialize(cursor, &self.shape)
    }

    /// Read the command's single-column result rows.
    pub fn scalars<V: FromValue, C: ResultCursor>(
        &self,
        cursor: C,
    ) -> MaterializeResult<Scalars<V, C>> {
        materialize::materialize_scalars(cursor, &self.shape)
    }

    /// JSON form for an out-of-process executor.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Compilation Functions
// ============================================================================

/// Compile a plan to a command.
///
/// Compilation never mutates the plan; the same plan compiled twice with
/// the same options yields identical output.
pub fn compile<T>(plan: &QueryPlan<T>, options: &CompileOptions) -> CompileResult<CompiledCommand> {
    compile_erased(plan.erased(), options)
}

/// Compile a type-erased plan.
pub fn compile_erased(plan: &ErasedPlan, options: &CompileOptions) -> CompileResult<CompiledCommand> {
    let mut reduced = reduce(plan)?;
    if !options.identity_capture {
        if let Reduced::Insert {
            capture_identity, ..
        } = &mut reduced
        {
            *capture_identity = false;
        }
    }

    let dialect: &dyn SqlDialect = &options.dialect;
    let parts = compile_command(&reduced, dialect, options.parameterize, &options.alias_prefix)?;
    let rendered = parts.tokens.render(dialect, options.pretty);

    let parameters = rendered
        .parameter_order
        .iter()
        .map(|&id| {
            parts
                .parameters
                .get(id)
                .cloned()
                .ok_or_else(|| CompileError::plan(format!("parameter #{} was never bound", id)))
        })
        .collect::<CompileResult<Vec<_>>>()?;

    log::debug!(
        "compiled {} plan of {} operations for {}",
        plan.root().name(),
        plan.len(),
        dialect.name()
    );

    Ok(CompiledCommand {
        sql: rendered.sql,
        parameters,
        kind: parts.kind,
        shape: parts.shape,
        dialect: dialect.name(),
    })
}

// ============================================================================
// Tests
// ============================================================================
