//! SELECT list projection.
//!
//! Flattens the visited projection into output columns and records a
//! [`ResultShape`] describing how the materializer rebuilds objects:
//!
//! ```text
//! o => new { o.Id, Cust = o.Customer }
//!
//!   Id | split | Id1 | Name          columns
//!   ── root ──┘└── nav 0 "Cust" ──┘  navigations (split guards nav 0)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::{as_value, ClauseVisitor, Env, Fragment, RowBinding, Scalar, WhereVisitor};
use crate::compiler::builder::FragmentBuilder;
use crate::compiler::navigation;
use crate::compiler::reducer::IncludeSpec;
use crate::compiler::shape::{ColumnKind, ResultShape, ShapeBuilder};
use crate::compiler::{CompileError, CompileResult};
use crate::metadata::{DataType, EntityDescriptor};
use crate::plan::Node;
use crate::sql::{lit_int, Expr, ExprExt, SelectExpr};

/// How an enclosing query reads this projection's output columns once the
/// SELECT becomes a derived table.
#[derive(Debug, Clone)]
pub enum Layout {
    Column(String, Option<DataType>),
    Row {
        entity: Arc<EntityDescriptor>,
        columns: HashMap<String, String>,
    },
    Record(Vec<(String, Layout)>),
    /// Not addressable from outside (collections).
    Opaque,
}

impl Layout {
    /// Bind the layout to a derived-table alias.
    pub fn rebind(&self, alias: &str) -> CompileResult<Fragment> {
        self.rebind_at(alias, alias)?
            .ok_or_else(|| CompileError::plan("a collection projection cannot be read from a derived table"))
    }

    fn rebind_at(&self, alias: &str, path: &str) -> CompileResult<Option<Fragment>> {
        Ok(match self {
            Layout::Column(output, data_type) => Some(Fragment::Scalar(Scalar::new(
                Expr::Column {
                    table: Some(alias.to_string()),
                    column: output.clone(),
                },
                *data_type,
            ))),
            Layout::Row { entity, columns } => Some(Fragment::Row(RowBinding {
                alias: Some(alias.to_string()),
                entity: Arc::clone(entity),
                path: path.to_string(),
                columns: Some(Arc::new(columns.clone())),
                optional: false,
            })),
            Layout::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, layout) in fields {
                    let nested = format!("{}.{}", path, name);
                    if let Some(fragment) = layout.rebind_at(alias, &nested)? {
                        out.push((name.clone(), fragment));
                    }
                }
                Some(Fragment::Record(out))
            }
            Layout::Opaque => None,
        })
    }
}

/// A compiled SELECT list.
#[derive(Debug, Clone)]
pub struct Projection {
    pub select: Vec<SelectExpr>,
    pub shape: ResultShape,
    pub layout: Layout,
    /// Identity of the root object, appended to ORDER BY when the rows
    /// fan out through a collection.
    pub root_key: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectVisitor;

impl SelectVisitor {
    pub fn new() -> Self {
        Self
    }

    /// Project `node`, eagerly loading `includes` when the projection is
    /// the source row itself. `root` names the root object in navigation
    /// paths.
    pub fn project(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        node: &Node,
        includes: &[IncludeSpec],
        root: &str,
    ) -> CompileResult<Projection> {
        let fragment = self.visit(cx, env, node)?;
        let mut p = Projector::default();

        let (layout, row_key) = match fragment {
            Fragment::Scalar(s) => {
                let member = match &s.expr {
                    Expr::Column { column, .. } => column.clone(),
                    _ => "Value".to_string(),
                };
                p.shape.mark_scalar();
                (p.scalar(s, &member, None), None)
            }
            Fragment::Row(row) => {
                let (layout, keys) = p.row(&row, None)?;
                for include in includes {
                    p.include(cx, env, &row, include, root)?;
                }
                (layout, Some((keys, row.key_exprs()?)))
            }
            Fragment::Record(fields) => {
                let mut members = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    let layout = p.member(cx, &name, field, root, None)?;
                    members.push((name, layout));
                }
                (Layout::Record(members), None)
            }
            Fragment::Group(_) => {
                return Err(CompileError::plan(
                    "a grouping must be projected with Select before it is read",
                ))
            }
            Fragment::Collection(_) | Fragment::List(_) => {
                return Err(CompileError::plan(format!("cannot project {} as a result row", node)))
            }
        };

        let root_key = if cx.has_many() {
            let (positions, exprs) = match row_key {
                Some((positions, exprs)) if !positions.is_empty() => (positions, exprs),
                _ => p.hidden_key(env)?,
            };
            p.shape.set_root_key(positions);
            exprs
        } else {
            Vec::new()
        };

        Ok(Projection {
            select: p.select,
            shape: p.shape.finish(),
            layout,
            root_key,
        })
    }
}

impl ClauseVisitor for SelectVisitor {
    fn clause(&self) -> &'static str {
        "SELECT"
    }
}

#[derive(Default)]
struct Projector {
    shape: ShapeBuilder,
    select: Vec<SelectExpr>,
    /// Navigations already projected, by canonical path.
    joined: HashMap<String, (usize, RowBinding)>,
}

impl Projector {
    fn column(
        &mut self,
        expr: Expr,
        name: &str,
        alias: Option<&str>,
        member: &str,
        owner: Option<usize>,
        kind: ColumnKind,
    ) -> (usize, String) {
        let (index, output) = self.shape.push(name, alias, member, owner, kind);
        self.select.push(SelectExpr::new(expr).with_alias(&output));
        (index, output)
    }

    fn scalar(&mut self, s: Scalar, member: &str, owner: Option<usize>) -> Layout {
        let (name, alias) = match &s.expr {
            Expr::Column { table, column } => (column.clone(), table.clone()),
            _ => (member.to_string(), None),
        };
        let data_type = s.data_type;
        let (_, output) = self.column(
            as_value(s),
            &name,
            alias.as_deref(),
            member,
            owner,
            ColumnKind::Member,
        );
        Layout::Column(output, data_type)
    }

    /// Every mapped field of `row`. Returns the layout and the positions of
    /// the key columns.
    fn row(&mut self, row: &RowBinding, owner: Option<usize>) -> CompileResult<(Layout, Vec<usize>)> {
        let mut columns = HashMap::new();
        let mut keys = Vec::new();
        for field in row.entity.fields() {
            let expr = row.member_expr(&field.member)?;
            let (index, output) = self.column(
                expr,
                &field.column,
                row.alias.as_deref(),
                &field.member,
                owner,
                ColumnKind::Member,
            );
            if field.is_key {
                keys.push(index);
            }
            columns.insert(field.member.clone(), output);
        }
        let layout = Layout::Row {
            entity: Arc::clone(&row.entity),
            columns,
        };
        Ok((layout, keys))
    }

    /// `CASE WHEN key IS NOT NULL THEN 1 END`, placed before an optional
    /// child's columns. Keyless children have no split column.
    fn split(&mut self, row: &RowBinding, owner: Option<usize>) -> CompileResult<Option<usize>> {
        let Some(key) = row.key_exprs()?.into_iter().next() else {
            return Ok(None);
        };
        let expr = Expr::Case {
            operand: None,
            when_clauses: vec![(key.is_not_null(), lit_int(1))],
            else_clause: None,
        };
        let (index, _) = self.column(expr, "split", None, "split", owner, ColumnKind::Split);
        Ok(Some(index))
    }

    /// Project a joined child row as the nested object `member`.
    fn child(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        child: &RowBinding,
        member: &str,
        path: &str,
        owner: Option<usize>,
        collection: bool,
    ) -> CompileResult<(usize, Layout)> {
        if collection {
            if !child.entity.has_key() {
                return Err(CompileError::plan(format!(
                    "collection '{}' of keyless entity '{}' cannot be projected",
                    path,
                    child.entity.name()
                )));
            }
            cx.mark_has_many();
            let index = self.shape.begin_navigation(path, member, owner, None, true);
            let (_, keys) = self.row(child, Some(index))?;
            self.shape.finish_navigation(index, keys);
            Ok((index, Layout::Opaque))
        } else {
            let split = if child.optional {
                self.split(child, owner)?
            } else {
                None
            };
            let index = self.shape.begin_navigation(path, member, owner, split, false);
            let (layout, _) = self.row(child, Some(index))?;
            self.shape.finish_navigation(index, Vec::new());
            Ok((index, layout))
        }
    }

    /// One member of a record projection.
    fn member(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        name: &str,
        fragment: Fragment,
        parent_path: &str,
        owner: Option<usize>,
    ) -> CompileResult<Layout> {
        let path = format!("{}.{}", parent_path, name);
        match fragment {
            Fragment::Scalar(s) => Ok(self.scalar(s, name, owner)),
            Fragment::Row(row) => Ok(self.child(cx, &row, name, &path, owner, false)?.1),
            Fragment::Collection(collection) => {
                let child = navigation::join_navigation(cx, &collection.parent, &collection.navigation)?;
                Ok(self.child(cx, &child, name, &path, owner, true)?.1)
            }
            Fragment::Record(fields) => {
                let index = self.shape.begin_navigation(&path, name, owner, None, false);
                let mut members = Vec::with_capacity(fields.len());
                for (field_name, field) in fields {
                    let layout = self.member(cx, &field_name, field, &path, Some(index))?;
                    members.push((field_name, layout));
                }
                self.shape.finish_navigation(index, Vec::new());
                Ok(Layout::Record(members))
            }
            Fragment::Group(_) | Fragment::List(_) => {
                Err(CompileError::plan(format!("member '{}' cannot be projected", path)))
            }
        }
    }

    /// Join and project one include path, segment by segment.
    fn include(
        &mut self,
        cx: &mut FragmentBuilder<'_>,
        env: &Env,
        root_row: &RowBinding,
        include: &IncludeSpec,
        root: &str,
    ) -> CompileResult<()> {
        let mut row = root_row.clone();
        let mut owner = None;
        let mut path = root.to_string();

        for segment in &include.path {
            let nav = row
                .entity
                .navigation(segment)
                .cloned()
                .ok_or_else(|| CompileError::UnknownMember {
                    entity: row.entity.name().to_string(),
                    member: segment.clone(),
                })?;
            path = format!("{}.{}", path, segment);

            let existing = self.joined.get(&path).cloned();
            let (index, child) = match existing {
                Some(found) => found,
                None => {
                    let child = navigation::join_navigation(cx, &row, &nav)?;
                    let (index, _) = self.child(cx, &child, segment, &path, owner, nav.is_collection())?;
                    self.joined.insert(path.clone(), (index, child.clone()));
                    (index, child)
                }
            };
            owner = Some(index);
            row = child;
        }

        if let Some(filter) = &include.filter {
            let param = filter.param().unwrap_or_default();
            let scope = env.bind(param, Fragment::Row(row.clone()));
            let predicate = WhereVisitor::new("INCLUDE").predicate(cx, &scope, &filter.body)?;
            cx.extend_join_condition(&row.path, predicate);
        }
        Ok(())
    }

    /// Hidden key columns of the source row, for projections that fan out
    /// without exposing the root identity.
    fn hidden_key(&mut self, env: &Env) -> CompileResult<(Vec<usize>, Vec<Expr>)> {
        let source = match env.get("$0") {
            Some(Fragment::Row(row)) if row.entity.has_key() => row.clone(),
            _ => {
                return Err(CompileError::plan(
                    "a projection with collections needs a keyed source row",
                ))
            }
        };
        let mut positions = Vec::new();
        let mut exprs = Vec::new();
        for field in source.entity.key_fields() {
            let expr = source.member_expr(&field.member)?;
            let (index, _) = self.column(
                expr.clone(),
                &field.column,
                source.alias.as_deref(),
                &field.member,
                None,
                ColumnKind::Key,
            );
            positions.push(index);
            exprs.push(expr);
        }
        Ok((positions, exprs))
    }
}
