//! Plan reduction.
//!
//! Folds the flat operation sequence of a plan into a [`SelectTree`]. Every
//! lambda is normalized while folding: its parameters are replaced by the
//! tree's current shape, so the tree's expressions only reference source
//! variables:
//!
//! | Variable  | Binds to                                   |
//! |-----------|--------------------------------------------|
//! | `$0`      | the primary source row (table or subquery) |
//! | `$1`, ... | explicit join sources, in join order       |
//! | `$group`  | the grouping produced by `GroupBy`         |
//!
//! Operations that cannot be expressed in the current SELECT (paging a
//! distinct set, filtering a page, aggregating a grouping) freeze the tree
//! into a derived table and continue on a fresh tree above it.

use std::sync::Arc;

use super::{CompileError, CompileResult};
use crate::metadata::{EntityDescriptor, NavigationMember, Value};
use crate::plan::{
    AggregateKind, DeleteTarget, Direction, ErasedPlan, JoinKind, Lambda, Node, PlanOperation,
    UpdateTarget,
};

pub const SOURCE: &str = "$0";
pub const GROUP: &str = "$group";

/// FROM source of a tree.
#[derive(Debug, Clone)]
pub enum TreeSource {
    Table(Arc<EntityDescriptor>),
    Subquery(Box<SelectTree>),
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub source: TreeSource,
    /// Variable the joined rows bind to (`$1`, `$2`, ...).
    pub var: String,
    pub outer_key: Option<Node>,
    pub inner_key: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub key: Node,
    pub element: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeSpec {
    /// Navigation members from the root, e.g. `["Customer", "Address"]`.
    pub path: Vec<String>,
    pub filter: Option<Lambda>,
}

/// One SELECT statement.
#[derive(Debug, Clone)]
pub struct SelectTree {
    pub source: TreeSource,
    pub joins: Vec<JoinSpec>,
    pub wheres: Vec<Node>,
    pub group_by: Option<GroupSpec>,
    pub havings: Vec<Node>,
    pub order_by: Vec<(Node, Direction)>,
    /// Projection over the source variables.
    pub shape: Node,
    pub skip: u64,
    pub take: Option<u64>,
    pub distinct: bool,
    pub aggregate: Option<(AggregateKind, Option<Node>)>,
    pub unions: Vec<SelectTree>,
    pub includes: Vec<IncludeSpec>,
}

/// A reduced plan, by command kind.
#[derive(Debug, Clone)]
pub enum Reduced {
    Select(SelectTree),
    Insert {
        entity: Arc<EntityDescriptor>,
        rows: Vec<Vec<Value>>,
        capture_identity: bool,
    },
    Update {
        tree: SelectTree,
        target: UpdateTarget,
    },
    Delete {
        tree: SelectTree,
        target: DeleteTarget,
    },
}

fn source_var() -> Node {
    Node::Parameter(SOURCE.to_string())
}

impl SelectTree {
    /// Every row of `source`, unprojected.
    pub fn over(source: TreeSource) -> Self {
        Self {
            source,
            joins: Vec::new(),
            wheres: Vec::new(),
            group_by: None,
            havings: Vec::new(),
            order_by: Vec::new(),
            shape: source_var(),
            skip: 0,
            take: None,
            distinct: false,
            aggregate: None,
            unions: Vec::new(),
            includes: Vec::new(),
        }
    }

    /// Whether the projection is the source row itself.
    pub fn is_identity(&self) -> bool {
        matches!(&self.shape, Node::Parameter(name) if name == SOURCE)
    }

    pub fn is_paginated(&self) -> bool {
        self.skip > 0 || self.take.is_some()
    }

    fn is_grouping_shape(&self) -> bool {
        matches!(&self.shape, Node::Parameter(name) if name == GROUP)
    }

    /// A bare table read that can be joined directly.
    fn is_plain(&self) -> bool {
        self.is_identity()
            && self.joins.is_empty()
            && self.wheres.is_empty()
            && self.group_by.is_none()
            && self.order_by.is_empty()
            && !self.is_paginated()
            && !self.distinct
            && self.aggregate.is_none()
            && self.unions.is_empty()
            && matches!(self.source, TreeSource::Table(_))
    }

    /// Whether distinct, grouping or paging already closed this row set.
    fn is_closed(&self) -> bool {
        self.distinct || self.group_by.is_some() || self.is_paginated() || !self.unions.is_empty()
    }

    /// Entity of the `$0` row, when the source is one.
    pub fn source_entity(&self) -> Option<Arc<EntityDescriptor>> {
        match &self.source {
            TreeSource::Table(entity) => Some(Arc::clone(entity)),
            TreeSource::Subquery(inner) if inner.is_identity() => inner.source_entity(),
            TreeSource::Subquery(_) => None,
        }
    }

    fn validate(&self) -> CompileResult<()> {
        if self.skip > 0 && self.order_by.is_empty() {
            return Err(CompileError::plan("Skip requires an OrderBy"));
        }
        if self.group_by.is_some() && self.is_grouping_shape() {
            return Err(CompileError::plan(
                "a grouping must be projected with Select before it is read",
            ));
        }
        Ok(())
    }

    /// Freeze into a derived table. The ordering only survives where it
    /// decides which rows a page holds.
    fn freeze(mut self) -> CompileResult<SelectTree> {
        self.validate()?;
        if !self.is_paginated() {
            self.order_by.clear();
        }
        Ok(self)
    }

    /// Freeze into a derived table and start a new tree reading it.
    fn wrap(mut self) -> CompileResult<SelectTree> {
        let lifted = self.lifted_order();
        let includes = std::mem::take(&mut self.includes);
        log::debug!(
            "wrapping tree into a subquery ({} order keys lifted)",
            lifted.len()
        );
        let inner = self.freeze()?;
        let mut outer = SelectTree::over(TreeSource::Subquery(Box::new(inner)));
        outer.order_by = lifted;
        outer.includes = includes;
        Ok(outer)
    }

    /// The ordering rewritten against the projected columns.
    fn lifted_order(&self) -> Vec<(Node, Direction)> {
        if self.is_identity() {
            return self.order_by.clone();
        }
        self.order_by
            .iter()
            .filter_map(|(key, direction)| match lift_key(&self.shape, key) {
                Some(lifted) => Some((lifted, *direction)),
                None => {
                    log::debug!("order key {} is not projected; dropped at subquery boundary", key);
                    None
                }
            })
            .collect()
    }
}

/// `key` as a member chain over the projected row, if the shape exposes it.
fn lift_key(shape: &Node, key: &Node) -> Option<Node> {
    if let Some(path) = find_leaf(shape, key) {
        return Some(path.into_iter().fold(source_var(), |target, member| Node::Member {
            target: Box::new(target),
            member,
        }));
    }
    match key {
        Node::Member { target, member } => lift_key(shape, target).map(|t| Node::Member {
            target: Box::new(t),
            member: member.clone(),
        }),
        _ => None,
    }
}

fn find_leaf(shape: &Node, key: &Node) -> Option<Vec<String>> {
    if shape == key {
        return Some(Vec::new());
    }
    let members = match shape {
        Node::New { members, .. } => members,
        Node::Init { bindings, .. } => bindings,
        _ => return None,
    };
    members.iter().find_map(|(name, node)| {
        find_leaf(node, key).map(|mut path| {
            path.insert(0, name.clone());
            path
        })
    })
}

// =============================================================================
// Substitution
// =============================================================================

/// Replace lambda parameters by the nodes they stand for. Member access on
/// a record literal collapses to the member's node.
pub fn substitute(node: &Node, bindings: &[(&str, &Node)]) -> Node {
    match node {
        Node::Parameter(name) => bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, bound)| (*bound).clone())
            .unwrap_or_else(|| node.clone()),
        Node::Member { target, member } => {
            let target = substitute(target, bindings);
            let members = match &target {
                Node::New { members, .. } => Some(members),
                Node::Init { bindings, .. } => Some(bindings),
                _ => None,
            };
            if let Some(found) = members.and_then(|m| m.iter().find(|(n, _)| n == member)) {
                return found.1.clone();
            }
            Node::Member {
                target: Box::new(target),
                member: member.clone(),
            }
        }
        Node::Call {
            target,
            method,
            args,
        } => Node::Call {
            target: target.as_ref().map(|t| Box::new(substitute(t, bindings))),
            method: method.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        Node::Unary { op, operand } => Node::Unary {
            op: *op,
            operand: Box::new(substitute(operand, bindings)),
        },
        Node::Binary { op, left, right } => Node::Binary {
            op: *op,
            left: Box::new(substitute(left, bindings)),
            right: Box::new(substitute(right, bindings)),
        },
        Node::Conditional {
            test,
            if_true,
            if_false,
        } => Node::Conditional {
            test: Box::new(substitute(test, bindings)),
            if_true: Box::new(substitute(if_true, bindings)),
            if_false: Box::new(substitute(if_false, bindings)),
        },
        Node::New { type_name, members } => Node::New {
            type_name: type_name.clone(),
            members: members
                .iter()
                .map(|(n, m)| (n.clone(), substitute(m, bindings)))
                .collect(),
        },
        Node::Init {
            type_name,
            bindings: members,
        } => Node::Init {
            type_name: type_name.clone(),
            bindings: members
                .iter()
                .map(|(n, m)| (n.clone(), substitute(m, bindings)))
                .collect(),
        },
        Node::Index { target, index } => Node::Index {
            target: Box::new(substitute(target, bindings)),
            index: Box::new(substitute(index, bindings)),
        },
        Node::Lambda(lambda) => {
            // nested parameters shadow outer bindings
            let visible: Vec<(&str, &Node)> = bindings
                .iter()
                .filter(|(name, _)| !lambda.params.iter().any(|p| p == name))
                .copied()
                .collect();
            Node::Lambda(Box::new(Lambda::new(
                lambda.params.clone(),
                substitute(&lambda.body, &visible),
            )))
        }
        Node::Constant(_) | Node::List(_) | Node::Captured { .. } => node.clone(),
    }
}

/// The body of `lambda` with its parameters bound positionally to `args`.
fn apply_lambda(lambda: &Lambda, args: &[&Node]) -> Node {
    let bindings: Vec<(&str, &Node)> = lambda
        .params
        .iter()
        .map(String::as_str)
        .zip(args.iter().copied())
        .collect();
    substitute(&lambda.body, &bindings)
}

// =============================================================================
// Reduction
// =============================================================================

/// Reduce a plan into its command form.
pub fn reduce(plan: &ErasedPlan) -> CompileResult<Reduced> {
    let ops = plan.operations();
    if let Some(pos) = ops.iter().position(|op| op.is_terminal()) {
        if pos + 1 != ops.len() {
            return Err(CompileError::plan(format!(
                "{} must be the last operation",
                ops[pos].name()
            )));
        }
    }

    let root = plan.root();
    let Some((last, prefix)) = ops.split_last() else {
        return Ok(Reduced::Select(finalize(SelectTree::over(TreeSource::Table(root)))?));
    };

    match last {
        PlanOperation::Insert {
            rows,
            capture_identity,
        } => {
            if let Some(op) = prefix.first() {
                return Err(CompileError::plan(format!(
                    "Insert cannot follow {}",
                    op.name()
                )));
            }
            Ok(Reduced::Insert {
                entity: root,
                rows: rows.clone(),
                capture_identity: *capture_identity,
            })
        }
        PlanOperation::Update(target) => Ok(Reduced::Update {
            tree: filter_only(root, prefix, "Update")?,
            target: target.clone(),
        }),
        PlanOperation::Delete(target) => Ok(Reduced::Delete {
            tree: filter_only(root, prefix, "Delete")?,
            target: target.clone(),
        }),
        _ => Ok(Reduced::Select(finalize(reduce_select(root, &ops)?)?)),
    }
}

/// UPDATE and DELETE take their row set from Where operations only.
fn filter_only(root: Arc<EntityDescriptor>, ops: &[&PlanOperation], command: &str) -> CompileResult<SelectTree> {
    let mut tree = SelectTree::over(TreeSource::Table(root));
    for op in ops {
        match op {
            PlanOperation::Where(predicate) => {
                let node = apply_lambda(predicate, &[&tree.shape]);
                tree.wheres.push(node);
            }
            other => {
                return Err(CompileError::plan(format!(
                    "{} cannot follow {}",
                    command,
                    other.name()
                )))
            }
        }
    }
    Ok(tree)
}

fn reduce_select(root: Arc<EntityDescriptor>, ops: &[&PlanOperation]) -> CompileResult<SelectTree> {
    let mut tree = SelectTree::over(TreeSource::Table(root));
    for op in ops {
        tree = apply(tree, op)?;
    }
    Ok(tree)
}

fn apply(mut tree: SelectTree, op: &PlanOperation) -> CompileResult<SelectTree> {
    if !tree.unions.is_empty() && !matches!(op, PlanOperation::Union(_)) {
        tree = tree.wrap()?;
    }

    match op {
        PlanOperation::Where(predicate) => {
            if tree.is_paginated() {
                tree = tree.wrap()?;
            }
            let node = apply_lambda(predicate, &[&tree.shape]);
            if tree.group_by.is_some() {
                tree.havings.push(node);
            } else {
                tree.wheres.push(node);
            }
        }

        PlanOperation::Select(projection) => {
            if tree.distinct {
                tree = tree.wrap()?;
            }
            if !tree.includes.is_empty() {
                log::warn!(
                    "Include ignored: the result is projected into a different shape"
                );
                tree.includes.clear();
            }
            tree.shape = apply_lambda(projection, &[&tree.shape]);
        }

        PlanOperation::OrderBy { key, direction } => {
            if tree.is_paginated() {
                tree = tree.wrap()?;
            }
            let key = apply_lambda(key, &[&tree.shape]);
            tree.order_by = vec![(key, *direction)];
        }

        PlanOperation::ThenBy { key, direction } => {
            if tree.is_paginated() {
                tree = tree.wrap()?;
            }
            if tree.order_by.is_empty() {
                return Err(CompileError::plan("ThenBy requires a preceding OrderBy"));
            }
            let key = apply_lambda(key, &[&tree.shape]);
            tree.order_by.push((key, *direction));
        }

        PlanOperation::GroupBy { key, element } => {
            if tree.is_closed() {
                tree = tree.wrap()?;
            }
            let key = apply_lambda(key, &[&tree.shape]);
            let element = match element {
                Some(selector) => apply_lambda(selector, &[&tree.shape]),
                None => tree.shape.clone(),
            };
            tree.group_by = Some(GroupSpec { key, element });
            tree.shape = Node::Parameter(GROUP.to_string());
            tree.order_by.clear();
            tree.includes.clear();
        }

        PlanOperation::Join {
            kind,
            inner,
            outer_key,
            inner_key,
            result,
        } => {
            if tree.is_closed() {
                tree = tree.wrap()?;
            }
            tree = join(tree, *kind, inner, outer_key.as_ref(), inner_key.as_ref(), result)?;
        }

        PlanOperation::Skip(count) => {
            row_count("Skip", *count)?;
            if *count > 0 {
                if tree.is_closed() {
                    tree = tree.wrap()?;
                }
                tree.skip = *count;
            }
        }

        PlanOperation::Take(count) => {
            row_count("Take", *count)?;
            if *count > 0 {
                let merges = tree.skip > 0 && tree.take.is_none();
                if !merges && tree.is_closed() {
                    tree = tree.wrap()?;
                }
                tree.take = Some(*count);
            }
        }

        PlanOperation::Distinct => {
            if tree.is_closed() {
                tree = tree.wrap()?;
            }
            tree.distinct = true;
        }

        PlanOperation::Union(other) => {
            if !tree.order_by.is_empty() || tree.is_paginated() {
                tree = tree.wrap()?;
                tree.order_by.clear();
            }
            let mut sibling = reduce_select(other.root(), &other.operations())?;
            if !sibling.order_by.is_empty() || sibling.is_paginated() {
                sibling = sibling.wrap()?;
                sibling.order_by.clear();
            }
            sibling.validate()?;
            tree.unions.push(sibling);
        }

        PlanOperation::Include { path, filter } => {
            if !tree.is_identity() {
                log::warn!("Include({}) ignored under a projection", path);
            } else {
                tree.includes.push(IncludeSpec {
                    path: include_path(path)?,
                    filter: filter.clone(),
                });
            }
        }

        PlanOperation::Aggregate { kind, selector } => {
            if tree.is_closed() {
                tree = tree.wrap()?;
            }
            tree.includes.clear();
            let selector = match selector {
                Some(l) => Some(apply_lambda(l, &[&tree.shape])),
                None if kind.needs_selector() => {
                    if tree.is_identity() {
                        return Err(CompileError::plan(format!(
                            "{} over whole rows needs a selector",
                            kind.function_name()
                        )));
                    }
                    Some(tree.shape.clone())
                }
                None => None,
            };
            tree.aggregate = Some((*kind, selector));
        }

        PlanOperation::AsSubQuery => {
            tree = tree.wrap()?;
        }

        PlanOperation::Insert { .. } | PlanOperation::Update(_) | PlanOperation::Delete(_) => {
            return Err(CompileError::plan(format!(
                "{} cannot be combined with a query",
                op.name()
            )));
        }
    }
    Ok(tree)
}

/// Row counts must fit a signed 64-bit SQL integer.
fn row_count(operation: &str, count: u64) -> CompileResult<i64> {
    i64::try_from(count).map_err(|_| {
        CompileError::plan(format!("{} count {} is larger than {}", operation, count, i64::MAX))
    })
}

fn join(
    mut tree: SelectTree,
    kind: JoinKind,
    inner: &ErasedPlan,
    outer_key: Option<&Lambda>,
    inner_key: Option<&Lambda>,
    result: &Lambda,
) -> CompileResult<SelectTree> {
    let inner_tree = reduce_select(inner.root(), &inner.operations())?;
    let source = if inner_tree.is_plain() {
        TreeSource::Table(inner.root())
    } else {
        TreeSource::Subquery(Box::new(inner_tree.freeze()?))
    };

    let var = format!("${}", tree.joins.len() + 1);
    let inner_var = Node::Parameter(var.clone());
    let (outer_key, inner_key) = match (kind, outer_key, inner_key) {
        (JoinKind::Cross, _, _) => (None, None),
        (_, Some(o), Some(i)) => (
            Some(apply_lambda(o, &[&tree.shape])),
            Some(apply_lambda(i, &[&inner_var])),
        ),
        _ => return Err(CompileError::plan("an equi-join needs both key selectors")),
    };

    tree.shape = apply_lambda(result, &[&tree.shape, &inner_var]);
    tree.includes.clear();
    tree.joins.push(JoinSpec {
        kind,
        source,
        var,
        outer_key,
        inner_key,
    });
    Ok(tree)
}

/// `o => o.Customer.Address` as `["Customer", "Address"]`.
fn include_path(path: &Lambda) -> CompileResult<Vec<String>> {
    let mut members = Vec::new();
    let mut node = &path.body;
    loop {
        match node {
            Node::Member { target, member } => {
                members.push(member.clone());
                node = target;
            }
            Node::Parameter(name) if Some(name.as_str()) == path.param() && !members.is_empty() => {
                members.reverse();
                return Ok(members);
            }
            _ => {
                return Err(CompileError::plan(format!(
                    "Include path must be a member chain, got {}",
                    path
                )))
            }
        }
    }
}

// =============================================================================
// Finalization
// =============================================================================

/// Validate the outermost tree and move collection fan-out above paging:
/// a page of parents is selected first, then its children are joined.
fn finalize(tree: SelectTree) -> CompileResult<SelectTree> {
    tree.validate()?;
    if !tree.is_paginated() || !fans_out(&tree) {
        return Ok(tree);
    }
    if !tree.joins.is_empty() || tree.group_by.is_some() {
        return Err(CompileError::plan(
            "collections cannot be loaded into a paged join or grouping",
        ));
    }

    log::debug!("paging parents in a subquery before joining collections");
    let mut inner = tree;
    let shape = std::mem::replace(&mut inner.shape, source_var());
    let includes = std::mem::take(&mut inner.includes);
    let order_by = inner.order_by.clone();

    let mut outer = SelectTree::over(TreeSource::Subquery(Box::new(inner)));
    outer.shape = shape;
    outer.includes = includes;
    outer.order_by = order_by;
    Ok(outer)
}

/// Whether the projection or an include reaches a collection navigation.
fn fans_out(tree: &SelectTree) -> bool {
    let Some(entity) = tree.source_entity() else {
        return false;
    };
    let include_fans_out = tree.includes.iter().any(|include| {
        let mut current = Arc::clone(&entity);
        for member in &include.path {
            match current.navigation(member) {
                Some(nav) if nav.is_collection() => return true,
                Some(nav) => current = nav.target.resolve(),
                None => return false,
            }
        }
        false
    });
    include_fans_out || collection_in(&tree.shape, &entity)
}

fn collection_in(node: &Node, root: &EntityDescriptor) -> bool {
    match node {
        Node::Member { target, .. } => {
            matches!(chain_navigation(node, root), Some(nav) if nav.is_collection())
                || collection_in(target, root)
        }
        // `o.Lines.Count()` is a correlated subquery, not a join
        Node::Call { target, args, .. } => {
            let target_fans_out = match target.as_deref() {
                Some(Node::Member { target, .. }) => collection_in(target, root),
                Some(other) => collection_in(other, root),
                None => false,
            };
            target_fans_out || args.iter().any(|a| collection_in(a, root))
        }
        Node::New { members, .. } => members.iter().any(|(_, m)| collection_in(m, root)),
        Node::Init { bindings, .. } => bindings.iter().any(|(_, m)| collection_in(m, root)),
        Node::Unary { operand, .. } => collection_in(operand, root),
        Node::Binary { left, right, .. } => collection_in(left, root) || collection_in(right, root),
        Node::Conditional {
            test,
            if_true,
            if_false,
        } => collection_in(test, root) || collection_in(if_true, root) || collection_in(if_false, root),
        Node::Index { target, .. } => collection_in(target, root),
        Node::Lambda(_)
        | Node::Constant(_)
        | Node::List(_)
        | Node::Parameter(_)
        | Node::Captured { .. } => false,
    }
}

/// The navigation a member chain from `$0` ends on.
fn chain_navigation(node: &Node, root: &EntityDescriptor) -> Option<NavigationMember> {
    let Node::Member { target, member } = node else {
        return None;
    };
    match target.as_ref() {
        Node::Parameter(name) if name == SOURCE => root.navigation(member).cloned(),
        inner => {
            let parent = chain_navigation(inner, root)?;
            if parent.is_collection() {
                return None;
            }
            parent.target.resolve().navigation(member).cloned()
        }
    }
}
