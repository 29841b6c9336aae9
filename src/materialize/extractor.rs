//! Per-shape extraction plans.
//!
//! Resolving which row position feeds which slot of which descriptor is done
//! once per `(root type, result shape)` and cached for the process:
//!
//! ```text
//! (TypeId, ResultShape) ──► Extractor
//!                             ├─ root:        [(pos, slot)..]
//!                             └─ navigations: [member, parent, split,
//!                                              key columns, (pos, slot)..]
//! ```

use std::any::TypeId;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use super::error::{MaterializeError, MaterializeResult};
use crate::compiler::{ColumnKind, ResultShape};
use crate::metadata::{EntityDescriptor, KeyPart, Value};

static EXTRACTORS: LazyLock<DashMap<(TypeId, ResultShape), Arc<Extractor>>> =
    LazyLock::new(DashMap::new);

/// One row position read into one field slot.
#[derive(Debug, Clone)]
struct FieldSlot {
    position: usize,
    slot: usize,
    member: String,
    nullable: bool,
    default: Option<Value>,
}

/// The fields of one object type within a row.
#[derive(Debug, Clone)]
pub struct ObjectPlan {
    entity: Arc<EntityDescriptor>,
    fields: Vec<FieldSlot>,
}

impl ObjectPlan {
    fn new(entity: Arc<EntityDescriptor>) -> Self {
        Self {
            entity,
            fields: Vec::new(),
        }
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    fn bind(&mut self, position: usize, member: &str) -> MaterializeResult<()> {
        let (slot, field) = self.entity.field(member).ok_or_else(|| {
            MaterializeError::materialization(self.entity.name(), member, "not a mapped member")
        })?;
        self.fields.push(FieldSlot {
            position,
            slot,
            member: member.to_string(),
            nullable: field.nullable,
            default: field.default.clone(),
        });
        Ok(())
    }

    /// Slot values for this object. NULL in a non-nullable field takes the
    /// field default or fails.
    pub fn read(&self, row: &[Value]) -> MaterializeResult<Vec<(usize, Value)>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = row.get(field.position).cloned().unwrap_or(Value::Null);
            let value = match (value, &field.default) {
                (Value::Null, _) if field.nullable => Value::Null,
                (Value::Null, Some(default)) => default.clone(),
                (Value::Null, None) => {
                    return Err(MaterializeError::materialization(
                        self.entity.name(),
                        &field.member,
                        "NULL in a non-nullable column",
                    ))
                }
                (value, _) => value,
            };
            values.push((field.slot, value));
        }
        Ok(values)
    }
}

/// A nested object or collection attached to a parent object.
#[derive(Debug, Clone)]
pub struct NavigationPlan {
    pub member: String,
    /// `None` when the parent is the root object.
    pub parent: Option<usize>,
    pub object: ObjectPlan,
    pub split: Option<usize>,
    pub collection: bool,
    pub key_columns: Vec<usize>,
}

impl NavigationPlan {
    /// Whether this row carries no object for the navigation.
    pub fn is_absent(&self, row: &[Value]) -> bool {
        if let Some(split) = self.split {
            return row.get(split).map_or(true, Value::is_null);
        }
        self.collection
            && self
                .key_columns
                .iter()
                .all(|&p| row.get(p).map_or(true, Value::is_null))
    }

    pub(crate) fn key(&self, row: &[Value]) -> Vec<KeyPart> {
        key_of(row, &self.key_columns)
    }
}

/// Compiled reading plan for one result shape.
#[derive(Debug, Clone)]
pub struct Extractor {
    pub root: ObjectPlan,
    pub navigations: Vec<NavigationPlan>,
    pub root_key: Vec<usize>,
    pub column_count: usize,
}

impl Extractor {
    /// Resolve every column of `shape` against `root` and the descriptors
    /// reachable through its navigation members.
    pub fn compile(root: Arc<EntityDescriptor>, shape: &ResultShape) -> MaterializeResult<Self> {
        let mut navigations: Vec<NavigationPlan> = Vec::with_capacity(shape.navigations.len());
        for nav in &shape.navigations {
            let target = {
                let parent = match nav.parent {
                    None => &root,
                    Some(p) => navigations.get(p).map(|n| &n.object.entity).ok_or_else(|| {
                        MaterializeError::materialization(root.name(), &nav.path, "parent navigation out of order")
                    })?,
                };
                let member = parent.navigation(&nav.member).ok_or_else(|| {
                    MaterializeError::materialization(parent.name(), &nav.member, "no navigation member")
                })?;
                if member.is_collection() != nav.collection {
                    let reason = if nav.collection {
                        "a collection is projected into a single-valued member"
                    } else {
                        "a single object is projected into a collection member"
                    };
                    return Err(MaterializeError::materialization(parent.name(), &nav.member, reason));
                }
                member.target.resolve()
            };
            navigations.push(NavigationPlan {
                member: nav.member.clone(),
                parent: nav.parent,
                object: ObjectPlan::new(target),
                split: nav.split_index,
                collection: nav.collection,
                key_columns: nav.key_columns.clone(),
            });
        }

        let mut root_plan = ObjectPlan::new(root);
        for (position, column) in shape.columns.iter().enumerate() {
            if column.kind != ColumnKind::Member {
                continue;
            }
            match column.owner {
                None => root_plan.bind(position, &column.member)?,
                Some(owner) => match navigations.get_mut(owner) {
                    Some(nav) => nav.object.bind(position, &column.member)?,
                    None => {
                        return Err(MaterializeError::materialization(
                            root_plan.entity.name(),
                            &column.member,
                            "column owned by an unknown navigation",
                        ))
                    }
                },
            }
        }

        if shape.has_collections() && shape.root_key.is_empty() {
            return Err(MaterializeError::materialization(
                root_plan.entity.name(),
                "",
                "a result with collections carries no root key columns",
            ));
        }

        Ok(Self {
            root: root_plan,
            navigations,
            root_key: shape.root_key.clone(),
            column_count: shape.column_count(),
        })
    }

    /// Whether consecutive rows may belong to the same root object.
    pub fn fans_out(&self) -> bool {
        !self.root_key.is_empty()
    }

    pub(crate) fn root_key(&self, row: &[Value]) -> Vec<KeyPart> {
        key_of(row, &self.root_key)
    }
}

fn key_of(row: &[Value], positions: &[usize]) -> Vec<KeyPart> {
    positions
        .iter()
        .map(|&p| row.get(p).map_or(KeyPart::Null, Value::key_fragment))
        .collect()
}

/// Cached extractor for `root` and `shape`, compiling it on first use.
pub fn extractor_for(
    root: Arc<EntityDescriptor>,
    shape: &ResultShape,
) -> MaterializeResult<Arc<Extractor>> {
    let key = (root.type_id(), shape.clone());
    if let Some(existing) = EXTRACTORS.get(&key) {
        return Ok(Arc::clone(existing.value()));
    }

    let built = Arc::new(Extractor::compile(root, shape)?);
    log::debug!(
        "compiled extractor for {} ({} columns, {} navigations)",
        built.root.entity.name(),
        built.column_count,
        built.navigations.len()
    );
    Ok(Arc::clone(EXTRACTORS.entry(key).or_insert(built).value()))
}

/// Number of cached extractors (diagnostics).
pub fn cached_count() -> usize {
    EXTRACTORS.len()
}
