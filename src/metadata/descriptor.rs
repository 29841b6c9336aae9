//! Entity descriptors: column mapping, keys and relationships.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use super::record::{build_record, BuildFn, Entity};
use super::value::{DataType, Value};

/// One mapped field of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Member name as used in plan expressions.
    pub member: String,
    /// Column name in the table.
    pub column: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub is_key: bool,
    pub is_identity: bool,
    /// Substituted when a non-nullable column reads as NULL.
    pub default: Option<Value>,
}

/// Whether a navigation yields one object or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Join columns of a declared relationship, by member name.
///
/// The join condition is `parent.local[i] = child.referenced[i]` for every `i`,
/// for both many-to-one (`local` = foreign key members) and one-to-many
/// (`local` = the parent's key members).
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub local: Vec<String>,
    pub referenced: Vec<String>,
}

/// Lazy reference to another entity's descriptor.
///
/// Stored as a function pointer so self-referencing and mutually
/// referencing entities never recurse while being described.
#[derive(Clone, Copy)]
pub struct EntityRef {
    type_name: &'static str,
    resolve: fn() -> Arc<EntityDescriptor>,
}

impl EntityRef {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            resolve: super::describe::<T>,
        }
    }

    pub fn resolve(&self) -> Arc<EntityDescriptor> {
        (self.resolve)()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({})", self.type_name)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

/// A navigation member: a relationship to another entity, or a nested
/// object member of a projection type.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationMember {
    pub member: String,
    pub target: EntityRef,
    pub cardinality: Cardinality,
    /// `None` for projection-only members, which cannot be joined.
    pub foreign_key: Option<ForeignKey>,
}

impl NavigationMember {
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// Per-type mapping metadata. Immutable once built.
pub struct EntityDescriptor {
    name: String,
    table: Option<String>,
    schema: Option<String>,
    fields: Vec<FieldDescriptor>,
    navigations: Vec<NavigationMember>,
    type_id: TypeId,
    build: BuildFn,
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("schema", &self.schema)
            .field("fields", &self.fields)
            .field("navigations", &self.navigations)
            .finish()
    }
}

impl EntityDescriptor {
    /// Start describing `T`. The table name defaults to `name`.
    pub fn builder<T: Entity>(name: &str) -> DescriptorBuilder {
        DescriptorBuilder {
            descriptor: EntityDescriptor {
                name: name.to_string(),
                table: Some(name.to_string()),
                schema: None,
                fields: Vec::new(),
                navigations: Vec::new(),
                type_id: TypeId::of::<T>(),
                build: build_record::<T>,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name, or `None` for projection-only types.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn navigations(&self) -> &[NavigationMember] {
        &self.navigations
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn build_fn(&self) -> BuildFn {
        self.build
    }

    /// Look up a field by member name, returning its slot.
    pub fn field(&self, member: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.member == member)
    }

    pub fn navigation(&self, member: &str) -> Option<&NavigationMember> {
        self.navigations.iter().find(|n| n.member == member)
    }

    /// Slots of the primary-key members, in declaration order.
    pub fn key_slots(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_key)
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_key)
    }

    pub fn has_key(&self) -> bool {
        self.fields.iter().any(|f| f.is_key)
    }

    /// Column name for a member, if it maps to a field.
    pub fn column_of(&self, member: &str) -> Option<&str> {
        self.field(member).map(|(_, f)| f.column.as_str())
    }
}

/// Fluent builder for [`EntityDescriptor`].
///
/// Field modifiers (`nullable`, `identity`, `named`, `default_value`) apply to
/// the most recently added field.
#[must_use = "call build() to finish the descriptor"]
pub struct DescriptorBuilder {
    descriptor: EntityDescriptor,
}

impl DescriptorBuilder {
    pub fn table(mut self, table: &str) -> Self {
        self.descriptor.table = Some(table.to_string());
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.descriptor.schema = Some(schema.to_string());
        self
    }

    /// Mark this type as a projection shape with no backing table.
    pub fn projection(mut self) -> Self {
        self.descriptor.table = None;
        self
    }

    /// Add a non-nullable column whose name equals the member name.
    pub fn column(mut self, member: &str, data_type: DataType) -> Self {
        self.descriptor.fields.push(FieldDescriptor {
            member: member.to_string(),
            column: member.to_string(),
            data_type,
            nullable: false,
            is_key: false,
            is_identity: false,
            default: None,
        });
        self
    }

    /// Add a primary-key column.
    pub fn key(self, member: &str, data_type: DataType) -> Self {
        let mut this = self.column(member, data_type);
        if let Some(last) = this.descriptor.fields.last_mut() {
            last.is_key = true;
        }
        this
    }

    pub fn nullable(mut self) -> Self {
        if let Some(last) = self.descriptor.fields.last_mut() {
            last.nullable = true;
        }
        self
    }

    /// Database-generated value; skipped on INSERT and UPDATE.
    pub fn identity(mut self) -> Self {
        if let Some(last) = self.descriptor.fields.last_mut() {
            last.is_identity = true;
        }
        self
    }

    /// Map the last field to a column with a different name.
    pub fn named(mut self, column: &str) -> Self {
        if let Some(last) = self.descriptor.fields.last_mut() {
            last.column = column.to_string();
        }
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        if let Some(last) = self.descriptor.fields.last_mut() {
            last.default = Some(value.into());
        }
        self
    }

    /// Declare a many-to-one navigation (`local` foreign-key members of this
    /// entity reference `referenced` members of `T`).
    pub fn references<T: Entity>(self, member: &str, local: &[&str], referenced: &[&str]) -> Self {
        self.navigation::<T>(member, Cardinality::One, Some((local, referenced)))
    }

    /// Declare a one-to-many navigation (`local` members of this entity,
    /// usually its key, are referenced by `referenced` members of `T`).
    pub fn has_many<T: Entity>(self, member: &str, local: &[&str], referenced: &[&str]) -> Self {
        self.navigation::<T>(member, Cardinality::Many, Some((local, referenced)))
    }

    /// Declare a nested object member of a projection type.
    pub fn nested<T: Entity>(self, member: &str) -> Self {
        self.navigation::<T>(member, Cardinality::One, None)
    }

    /// Declare a nested collection member of a projection type.
    pub fn nested_many<T: Entity>(self, member: &str) -> Self {
        self.navigation::<T>(member, Cardinality::Many, None)
    }

    fn navigation<T: Entity>(
        mut self,
        member: &str,
        cardinality: Cardinality,
        keys: Option<(&[&str], &[&str])>,
    ) -> Self {
        let foreign_key = keys.map(|(local, referenced)| ForeignKey {
            local: local.iter().map(|s| s.to_string()).collect(),
            referenced: referenced.iter().map(|s| s.to_string()).collect(),
        });
        self.descriptor.navigations.push(NavigationMember {
            member: member.to_string(),
            target: EntityRef::of::<T>(),
            cardinality,
            foreign_key,
        });
        self
    }

    pub fn build(self) -> EntityDescriptor {
        self.descriptor
    }
}
