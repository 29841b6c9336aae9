//! Object assembly from rows.
//!
//! Rows of a fanned-out result are grouped by adjacency on the root key.
//! Within one root group every navigation keeps the children it has already
//! seen, so the cartesian product of two collections yields each child once:
//!
//! ```text
//!  Id | Books.Id | Tags.Id        Shelf 1
//!   1 |       10 |       7   ─►     Books [10, 11]
//!   1 |       10 |       8          Tags  [7, 8]
//!   1 |       11 |       7
//!   1 |       11 |       8
//!   2 |     NULL |    NULL   ─►   Shelf 2 (no books, no tags)
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::cursor::ResultCursor;
use super::error::{MaterializeError, MaterializeResult};
use super::extractor::Extractor;
use crate::metadata::{Entity, FromValue, KeyPart, Value};

/// An object whose children may still grow.
#[derive(Debug, Default)]
struct Pending {
    fields: Vec<(usize, Value)>,
    /// Single-valued children by navigation index.
    singles: Vec<(usize, Pending)>,
    collections: Vec<(usize, Collection)>,
}

#[derive(Debug, Default)]
struct Collection {
    seen: HashMap<Vec<KeyPart>, usize>,
    items: Vec<Pending>,
}

/// One step from an object to a child.
#[derive(Debug, Clone, Copy)]
enum Step {
    Single(usize),
    Item(usize, usize),
}

impl Pending {
    fn new(fields: Vec<(usize, Value)>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    fn has_single(&self, nav: usize) -> bool {
        self.singles.iter().any(|(i, _)| *i == nav)
    }

    fn collection_mut(&mut self, nav: usize) -> &mut Collection {
        let index = match self.collections.iter().position(|(i, _)| *i == nav) {
            Some(index) => index,
            None => {
                self.collections.push((nav, Collection::default()));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index].1
    }

    fn at_mut(&mut self, path: &[Step]) -> Option<&mut Pending> {
        let Some((step, rest)) = path.split_first() else {
            return Some(self);
        };
        let child = match *step {
            Step::Single(nav) => self
                .singles
                .iter_mut()
                .find(|(i, _)| *i == nav)
                .map(|(_, child)| child),
            Step::Item(nav, index) => self
                .collections
                .iter_mut()
                .find(|(i, _)| *i == nav)
                .and_then(|(_, c)| c.items.get_mut(index)),
        }?;
        child.at_mut(rest)
    }
}

/// Merge the navigations of one row into `root`.
///
/// `created` tells whether `root` was started by this row; single-valued
/// children are read only from the row that created their owner.
fn absorb(
    extractor: &Extractor,
    root: &mut Pending,
    row: &[Value],
    created: bool,
) -> MaterializeResult<()> {
    let mut located: Vec<Option<(Vec<Step>, bool)>> = Vec::with_capacity(extractor.navigations.len());

    for (index, nav) in extractor.navigations.iter().enumerate() {
        let parent = match nav.parent {
            None => Some((Vec::new(), created)),
            Some(p) => located.get(p).cloned().flatten(),
        };
        let Some((mut path, parent_created)) = parent else {
            located.push(None);
            continue;
        };
        let Some(owner) = root.at_mut(&path) else {
            located.push(None);
            continue;
        };

        if nav.collection {
            if nav.is_absent(row) {
                located.push(None);
                continue;
            }
            let key = nav.key(row);
            let collection = owner.collection_mut(index);
            let (item, fresh) = match collection.seen.get(&key) {
                Some(&item) => (item, false),
                None => {
                    collection.items.push(Pending::new(nav.object.read(row)?));
                    let item = collection.items.len() - 1;
                    collection.seen.insert(key, item);
                    (item, true)
                }
            };
            path.push(Step::Item(index, item));
            located.push(Some((path, fresh)));
        } else if parent_created {
            if nav.is_absent(row) {
                located.push(None);
                continue;
            }
            owner.singles.push((index, Pending::new(nav.object.read(row)?)));
            path.push(Step::Single(index));
            located.push(Some((path, true)));
        } else if owner.has_single(index) {
            path.push(Step::Single(index));
            located.push(Some((path, false)));
        } else {
            located.push(None);
        }
    }
    Ok(())
}

/// Build the finished object for `pending`, children first.
fn build(
    extractor: &Extractor,
    nav: Option<usize>,
    pending: Pending,
) -> MaterializeResult<Box<dyn Any>> {
    let plan = match nav {
        None => &extractor.root,
        Some(i) => match extractor.navigations.get(i) {
            Some(n) => &n.object,
            None => {
                return Err(MaterializeError::materialization(
                    extractor.root.entity().name(),
                    "",
                    format!("navigation #{} out of range", i),
                ))
            }
        },
    };

    let mut children = Vec::new();
    for (i, child) in pending.singles {
        let member = member_of(extractor, i);
        children.push((member, build(extractor, Some(i), child)?));
    }
    for (i, collection) in pending.collections {
        let member = member_of(extractor, i);
        for item in collection.items {
            children.push((member.clone(), build(extractor, Some(i), item)?));
        }
    }

    let entity = plan.entity();
    (entity.build_fn())(pending.fields, children)
        .map_err(|err| MaterializeError::from_record(entity, err))
}

fn member_of(extractor: &Extractor, nav: usize) -> String {
    extractor
        .navigations
        .get(nav)
        .map(|n| n.member.clone())
        .unwrap_or_default()
}

/// Lazy sequence of objects read from a cursor.
///
/// Single pass: each call to `next` pulls rows until one root object is
/// complete. Iteration stops after the first error.
pub struct Materialized<T, C> {
    cursor: C,
    extractor: Arc<Extractor>,
    current: Option<(Vec<KeyPart>, Pending)>,
    rows: usize,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity, C: ResultCursor> Materialized<T, C> {
    pub(crate) fn new(cursor: C, extractor: Arc<Extractor>) -> Self {
        Self {
            cursor,
            extractor,
            current: None,
            rows: 0,
            done: false,
            _marker: PhantomData,
        }
    }

    /// Rows consumed so far.
    pub fn rows_read(&self) -> usize {
        self.rows
    }

    /// Take a row. Returns the previous root object once the row starts a
    /// new one.
    fn step(&mut self, row: Vec<Value>) -> MaterializeResult<Option<Pending>> {
        let extractor = Arc::clone(&self.extractor);

        if extractor.fans_out() {
            let key = extractor.root_key(&row);
            if let Some((current_key, pending)) = self.current.as_mut() {
                if *current_key == key {
                    absorb(&extractor, pending, &row, false)?;
                    return Ok(None);
                }
            }
            let mut root = Pending::new(extractor.root.read(&row)?);
            absorb(&extractor, &mut root, &row, true)?;
            return Ok(self.current.replace((key, root)).map(|(_, previous)| previous));
        }

        let mut root = Pending::new(extractor.root.read(&row)?);
        absorb(&extractor, &mut root, &row, true)?;
        Ok(Some(root))
    }

    fn finish(&self, pending: Pending) -> MaterializeResult<T> {
        let entity = self.extractor.root.entity();
        build(&self.extractor, None, pending)?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                MaterializeError::materialization(
                    entity.name(),
                    "",
                    format!("root object is not a {}", std::any::type_name::<T>()),
                )
            })
    }

    fn fail(&mut self, err: MaterializeError) -> Option<MaterializeResult<T>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl<T: Entity, C: ResultCursor> Iterator for Materialized<T, C> {
    type Item = MaterializeResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let row = match self.cursor.next_row() {
                Ok(Some(row)) => row,
                Ok(None) => {
                    self.done = true;
                    let last = self.current.take()?;
                    return Some(self.finish(last.1));
                }
                Err(err) => return self.fail(err),
            };
            if row.len() != self.extractor.column_count {
                return self.fail(MaterializeError::ShapeMismatch {
                    expected: self.extractor.column_count,
                    actual: row.len(),
                });
            }
            self.rows += 1;
            log::trace!("row {}: {:?}", self.rows, row);

            match self.step(row) {
                Ok(Some(complete)) => return Some(self.finish(complete)),
                Ok(None) => continue,
                Err(err) => return self.fail(err),
            }
        }
    }
}

/// Lazy sequence of single-column values.
pub struct Scalars<V, C> {
    cursor: C,
    member: String,
    done: bool,
    _marker: PhantomData<fn() -> V>,
}

impl<V: FromValue, C: ResultCursor> Scalars<V, C> {
    pub(crate) fn new(cursor: C, member: String) -> Self {
        Self {
            cursor,
            member,
            done: false,
            _marker: PhantomData,
        }
    }
}

impl<V: FromValue, C: ResultCursor> Iterator for Scalars<V, C> {
    type Item = MaterializeResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.cursor.next_row() {
            Ok(Some(row)) if row.len() == 1 => {
                let cell = row.into_iter().next().unwrap_or(Value::Null);
                log::trace!("scalar {}", cell);
                V::from_value(cell).map_err(|err| MaterializeError::Conversion {
                    member: self.member.clone(),
                    expected: err.expected,
                    found: err.found,
                })
            }
            Ok(Some(row)) => Err(MaterializeError::ShapeMismatch {
                expected: 1,
                actual: row.len(),
            }),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}
