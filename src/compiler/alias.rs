//! Table alias assignment.
//!
//! Aliases are handed out sequentially per resolver: the primary source is
//! always resolved first (`t0`), explicit joins follow in declaration order
//! and navigation joins continue the sequence in first-registration order.
//! Resolving the same key twice yields the same alias, so compiling the
//! same tree twice yields identical text.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{CompileError, CompileResult};

/// Identity of a table reference within one SELECT scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AliasKey {
    /// The FROM source.
    Primary,
    /// The n-th explicit join (1-based).
    Join(usize),
    /// A navigation join, by canonical path.
    Path(String),
}

impl fmt::Display for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AliasKey::Primary => f.write_str("primary source"),
            AliasKey::Join(n) => write!(f, "join #{}", n),
            AliasKey::Path(path) => write!(f, "navigation {}", path),
        }
    }
}

/// Assigns unique aliases within one SELECT scope.
#[derive(Debug, Clone)]
pub struct AliasResolver {
    prefix: String,
    counter: Rc<Cell<usize>>,
    by_key: HashMap<AliasKey, String>,
    by_alias: HashMap<String, AliasKey>,
}

impl AliasResolver {
    pub fn new(prefix: &str) -> Self {
        Self::sharing(prefix, Rc::new(Cell::new(0)))
    }

    /// A resolver drawing numbers from a shared counter. Correlated
    /// subqueries use one so that aliases stay unique across every
    /// subquery of a command.
    pub fn sharing(prefix: &str, counter: Rc<Cell<usize>>) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter,
            by_key: HashMap::new(),
            by_alias: HashMap::new(),
        }
    }

    /// Alias for `key`, assigning the next free one on first use.
    pub fn resolve(&mut self, key: AliasKey) -> CompileResult<String> {
        if let Some(alias) = self.by_key.get(&key) {
            return Ok(alias.clone());
        }

        let alias = loop {
            let n = self.counter.get();
            self.counter.set(n + 1);
            let candidate = format!("{}{}", self.prefix, n);
            if !self.by_alias.contains_key(&candidate) {
                break candidate;
            }
        };
        self.bind(alias, key)
    }

    fn bind(&mut self, alias: String, key: AliasKey) -> CompileResult<String> {
        if let Some(existing) = self.by_alias.get(&alias) {
            if *existing != key {
                return Err(CompileError::AliasCollision {
                    alias,
                    existing: existing.to_string(),
                    requested: key.to_string(),
                });
            }
        }
        log::trace!("alias {} -> {}", alias, key);
        self.by_alias.insert(alias.clone(), key.clone());
        self.by_key.insert(key, alias.clone());
        Ok(alias)
    }

    /// Next number the shared counter will hand out.
    pub(crate) fn position(&self) -> usize {
        self.counter.get()
    }

    /// Return to an earlier snapshot, forgetting every alias assigned since.
    pub(crate) fn rewind(&mut self, snapshot: AliasResolver, position: usize) {
        *self = snapshot;
        self.counter.set(position);
    }
}
