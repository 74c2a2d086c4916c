//! Interning for class/interface names.
//!
//! Only names are interned — `Array`/`Uninitialized` nodes stay structural
//! (see DESIGN.md Open Question 2). Backed by `ahash` to match the rest of
//! the crate's hash-heavy internal structures, behind an `RwLock` so the
//! lattice can be read concurrently across independent method traces
//! sharing one class's interner (see SPEC_FULL.md §5).

use ahash::RandomState;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// An append-only, concurrency-safe string interner.
///
/// Once a name is interned, pointer equality on the returned `Arc<str>` is a
/// legal identity test — two calls to `intern` with the same string content
/// return clones of the same allocation.
#[derive(Debug)]
pub struct Interner {
    names: RwLock<HashSet<Arc<str>, RandomState>>,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashSet::with_hasher(RandomState::new())),
        }
    }

    /// Interns `name`, returning the canonical `Arc<str>` for it.
    #[must_use]
    pub fn intern(&self, name: &str) -> Arc<str> {
        if let Some(existing) = self.names.read().expect("interner lock poisoned").get(name) {
            return Arc::clone(existing);
        }
        let mut names = self.names.write().expect("interner lock poisoned");
        if let Some(existing) = names.get(name) {
            return Arc::clone(existing);
        }
        let arc: Arc<str> = Arc::from(name);
        names.insert(Arc::clone(&arc));
        arc
    }

    /// Number of distinct interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().expect("interner lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_same_allocation() {
        let interner = Interner::new();
        let a = interner.intern("java/lang/String");
        let b = interner.intern("java/lang/String");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, interner.len());
    }

    #[test]
    fn test_intern_distinct_names() {
        let interner = Interner::new();
        let a = interner.intern("java/lang/String");
        let b = interner.intern("java/lang/Object");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(2, interner.len());
    }
}
