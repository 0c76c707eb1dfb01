// This module provides get-or-create interning for immutable type values. The surrounding
// IR deduplicates types so that equal types share one instance and can be compared by
// pointer. TypeUniquer keys a hashbrown set by the structural equality and hash that every
// buffer type derives, hands out shared Arc handles, and guards the table with a mutex so
// concurrent requests for the same logical type converge to a single instance. Lookups
// never clone the key unless the value is new.

//! Structural type interning.

use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::HashSet;

/// Interning table for values with structural equality.
#[derive(Debug)]
pub struct TypeUniquer<T> {
    table: Mutex<HashSet<Arc<T>>>,
}

/// Interning statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniquerStats {
    pub unique_types: usize,
}

impl<T: Hash + Eq> TypeUniquer<T> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashSet::new()),
        }
    }

    /// Return the shared instance equal to `value`, inserting it if absent.
    pub fn get_or_intern(&self, value: T) -> Arc<T> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.get(&value) {
            return Arc::clone(existing);
        }
        let interned = Arc::new(value);
        table.insert(Arc::clone(&interned));
        log::trace!("interned new type, table size {}", table.len());
        interned
    }

    /// Look up an already interned instance without inserting.
    pub fn lookup(&self, value: &T) -> Option<Arc<T>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.get(value).cloned()
    }

    pub fn stats(&self) -> UniquerStats {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        UniquerStats {
            unique_types: table.len(),
        }
    }
}

impl<T: Hash + Eq> Default for TypeUniquer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_equal_values_share_instance() {
        let uniquer = TypeUniquer::new();
        let a = uniquer.get_or_intern(vec![1, 16, 8, 8]);
        let b = uniquer.get_or_intern(vec![1, 16, 8, 8]);
        let c = uniquer.get_or_intern(vec![1, 16, 4, 4]);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(uniquer.stats().unique_types, 2);
        assert!(uniquer.lookup(&vec![1, 16, 4, 4]).is_some());
        assert!(uniquer.lookup(&vec![2]).is_none());
    }

    #[test]
    fn test_concurrent_interning_converges() {
        let uniquer = Arc::new(TypeUniquer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let uniquer = Arc::clone(&uniquer);
                thread::spawn(move || uniquer.get_or_intern(String::from("memref<1x16xf16>")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(uniquer.stats().unique_types, 1);
    }
}
