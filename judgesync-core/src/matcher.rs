//! Key matching between desired entities and persisted rows
//!
//! Pairs every desired entity with at most one persisted row sharing its
//! match key. Persisted rows without a key are never matched and always end
//! up as leftovers. Two persisted rows with the same non-empty key abort the
//! match.

use crate::error::{ReconcileError, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Display;
use std::hash::Hash;

/// Partition produced by [`match_by_key`]
#[derive(Debug)]
pub struct KeyMatch<D, P> {
    pub matched: Vec<(D, P)>,
    /// Desired entities without a persisted counterpart, in input order
    pub missing: Vec<D>,
    /// Persisted rows no desired entity claimed, in input order
    pub leftover: Vec<P>,
}

/// Match `desired` against `persisted` in O(n).
///
/// A desired entity whose key was already consumed by an earlier desired
/// entity is reported as missing.
pub fn match_by_key<D, P, K>(
    desired: impl IntoIterator<Item = D>,
    persisted: impl IntoIterator<Item = P>,
    desired_key: impl Fn(&D) -> Option<K>,
    persisted_key: impl Fn(&P) -> Option<K>,
) -> Result<KeyMatch<D, P>>
where
    K: Eq + Hash + Display,
{
    let mut slots: Vec<Option<P>> = Vec::new();
    let mut by_key: HashMap<K, usize> = HashMap::new();

    for row in persisted {
        let index = slots.len();
        if let Some(key) = persisted_key(&row) {
            match by_key.entry(key) {
                Entry::Occupied(e) => {
                    return Err(ReconcileError::DuplicateKey { key: e.key().to_string() });
                }
                Entry::Vacant(e) => {
                    e.insert(index);
                }
            }
        }
        slots.push(Some(row));
    }

    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for entity in desired {
        let slot = desired_key(&entity)
            .and_then(|key| by_key.get(&key).copied())
            .and_then(|index| slots[index].take());
        match slot {
            Some(row) => matched.push((entity, row)),
            None => missing.push(entity),
        }
    }

    let leftover: Vec<P> = slots.into_iter().flatten().collect();
    tracing::debug!(
        "Matched {} entities, {} missing, {} leftovers",
        matched.len(),
        missing.len(),
        leftover.len()
    );
    Ok(KeyMatch { matched, missing, leftover })
}

/// Treat empty strings as unset keys
pub fn non_empty(key: Option<&str>) -> Option<String> {
    key.filter(|k| !k.is_empty()).map(str::to_string)
}
