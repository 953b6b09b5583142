//! Reuse of leftover rows
//!
//! A persisted row nobody matched is overwritten with a missing entity instead
//! of being deleted while a new row is inserted. The row keeps its id, so
//! anything referencing it (judging history) stays attached.

/// Outcome of [`recycle`]
#[derive(Debug)]
pub struct Recycled<D, P> {
    /// Missing entity paired with the leftover row it takes over
    pub reused: Vec<(D, P)>,
    /// Missing entities left over once leftovers ran out; these are inserted
    pub still_missing: Vec<D>,
    /// Leftover rows nobody took; these are deleted
    pub still_leftover: Vec<P>,
}

/// Pair missing entities with leftover rows, taking rows from the end of
/// `leftover`, until either side runs out.
pub fn recycle<D, P>(missing: Vec<D>, mut leftover: Vec<P>) -> Recycled<D, P> {
    let mut reused = Vec::new();
    let mut still_missing = Vec::new();
    for entity in missing {
        match leftover.pop() {
            Some(row) => reused.push((entity, row)),
            None => still_missing.push(entity),
        }
    }
    Recycled {
        reused,
        still_missing,
        still_leftover: leftover,
    }
}
