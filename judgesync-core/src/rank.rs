//! Two-phase rank reassignment
//!
//! Ranks are unique per problem and the store checks that on every statement.
//! Moving rows straight to their target rank can collide (swapping 1 and 2
//! passes through two rows at rank 2), so every row that moves is first parked
//! on a fresh rank above everything live, and only then put on its target.
//!
//! The phases are separate types: [`RankPhaseTwo`] can only be obtained by
//! completing a [`RankPhaseOne`].

use std::fmt;

/// Move a row to a rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment<Id> {
    pub id: Id,
    pub rank: i64,
}

/// An entity taking part in the reorder
#[derive(Debug, Clone)]
pub struct RankEntry<Id, K> {
    pub id: Id,
    pub current_rank: i64,
    pub order_key: K,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RankMove<Id> {
    id: Id,
    temporary: i64,
    target: i64,
}

/// Rank changes needed to bring a set of rows into order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankPlan<Id> {
    moves: Vec<RankMove<Id>>,
}

/// Parks every moving row on an unused temporary rank
#[derive(Debug)]
#[must_use = "phase two is only reachable through RankPhaseOne::complete"]
pub struct RankPhaseOne<Id> {
    assignments: Vec<RankAssignment<Id>>,
    next: RankPhaseTwo<Id>,
}

/// Puts every parked row on its target rank
#[derive(Debug)]
pub struct RankPhaseTwo<Id> {
    assignments: Vec<RankAssignment<Id>>,
}

/// Compute the rank plan for `entries`.
///
/// Target ranks are the 1-based positions after a stable sort by `order_key`.
/// `live_max` is the largest rank held by any row of the problem that is
/// still live when phase one starts; temporary ranks start strictly above
/// `max(live_max, current ranks, target ranks) + 1`.
pub fn plan_ranks<Id: Clone, K: Ord>(mut entries: Vec<RankEntry<Id, K>>, live_max: i64) -> RankPlan<Id> {
    let highest_current = entries.iter().map(|e| e.current_rank).max().unwrap_or(0);
    let highest_target = entries.len() as i64;
    let mut temporary = live_max.max(highest_current).max(highest_target) + 1;

    entries.sort_by(|a, b| a.order_key.cmp(&b.order_key));

    let mut moves = Vec::new();
    for (position, entry) in entries.into_iter().enumerate() {
        let target = position as i64 + 1;
        if entry.current_rank != target {
            temporary += 1;
            moves.push(RankMove { id: entry.id, temporary, target });
        }
    }
    RankPlan { moves }
}

impl<Id: Clone> RankPlan<Id> {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Number of rows changing rank
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Final rank of every moving row
    pub fn targets(&self) -> impl Iterator<Item = RankAssignment<Id>> + '_ {
        self.moves.iter().map(|m| RankAssignment { id: m.id.clone(), rank: m.target })
    }

    /// Start executing the plan.
    pub fn begin(self) -> RankPhaseOne<Id> {
        let (parked, placed): (Vec<_>, Vec<_>) = self
            .moves
            .into_iter()
            .map(|m| {
                (
                    RankAssignment { id: m.id.clone(), rank: m.temporary },
                    RankAssignment { id: m.id, rank: m.target },
                )
            })
            .unzip();
        RankPhaseOne {
            assignments: parked,
            next: RankPhaseTwo { assignments: placed },
        }
    }
}

impl<Id> RankPhaseOne<Id> {
    pub fn assignments(&self) -> &[RankAssignment<Id>] {
        &self.assignments
    }

    /// Confirm that every temporary assignment has been committed.
    pub fn complete(self) -> RankPhaseTwo<Id> {
        self.next
    }
}

impl<Id> RankPhaseTwo<Id> {
    pub fn assignments(&self) -> &[RankAssignment<Id>] {
        &self.assignments
    }
}

impl<Id: fmt::Display> fmt::Display for RankPlan<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.moves {
            writeln!(f, "  rank {} -> {} (via {})", m.id, m.target, m.temporary)?;
        }
        Ok(())
    }
}
