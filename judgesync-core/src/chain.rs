//! Submission lineages
//!
//! Each submission may point at the revision it replaces. Read forward, the
//! pointers must form simple paths: a predecessor has at most one successor
//! and no walk may come back to where it started. The last revision of a path
//! is its head, the one currently live.
//!
//! Rows whose expected results do not parse are not part of any lineage. They
//! take every other row of the same team in the same contest with them into
//! the invalid bucket, since the rest of that history cannot be trusted.

use crate::error::{ReconcileError, Result};
use crate::model::{parse_expected_results, GroupKey, PersistedSubmission, Verdict, Warning};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Valid revisions of one contest sharing a group key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionGroup {
    pub contest_id: i64,
    pub key: GroupKey,
    /// Member ids, ascending
    pub members: Vec<i64>,
}

/// Path of revisions ending in the live head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub head: i64,
    /// Ids from the oldest known revision to the head
    pub members: Vec<i64>,
}

/// Lineage index over one snapshot
#[derive(Debug)]
pub struct ChainResolution {
    revisions: HashMap<i64, PersistedSubmission>,
    expected: HashMap<i64, BTreeSet<Verdict>>,
    successor: HashMap<i64, i64>,
    groups: Vec<RevisionGroup>,
    /// Rows excluded from lineages because their group holds unparsable data
    pub invalid: Vec<i64>,
    pub warnings: Vec<Warning>,
}

/// Split the snapshot into valid groups and invalid rows, and index successors.
pub fn resolve_chains(snapshot: Vec<PersistedSubmission>) -> Result<ChainResolution> {
    let mut warnings = Vec::new();
    let mut expected = HashMap::new();
    let mut poisoned: HashSet<(i64, i64)> = HashSet::new();

    for revision in &snapshot {
        match parse_expected_results(revision.id, revision.expected_raw.as_deref()) {
            Ok(verdicts) => {
                expected.insert(revision.id, verdicts);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                poisoned.insert((revision.contest_id, revision.team_id));
                warnings.push(Warning::InvalidExpectedOutcome(e));
            }
        }
    }

    let mut invalid = Vec::new();
    let mut revisions = HashMap::new();
    for revision in snapshot {
        if poisoned.contains(&(revision.contest_id, revision.team_id)) {
            invalid.push(revision.id);
            expected.remove(&revision.id);
        } else {
            revisions.insert(revision.id, revision);
        }
    }
    invalid.sort_unstable();

    let mut ids: Vec<i64> = revisions.keys().copied().collect();
    ids.sort_unstable();

    let mut successor: HashMap<i64, i64> = HashMap::new();
    let mut grouped: BTreeMap<(i64, GroupKey), Vec<i64>> = BTreeMap::new();
    for id in ids {
        let revision = &revisions[&id];
        if let Some(predecessor) = revision.predecessor_id {
            if let Some(&first) = successor.get(&predecessor) {
                return Err(ReconcileError::MultipleSuccessors {
                    predecessor,
                    first,
                    second: id,
                });
            }
            successor.insert(predecessor, id);
        }
        if revision.files.is_empty() {
            tracing::warn!("No files for submission {}", id);
            warnings.push(Warning::SubmissionWithoutFiles { submission_id: id });
        }
        grouped
            .entry((revision.contest_id, revision.group_key()))
            .or_default()
            .push(id);
    }

    let groups = grouped
        .into_iter()
        .map(|((contest_id, key), members)| RevisionGroup { contest_id, key, members })
        .collect();

    tracing::debug!(
        "Found {} submissions, {} invalid",
        revisions.len(),
        invalid.len()
    );
    Ok(ChainResolution {
        revisions,
        expected,
        successor,
        groups,
        invalid,
        warnings,
    })
}

impl ChainResolution {
    /// Valid groups of one contest
    pub fn groups_in(&self, contest_id: i64) -> impl Iterator<Item = &RevisionGroup> + '_ {
        self.groups.iter().filter(move |g| g.contest_id == contest_id)
    }

    pub fn revision(&self, id: i64) -> Option<&PersistedSubmission> {
        self.revisions.get(&id)
    }

    /// Parsed expected results of a valid revision
    pub fn expected(&self, id: i64) -> Option<&BTreeSet<Verdict>> {
        self.expected.get(&id)
    }

    /// Walk the group's lineage forward from its smallest id to the head.
    pub fn lineage(&self, group: &RevisionGroup) -> Result<Lineage> {
        // Groups are built from at least one row.
        let start = group.members[0];

        let mut seen = HashSet::from([start]);
        let mut forward = vec![start];
        let mut current = start;
        while let Some(&next) = self.successor.get(&current) {
            forward.push(next);
            if !seen.insert(next) {
                return Err(ReconcileError::CyclicChain { ids: forward });
            }
            current = next;
        }
        let head = current;

        let mut backward = Vec::new();
        let mut cursor = start;
        while let Some(predecessor) = self.revisions.get(&cursor).and_then(|r| r.predecessor_id) {
            if !self.revisions.contains_key(&predecessor) || !seen.insert(predecessor) {
                break;
            }
            backward.push(predecessor);
            cursor = predecessor;
        }

        backward.reverse();
        backward.extend(forward);
        Ok(Lineage { head, members: backward })
    }
}
