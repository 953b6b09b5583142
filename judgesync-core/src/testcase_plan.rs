//! Test case planning
//!
//! Turns the desired test cases of a problem and a snapshot of its rows into a
//! [`TestCasePlan`]. Planning is pure: nothing is written and no content is
//! loaded until the plan is executed.

use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::matcher::{match_by_key, non_empty};
use crate::model::{DesiredTestCase, Summary, Warning};
use crate::rank::{plan_ranks, RankEntry, RankPlan};
use crate::recycle::recycle;
use crate::store::{PersistedTestCase, TestCaseRecord};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Reference to a test case row that may not exist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowRef {
    Existing(i64),
    /// Row inserted by the n-th `Create` of the plan
    Created(usize),
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Existing(id) => write!(f, "#{}", id),
            RowRef::Created(n) => write!(f, "new[{}]", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TestCaseOperation<'a> {
    /// Insert a new row at a rank above every live row
    Create { case: &'a DesiredTestCase, rank: i64 },
    /// Overwrite a leftover row in place
    Recycle { id: i64, case: &'a DesiredTestCase },
    /// Rewrite hashes and content of a matched row
    UpdateContent { id: i64, case: &'a DesiredTestCase },
    UpdateMetadata { id: i64, description: Option<String> },
    NoOp { id: i64 },
}

impl TestCaseOperation<'_> {
    /// Case whose content this operation writes, if any
    pub fn content_target(&self) -> Option<&DesiredTestCase> {
        match self {
            TestCaseOperation::Create { case, .. }
            | TestCaseOperation::Recycle { case, .. }
            | TestCaseOperation::UpdateContent { case, .. } => Some(case),
            TestCaseOperation::UpdateMetadata { .. } | TestCaseOperation::NoOp { .. } => None,
        }
    }
}

/// Everything needed to bring one problem's test cases in line
#[derive(Debug)]
pub struct TestCasePlan<'a> {
    pub problem_id: i64,
    /// Row-level operations, metadata first
    pub operations: Vec<TestCaseOperation<'a>>,
    /// Leftover rows nobody took
    pub deletes: Vec<i64>,
    pub ranks: RankPlan<RowRef>,
    /// Rows whose stored image must go
    pub clear_images: Vec<i64>,
    pub summary: Summary,
}

/// Column values for writing `case` into a row
pub fn record_for(config: &ReconcileConfig, case: &DesiredTestCase) -> TestCaseRecord {
    TestCaseRecord {
        name: case.unique_name.clone(),
        description: case.stored_description(config.description_limit),
        input_hash: case.input_hash.clone(),
        output_hash: case.output_hash.clone(),
        sample: case.is_sample,
        image_type: case.image_type().map(str::to_string),
    }
}

fn content_changed(case: &DesiredTestCase, row: &PersistedTestCase) -> bool {
    row.input_hash.as_ref() != Some(&case.input_hash)
        || row.output_hash.as_ref() != Some(&case.output_hash)
        || row.image_type.as_deref() != case.image_type()
        || (case.has_image() && !row.has_image)
}

/// Plan the operations turning `snapshot` into `desired`.
pub fn plan_test_cases<'a>(
    config: &ReconcileConfig,
    problem_id: i64,
    snapshot: Vec<PersistedTestCase>,
    desired: &'a [DesiredTestCase],
) -> Result<TestCasePlan<'a>> {
    let mut summary = Summary::default();

    let mut names = HashSet::new();
    let mut unique = Vec::with_capacity(desired.len());
    for case in desired {
        if names.insert(case.unique_name.as_str()) {
            unique.push(case);
        } else {
            tracing::warn!("Duplicate test case {} in description", case.unique_name);
            summary.warnings.push(Warning::DuplicateDesired { key: case.unique_name.clone() });
        }
    }

    let live_max = snapshot.iter().map(|row| row.rank).max().unwrap_or(0);
    let partition = match_by_key(
        unique.iter().copied(),
        snapshot,
        |case: &&DesiredTestCase| non_empty(Some(case.unique_name.as_str())),
        |row: &PersistedTestCase| non_empty(row.name.as_deref()),
    )?;
    tracing::debug!(
        "Matched {} cases, creating {} new, {} leftovers",
        partition.matched.len(),
        partition.missing.len(),
        partition.leftover.len()
    );

    let mut metadata = Vec::new();
    let mut content = Vec::new();
    let mut noops = Vec::new();
    let mut clear_images = Vec::new();
    let mut changed: BTreeSet<i64> = BTreeSet::new();
    let mut rank_entries = Vec::new();

    summary.matched = partition.matched.len();
    for (case, row) in &partition.matched {
        let case: &'a DesiredTestCase = *case;
        let description = case.stored_description(config.description_limit);
        if description != row.description {
            metadata.push(TestCaseOperation::UpdateMetadata { id: row.id, description });
            changed.insert(row.id);
        }
        if !row.has_content {
            tracing::warn!("Missing test case content on existing case {}", case);
            summary.warnings.push(Warning::MissingTestCaseContent {
                test_case_id: row.id,
                name: case.unique_name.clone(),
            });
        }
        if !row.has_content || content_changed(case, row) {
            content.push(TestCaseOperation::UpdateContent { id: row.id, case });
            changed.insert(row.id);
        }
        if !case.has_image() && row.has_image {
            clear_images.push(row.id);
            changed.insert(row.id);
        }
        if !changed.contains(&row.id) {
            noops.push(row.id);
        }
        rank_entries.push(RankEntry {
            id: RowRef::Existing(row.id),
            current_rank: row.rank,
            order_key: config.case_order_key(&case.unique_name),
        });
    }

    let recycled = recycle(partition.missing, partition.leftover);
    summary.recycled = recycled.reused.len();
    for (case, row) in &recycled.reused {
        let case: &'a DesiredTestCase = *case;
        tracing::debug!("Recycling case {} for {}", row.id, case);
        content.push(TestCaseOperation::Recycle { id: row.id, case });
        rank_entries.push(RankEntry {
            id: RowRef::Existing(row.id),
            current_rank: row.rank,
            order_key: config.case_order_key(&case.unique_name),
        });
    }

    summary.created = recycled.still_missing.len();
    for (n, &case) in recycled.still_missing.iter().enumerate() {
        let rank = live_max + n as i64 + 1;
        content.push(TestCaseOperation::Create { case, rank });
        rank_entries.push(RankEntry {
            id: RowRef::Created(n),
            current_rank: rank,
            order_key: config.case_order_key(&case.unique_name),
        });
    }

    let accounted = partition.matched.len() + recycled.reused.len() + recycled.still_missing.len();
    if accounted != unique.len() {
        return Err(ReconcileError::CountMismatch {
            expected: unique.len(),
            actual: accounted,
        });
    }

    let deletes: Vec<i64> = recycled.still_leftover.iter().map(|row| row.id).collect();
    summary.deleted = deletes.len();

    let matched_ids: HashSet<i64> = partition.matched.iter().map(|(_, row)| row.id).collect();
    let ranks = plan_ranks(rank_entries, live_max);
    for assignment in ranks.targets() {
        if let RowRef::Existing(id) = assignment.id {
            if matched_ids.contains(&id) {
                changed.insert(id);
            }
        }
    }
    noops.retain(|id| !changed.contains(id));
    summary.updated = changed.len();

    let mut operations = metadata;
    operations.extend(content);
    operations.extend(noops.into_iter().map(|id| TestCaseOperation::NoOp { id }));

    Ok(TestCasePlan {
        problem_id,
        operations,
        deletes,
        ranks,
        clear_images,
        summary,
    })
}

impl TestCasePlan<'_> {
    /// Whether executing the plan would change the store
    pub fn is_noop(&self) -> bool {
        self.summary.changes() == 0 && self.ranks.is_empty() && self.clear_images.is_empty()
    }
}

impl fmt::Display for TestCasePlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Test cases of problem {}: {}", self.problem_id, self.summary)?;
        let mut created = 0;
        for op in &self.operations {
            match op {
                TestCaseOperation::Create { case, rank } => {
                    writeln!(f, "  create {} as new[{}] at rank {}", case.unique_name, created, rank)?;
                    created += 1;
                }
                TestCaseOperation::Recycle { id, case } => {
                    writeln!(f, "  recycle #{} as {}", id, case.unique_name)?
                }
                TestCaseOperation::UpdateContent { id, case } => {
                    writeln!(f, "  update content #{} ({})", id, case.unique_name)?
                }
                TestCaseOperation::UpdateMetadata { id, description } => {
                    writeln!(f, "  update description #{} to {:?}", id, description)?
                }
                TestCaseOperation::NoOp { .. } => {}
            }
        }
        for id in &self.deletes {
            writeln!(f, "  delete #{}", id)?;
        }
        write!(f, "{}", self.ranks)?;
        for id in &self.clear_images {
            writeln!(f, "  clear image #{}", id)?;
        }
        Ok(())
    }
}
