//! Plan execution
//!
//! Applies a plan through one open [`StoreTransaction`]. Nothing is committed
//! here: the caller commits once the whole plan went through, so any error
//! leaves the store untouched.
//!
//! Test cases are written in this order: metadata and hashes of matched rows,
//! recycled and inserted rows, deletes (content before case), rank phase one,
//! rank phase two, content, stale images. Submissions insert new revisions
//! (predecessors already exist), refresh metadata, then delete files before
//! their submissions.

use crate::config::ReconcileConfig;
use crate::content::ContentProvider;
use crate::error::Result;
use crate::model::{encode_expected_results, DesiredTestCase, Summary};
use crate::rank::RankAssignment;
use crate::store::{NewSubmission, StoreTransaction, TestCaseContent};
use crate::submission_plan::{SubmissionOperation, SubmissionPlan};
use crate::testcase_plan::{record_for, RowRef, TestCaseOperation, TestCasePlan};

const RANK_PHASE_ONE: &str = "rank_phase_one";
const RANK_PHASE_TWO: &str = "rank_phase_two";

fn resolve(row: RowRef, created: &[i64]) -> i64 {
    match row {
        RowRef::Existing(id) => id,
        RowRef::Created(n) => created[n],
    }
}

fn apply_ranks(
    tx: &mut dyn StoreTransaction,
    phase: &str,
    assignments: &[RankAssignment<RowRef>],
    created: &[i64],
) -> Result<()> {
    tx.begin_phase(phase)?;
    for assignment in assignments {
        tx.set_test_case_rank(resolve(assignment.id, created), assignment.rank)?;
    }
    tx.end_phase(phase)?;
    Ok(())
}

fn load_test_case<C: ContentProvider + ?Sized>(content: &C, case: &DesiredTestCase) -> Result<TestCaseContent> {
    let image = match &case.image {
        Some(image) => Some(content.load(&image.source)?),
        None => None,
    };
    Ok(TestCaseContent {
        input: content.load(&case.input)?,
        output: content.load(&case.output)?,
        image,
    })
}

/// Apply a test case plan, returning its summary.
pub fn execute_test_cases<C: ContentProvider + ?Sized>(
    tx: &mut dyn StoreTransaction,
    config: &ReconcileConfig,
    content: &C,
    plan: TestCasePlan<'_>,
) -> Result<Summary> {
    let mut created = Vec::new();
    let mut writes = Vec::new();

    for op in &plan.operations {
        match op {
            TestCaseOperation::UpdateMetadata { id, description } => {
                tx.update_test_case_description(*id, description.as_deref())?;
            }
            TestCaseOperation::UpdateContent { id, case } => {
                tx.update_test_case_hashes(*id, &case.input_hash, &case.output_hash, case.image_type())?;
                writes.push((*id, *case));
            }
            TestCaseOperation::Recycle { id, case } => {
                tx.overwrite_test_case(*id, &record_for(config, case))?;
                writes.push((*id, *case));
            }
            TestCaseOperation::Create { case, rank } => {
                let id = tx.insert_test_case(plan.problem_id, &record_for(config, case), *rank)?;
                tracing::debug!("Inserted {} as test case {}", case, id);
                created.push(id);
                writes.push((id, *case));
            }
            TestCaseOperation::NoOp { .. } => {}
        }
    }

    if !plan.deletes.is_empty() {
        tracing::debug!("Deleting {} leftover test cases", plan.deletes.len());
        tx.delete_test_case_contents(&plan.deletes)?;
        tx.delete_test_cases(&plan.deletes)?;
    }

    if !plan.ranks.is_empty() {
        tracing::debug!("Updating {} ranks", plan.ranks.len());
        let one = plan.ranks.begin();
        apply_ranks(tx, RANK_PHASE_ONE, one.assignments(), &created)?;
        let two = one.complete();
        apply_ranks(tx, RANK_PHASE_TWO, two.assignments(), &created)?;
    }

    if !writes.is_empty() {
        tracing::debug!("Updating {} test case contents", writes.len());
    }
    for (id, case) in writes {
        tx.write_test_case_content(id, &load_test_case(content, case)?)?;
    }

    if !plan.clear_images.is_empty() {
        tracing::debug!("Clearing {} stale images", plan.clear_images.len());
        tx.clear_test_case_images(&plan.clear_images)?;
    }

    Ok(plan.summary)
}

/// Apply a submission plan, returning its summary.
pub fn execute_submissions<C: ContentProvider + ?Sized>(
    tx: &mut dyn StoreTransaction,
    content: &C,
    plan: SubmissionPlan<'_>,
) -> Result<Summary> {
    for op in &plan.operations {
        match op {
            SubmissionOperation::Create {
                contest_id,
                submit_time,
                submission,
                predecessor,
            } => {
                let id = tx.insert_submission(&NewSubmission {
                    predecessor_id: *predecessor,
                    contest_id: *contest_id,
                    team_id: submission.team_id,
                    problem_id: plan.problem_id,
                    language: &submission.language,
                    submit_time: *submit_time,
                    expected_results: encode_expected_results(&submission.expected),
                })?;
                tracing::debug!("Adding submission {} to contest {} as {}", submission, contest_id, id);
                for (rank, file) in submission.files.iter().enumerate() {
                    let source = content.load(&file.source)?;
                    tx.insert_submission_file(id, &file.name, rank as i64 + 1, &source)?;
                }
            }
            SubmissionOperation::UpdateMetadata {
                id,
                submit_time,
                expected,
            } => {
                tx.update_submission_metadata(*id, *submit_time, &encode_expected_results(expected))?;
            }
            SubmissionOperation::NoOp { .. } => {}
        }
    }

    if !plan.deletes.is_empty() {
        tracing::debug!("Deleting {} submissions ({:?})", plan.deletes.len(), plan.deletes);
        tx.delete_submission_files(&plan.deletes)?;
        tx.delete_submissions(&plan.deletes)?;
    }

    Ok(plan.summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SourceLoader;
    use crate::sqlite_store::SqliteStore;
    use crate::store::Store;
    use crate::testcase_plan::plan_test_cases;

    fn case(name: &str, input: &str) -> DesiredTestCase {
        DesiredTestCase::from_bytes(name, input.as_bytes().to_vec(), b"ok\n".to_vec())
    }

    #[test]
    fn test_execute_creates_then_reorders() {
        let config = ReconcileConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();

        let first = vec![case("secret/1", "1"), case("sample/1", "2")];
        let mut tx = store.begin().unwrap();
        let snapshot = tx.test_cases(problem).unwrap();
        let plan = plan_test_cases(&config, problem, snapshot, &first).unwrap();
        assert_eq!(plan.ranks.len(), 2);
        let summary = execute_test_cases(&mut *tx, &config, &SourceLoader, plan).unwrap();
        assert_eq!(summary.created, 2);
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let cases = tx.test_cases(problem).unwrap();
        let names: Vec<_> = cases.iter().map(|c| (c.name.as_deref().unwrap(), c.rank)).collect();
        assert_eq!(names, vec![("sample/1", 1), ("secret/1", 2)]);
        assert!(cases.iter().all(|c| c.has_content));
    }

    #[test]
    fn test_execute_deletes_content_before_case() {
        let config = ReconcileConfig::default();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();

        let first = vec![case("sample/1", "1"), case("sample/2", "2")];
        let mut tx = store.begin().unwrap();
        let plan = plan_test_cases(&config, problem, vec![], &first).unwrap();
        execute_test_cases(&mut *tx, &config, &SourceLoader, plan).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let snapshot = tx.test_cases(problem).unwrap();
        let plan = plan_test_cases(&config, problem, snapshot, &first[..1]).unwrap();
        let summary = execute_test_cases(&mut *tx, &config, &SourceLoader, plan).unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(tx.test_cases(problem).unwrap().len(), 1);
    }
}
