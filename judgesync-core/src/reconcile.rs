//! Reconciliation entry points
//!
//! One call reconciles one entity collection inside one store transaction:
//! the snapshot is read, a plan computed and applied, and the transaction
//! committed only if every step succeeded.

use crate::config::ReconcileConfig;
use crate::content::{ContentProvider, SourceLoader};
use crate::error::{ReconcileError, Result};
use crate::executor::{execute_submissions, execute_test_cases};
use crate::model::{DesiredSubmission, DesiredTestCase, Summary};
use crate::store::{ContestInfo, Store, StoreTransaction};
use crate::submission_plan::{assemble_submissions, plan_submissions, SubmissionPlan};
use crate::testcase_plan::{plan_test_cases, TestCasePlan};

/// Reconciles desired test cases and submissions against a store
#[derive(Debug, Clone)]
pub struct Reconciler<C = SourceLoader> {
    config: ReconcileConfig,
    content: C,
}

impl Reconciler<SourceLoader> {
    pub fn new(config: ReconcileConfig) -> Self {
        Self::with_content(config, SourceLoader)
    }
}

impl<C: ContentProvider> Reconciler<C> {
    pub fn with_content(config: ReconcileConfig, content: C) -> Self {
        Self { config, content }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Plan the test case changes of a problem without writing anything.
    pub fn plan_test_cases<'d>(
        &self,
        tx: &dyn StoreTransaction,
        problem_id: i64,
        desired: &'d [DesiredTestCase],
    ) -> Result<TestCasePlan<'d>> {
        let snapshot = tx.test_cases(problem_id)?;
        tracing::debug!("Found {} existing test cases for problem {}", snapshot.len(), problem_id);
        plan_test_cases(&self.config, problem_id, snapshot, desired)
    }

    /// Plan the submission changes of a problem without writing anything.
    ///
    /// Without `contest_ids`, every contest that includes the problem is used.
    pub fn plan_submissions<'d>(
        &self,
        tx: &dyn StoreTransaction,
        problem_id: i64,
        contest_ids: Option<&[i64]>,
        desired: &'d [DesiredSubmission],
    ) -> Result<SubmissionPlan<'d>> {
        let contests = select_contests(tx, problem_id, contest_ids)?;
        if contests.is_empty() {
            match contest_ids {
                Some(_) => tracing::info!("No contests specified for problem {}", problem_id),
                None => tracing::info!("Problem {} is not part of any contest", problem_id),
            }
        }
        let selected: Vec<i64> = contests.iter().map(|c| c.id).collect();
        tracing::debug!("Updating for contests with ids {:?}", selected);

        let mut team_ids: Vec<i64> = desired.iter().map(|s| s.team_id).collect();
        team_ids.sort_unstable();
        team_ids.dedup();

        let rows = tx.submissions(problem_id, &team_ids, &selected)?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let files = tx.submission_files(&ids)?;
        tracing::debug!("Found {} submissions, {} files", rows.len(), files.len());

        let snapshot = assemble_submissions(rows, files)?;
        plan_submissions(problem_id, &contests, snapshot, desired)
    }

    /// Bring the test cases of `problem_id` in line with `desired`.
    pub fn reconcile_test_cases(
        &self,
        store: &mut dyn Store,
        problem_id: i64,
        desired: &[DesiredTestCase],
    ) -> Result<Summary> {
        let mut tx = store.begin()?;
        let plan = self.plan_test_cases(&*tx, problem_id, desired)?;
        let summary = execute_test_cases(&mut *tx, &self.config, &self.content, plan)?;
        tx.commit()?;
        log_summary("test cases", &summary);
        Ok(summary)
    }

    /// Bring the jury submissions of `problem_id` in line with `desired` in
    /// every selected contest.
    pub fn reconcile_submissions(
        &self,
        store: &mut dyn Store,
        problem_id: i64,
        contest_ids: Option<&[i64]>,
        desired: &[DesiredSubmission],
    ) -> Result<Summary> {
        let mut tx = store.begin()?;
        let plan = self.plan_submissions(&*tx, problem_id, contest_ids, desired)?;
        let summary = execute_submissions(&mut *tx, &self.content, plan)?;
        tx.commit()?;
        log_summary("submissions", &summary);
        Ok(summary)
    }
}

fn select_contests(
    tx: &dyn StoreTransaction,
    problem_id: i64,
    contest_ids: Option<&[i64]>,
) -> Result<Vec<ContestInfo>> {
    let Some(ids) = contest_ids else {
        return Ok(tx.contests_for_problem(problem_id)?);
    };
    let found = tx.contests(ids)?;
    let mut missing: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| !found.iter().any(|c| c.id == *id))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err(ReconcileError::ContestNotFound(missing));
    }
    Ok(found)
}

fn log_summary(what: &str, summary: &Summary) {
    for warning in &summary.warnings {
        tracing::warn!("{}", warning);
    }
    if summary.changes() == 0 {
        tracing::info!("Updated {}, no changes required", what);
    } else {
        tracing::info!(
            "Updated {}, created {}, recycled {}, updated {}, and deleted {}",
            what,
            summary.created,
            summary.recycled,
            summary.updated,
            summary.deleted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::SqliteStore;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_unknown_contest_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let contest = store.ensure_contest("c", Utc.timestamp_opt(0, 0).unwrap()).unwrap();
        let reconciler = Reconciler::new(ReconcileConfig::default());
        match reconciler.reconcile_submissions(&mut store, problem, Some(&[contest, 41, 40][..]), &[]) {
            Err(ReconcileError::ContestNotFound(ids)) => assert_eq!(ids, vec![40, 41]),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_problem_without_contests_is_empty() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let reconciler = Reconciler::new(ReconcileConfig::default());
        let summary = reconciler.reconcile_submissions(&mut store, problem, None, &[]).unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_explicit_empty_contest_list_is_empty() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let contest = store.ensure_contest("c", Utc.timestamp_opt(0, 0).unwrap()).unwrap();
        store.link_contest_problem(contest, problem, "A").unwrap();
        let team = store.ensure_team("jury").unwrap();
        let desired = vec![DesiredSubmission {
            team_id: team,
            language: "py3".to_string(),
            files: vec![crate::model::SubmissionFile::from_bytes("main.py", b"print(1)".to_vec())],
            expected: Default::default(),
        }];
        let reconciler = Reconciler::new(ReconcileConfig::default());
        let summary = reconciler
            .reconcile_submissions(&mut store, problem, Some(&[][..]), &desired)
            .unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn test_reconcile_test_cases_twice() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let problem = store.ensure_problem("p", "P").unwrap();
        let desired = vec![
            DesiredTestCase::from_bytes("sample/1", b"1\n".to_vec(), b"1\n".to_vec()),
            DesiredTestCase::from_bytes("secret/1", b"2\n".to_vec(), b"4\n".to_vec()),
        ];
        let reconciler = Reconciler::new(ReconcileConfig::default());
        let first = reconciler.reconcile_test_cases(&mut store, problem, &desired).unwrap();
        assert_eq!(first.created, 2);
        let second = reconciler.reconcile_test_cases(&mut store, problem, &desired).unwrap();
        assert_eq!(second.changes(), 0);
        assert_eq!(second.matched, 2);
    }
}
