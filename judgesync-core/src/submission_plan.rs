//! Submission planning
//!
//! Every desired submission must exist once in every selected contest. A
//! stored revision is never edited in place: a changed submission becomes a
//! new revision chained to the current head, and the old head stays as
//! history.

use crate::chain::{resolve_chains, ChainResolution, RevisionGroup};
use crate::error::{ReconcileError, Result};
use crate::matcher::match_by_key;
use crate::model::{DesiredSubmission, PersistedSubmission, Summary, Verdict, Warning};
use crate::store::{ContestInfo, StoreError, SubmissionFileRow, SubmissionRow};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOperation<'a> {
    /// Insert a revision, chained to `predecessor` when there is one
    Create {
        contest_id: i64,
        submit_time: DateTime<Utc>,
        submission: &'a DesiredSubmission,
        predecessor: Option<i64>,
    },
    UpdateMetadata {
        id: i64,
        submit_time: DateTime<Utc>,
        expected: &'a BTreeSet<Verdict>,
    },
    NoOp { id: i64 },
}

#[derive(Debug)]
pub struct SubmissionPlan<'a> {
    pub problem_id: i64,
    pub operations: Vec<SubmissionOperation<'a>>,
    /// Submissions to remove together with their files
    pub deletes: Vec<i64>,
    pub summary: Summary,
}

/// Join submission rows with their files.
pub fn assemble_submissions(
    rows: Vec<SubmissionRow>,
    files: Vec<SubmissionFileRow>,
) -> Result<Vec<PersistedSubmission>> {
    let mut by_submission: HashMap<i64, BTreeMap<String, _>> = HashMap::new();
    for file in files {
        let entry = by_submission.entry(file.submission_id).or_default();
        if entry.contains_key(&file.file_name) {
            return Err(ReconcileError::DuplicateFileName {
                submission_id: file.submission_id,
                file_name: file.file_name,
            });
        }
        entry.insert(file.file_name, file.hash);
    }

    Ok(rows
        .into_iter()
        .map(|row| PersistedSubmission {
            files: by_submission.remove(&row.id).unwrap_or_default(),
            id: row.id,
            predecessor_id: row.predecessor_id,
            team_id: row.team_id,
            contest_id: row.contest_id,
            language: row.language,
            submit_time: row.submit_time,
            expected_raw: row.expected_results,
        })
        .collect())
}

fn content_changed(desired: &DesiredSubmission, head: &PersistedSubmission) -> bool {
    if desired.language != head.language {
        tracing::info!("{} changed language from {}", desired, head.language);
        return true;
    }
    let hashes = desired.file_hashes();
    if hashes.len() != head.files.len() || hashes.keys().any(|name| !head.files.contains_key(*name)) {
        tracing::debug!("{} changed files", desired);
        return true;
    }
    if hashes.iter().any(|(name, hash)| head.files.get(*name) != Some(*hash)) {
        tracing::debug!("{} changed hash", desired);
        return true;
    }
    false
}

/// Plan the operations that make every selected contest hold `desired`.
///
/// `snapshot` must cover exactly the selected contests and the teams named by
/// `desired`.
pub fn plan_submissions<'a>(
    problem_id: i64,
    contests: &[ContestInfo],
    snapshot: Vec<PersistedSubmission>,
    desired: &'a [DesiredSubmission],
) -> Result<SubmissionPlan<'a>> {
    let mut summary = Summary::default();

    for submission in desired {
        let mut names = HashSet::new();
        if let Some(file) = submission.files.iter().find(|f| !names.insert(f.name.as_str())) {
            return Err(ReconcileError::DuplicateDesiredFileName {
                team_id: submission.team_id,
                file_name: file.name.clone(),
            });
        }
    }

    let mut keys = HashSet::new();
    let mut unique = Vec::with_capacity(desired.len());
    for submission in desired {
        let key = submission.group_key();
        if keys.contains(&key) {
            tracing::warn!("Multiple submissions for {}", key);
            summary.warnings.push(Warning::DuplicateDesired { key: key.to_string() });
        } else {
            keys.insert(key);
            unique.push(submission);
        }
    }

    let mut resolution = resolve_chains(snapshot)?;
    summary.warnings.append(&mut resolution.warnings);
    let mut deletes = resolution.invalid.clone();

    let mut operations = Vec::new();
    for contest in contests {
        plan_contest(contest, &unique, &resolution, &mut operations, &mut deletes, &mut summary)?;
    }

    deletes.sort_unstable();
    deletes.dedup();
    summary.deleted = deletes.len();

    let accounted = operations.len();
    let expected = unique.len() * contests.len();
    if accounted != expected {
        return Err(ReconcileError::CountMismatch { expected, actual: accounted });
    }

    Ok(SubmissionPlan {
        problem_id,
        operations,
        deletes,
        summary,
    })
}

fn plan_contest<'a>(
    contest: &ContestInfo,
    desired: &[&'a DesiredSubmission],
    resolution: &ChainResolution,
    operations: &mut Vec<SubmissionOperation<'a>>,
    deletes: &mut Vec<i64>,
    summary: &mut Summary,
) -> Result<()> {
    let partition = match_by_key(
        desired.iter().copied(),
        resolution.groups_in(contest.id),
        |submission: &&DesiredSubmission| Some(submission.group_key()),
        |group: &&RevisionGroup| Some(group.key.clone()),
    )?;

    for (submission, group) in partition.matched {
        summary.matched += 1;
        let lineage = resolution.lineage(group)?;
        for &id in &group.members {
            if !lineage.members.contains(&id) {
                tracing::warn!("Submission {} is not on the lineage of {}", id, group.key);
                summary.warnings.push(Warning::StrayRevision {
                    submission_id: id,
                    group: group.key.to_string(),
                });
                deletes.push(id);
            }
        }

        let head = resolution
            .revision(lineage.head)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", lineage.head)))?;
        if content_changed(submission, head) {
            summary.updated += 1;
            operations.push(SubmissionOperation::Create {
                contest_id: contest.id,
                submit_time: contest.start_time,
                submission,
                predecessor: Some(head.id),
            });
        } else if head.submit_time != contest.start_time
            || resolution.expected(head.id) != Some(&submission.expected)
        {
            summary.updated += 1;
            operations.push(SubmissionOperation::UpdateMetadata {
                id: head.id,
                submit_time: contest.start_time,
                expected: &submission.expected,
            });
        } else {
            operations.push(SubmissionOperation::NoOp { id: head.id });
        }
    }

    for submission in partition.missing {
        tracing::debug!("Adding submission {} to contest {}", submission, contest.id);
        summary.created += 1;
        operations.push(SubmissionOperation::Create {
            contest_id: contest.id,
            submit_time: contest.start_time,
            submission,
            predecessor: None,
        });
    }

    for group in partition.leftover {
        tracing::debug!("Removing {} from contest {}", group.key, contest.id);
        deletes.extend(&group.members);
    }
    Ok(())
}

impl SubmissionPlan<'_> {
    pub fn is_noop(&self) -> bool {
        self.summary.changes() == 0
    }
}

impl fmt::Display for SubmissionPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Submissions of problem {}: {}", self.problem_id, self.summary)?;
        for op in &self.operations {
            match op {
                SubmissionOperation::Create { contest_id, submission, predecessor, .. } => match predecessor {
                    Some(id) => writeln!(f, "  revise #{} with {} in contest {}", id, submission, contest_id)?,
                    None => writeln!(f, "  create {} in contest {}", submission, contest_id)?,
                },
                SubmissionOperation::UpdateMetadata { id, submit_time, expected } => {
                    let keys: Vec<&str> = expected.iter().map(|v| v.judge_key()).collect();
                    writeln!(f, "  update #{}: submitted {}, expecting [{}]", id, submit_time, keys.join(","))?
                }
                SubmissionOperation::NoOp { .. } => {}
            }
        }
        if !self.deletes.is_empty() {
            let ids: Vec<String> = self.deletes.iter().map(|id| id.to_string()).collect();
            writeln!(f, "  delete {}", ids.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::model::SubmissionFile;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn contest() -> ContestInfo {
        ContestInfo { id: 1, start_time: start() }
    }

    fn desired(team_id: i64, file: &str, source: &str) -> DesiredSubmission {
        DesiredSubmission {
            team_id,
            language: "py3".to_string(),
            files: vec![SubmissionFile::from_bytes(file, source.as_bytes().to_vec())],
            expected: BTreeSet::from([Verdict::Correct]),
        }
    }

    fn persisted(id: i64, predecessor_id: Option<i64>, file: &str, source: &str) -> PersistedSubmission {
        PersistedSubmission {
            id,
            predecessor_id,
            team_id: 7,
            contest_id: 1,
            language: "py3".to_string(),
            submit_time: start(),
            expected_raw: Some(r#"["correct"]"#.to_string()),
            files: BTreeMap::from([(file.to_string(), Fingerprint::of(source.as_bytes()))]),
        }
    }

    #[test]
    fn test_new_group_creates_root() {
        let wanted = vec![desired(7, "main.py", "print(1)")];
        let plan = plan_submissions(1, &[contest()], vec![], &wanted).unwrap();
        assert_eq!(
            plan.operations,
            vec![SubmissionOperation::Create {
                contest_id: 1,
                submit_time: start(),
                submission: &wanted[0],
                predecessor: None,
            }]
        );
        assert_eq!(plan.summary.created, 1);
    }

    #[test]
    fn test_changed_hash_revises_head() {
        let wanted = vec![desired(7, "main.py", "print(2)")];
        let snapshot = vec![persisted(11, None, "main.py", "print(1)")];
        let plan = plan_submissions(1, &[contest()], snapshot, &wanted).unwrap();
        assert_eq!(
            plan.operations,
            vec![SubmissionOperation::Create {
                contest_id: 1,
                submit_time: start(),
                submission: &wanted[0],
                predecessor: Some(11),
            }]
        );
        assert!(plan.deletes.is_empty());
        assert_eq!(plan.summary.updated, 1);
    }

    #[test]
    fn test_changed_language_revises_head() {
        let mut wanted = vec![desired(7, "main.py", "print(1)")];
        wanted[0].language = "pypy3".to_string();
        let snapshot = vec![persisted(11, None, "main.py", "print(1)")];
        let plan = plan_submissions(1, &[contest()], snapshot, &wanted).unwrap();
        assert!(matches!(
            plan.operations[0],
            SubmissionOperation::Create { predecessor: Some(11), .. }
        ));
    }

    #[test]
    fn test_unchanged_head_is_noop() {
        let wanted = vec![desired(7, "main.py", "print(1)")];
        let snapshot = vec![
            persisted(11, None, "main.py", "print(0)"),
            persisted(12, Some(11), "main.py", "print(1)"),
        ];
        let plan = plan_submissions(1, &[contest()], snapshot, &wanted).unwrap();
        assert_eq!(plan.operations, vec![SubmissionOperation::NoOp { id: 12 }]);
        assert!(plan.is_noop());
        assert_eq!(plan.summary.matched, 1);
    }

    #[test]
    fn test_metadata_refreshed_when_different() {
        let mut wanted = vec![desired(7, "main.py", "print(1)")];
        wanted[0].expected = BTreeSet::from([Verdict::WrongAnswer]);
        let mut head = persisted(11, None, "main.py", "print(1)");
        head.submit_time = Utc.timestamp_opt(0, 0).unwrap();
        let plan = plan_submissions(1, &[contest()], vec![head], &wanted).unwrap();
        assert_eq!(
            plan.operations,
            vec![SubmissionOperation::UpdateMetadata {
                id: 11,
                submit_time: start(),
                expected: &wanted[0].expected,
            }]
        );
    }

    #[test]
    fn test_leftover_groups_and_invalid_rows_deleted() {
        let wanted = vec![desired(7, "main.py", "print(1)")];
        let mut bad = persisted(20, None, "bad.py", "x");
        bad.team_id = 8;
        bad.expected_raw = Some("not json".to_string());
        let snapshot = vec![
            persisted(11, None, "main.py", "print(1)"),
            persisted(12, None, "old.py", "print(1)"),
            persisted(13, Some(12), "old.py", "print(2)"),
            bad,
        ];
        let plan = plan_submissions(1, &[contest()], snapshot, &wanted).unwrap();
        assert_eq!(plan.deletes, vec![12, 13, 20]);
        assert_eq!(plan.summary.deleted, 3);
        assert!(matches!(plan.summary.warnings[0], Warning::InvalidExpectedOutcome(_)));
    }

    #[test]
    fn test_stray_revisions_deleted() {
        let wanted = vec![desired(7, "main.py", "print(2)")];
        let snapshot = vec![
            persisted(11, None, "main.py", "print(1)"),
            persisted(12, Some(11), "main.py", "print(2)"),
            persisted(15, None, "main.py", "print(3)"),
        ];
        let plan = plan_submissions(1, &[contest()], snapshot, &wanted).unwrap();
        assert_eq!(plan.operations, vec![SubmissionOperation::NoOp { id: 12 }]);
        assert_eq!(plan.deletes, vec![15]);
        assert_eq!(
            plan.summary.warnings,
            vec![Warning::StrayRevision {
                submission_id: 15,
                group: "team 7: main.py".to_string(),
            }]
        );
    }

    #[test]
    fn test_every_contest_gets_a_copy() {
        let wanted = vec![desired(7, "main.py", "print(1)")];
        let contests = [contest(), ContestInfo { id: 2, start_time: start() }];
        let snapshot = vec![persisted(11, None, "main.py", "print(1)")];
        let plan = plan_submissions(1, &contests, snapshot, &wanted).unwrap();
        assert_eq!(plan.operations.len(), 2);
        assert_eq!(plan.operations[0], SubmissionOperation::NoOp { id: 11 });
        assert!(matches!(
            plan.operations[1],
            SubmissionOperation::Create { contest_id: 2, predecessor: None, .. }
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let wanted = vec![desired(7, "main.py", "print(1)")];
        let snapshot = vec![
            persisted(1, Some(2), "main.py", "print(1)"),
            persisted(2, Some(1), "main.py", "print(1)"),
        ];
        assert!(matches!(
            plan_submissions(1, &[contest()], snapshot, &wanted),
            Err(ReconcileError::CyclicChain { .. })
        ));
    }

    #[test]
    fn test_duplicate_desired_dropped() {
        let wanted = vec![desired(7, "main.py", "print(1)"), desired(7, "main.py", "print(2)")];
        let plan = plan_submissions(1, &[contest()], vec![], &wanted).unwrap();
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(
            plan.summary.warnings,
            vec![Warning::DuplicateDesired { key: "team 7: main.py".to_string() }]
        );
    }

    #[test]
    fn test_desired_duplicate_file_names_rejected() {
        let mut wanted = desired(7, "main.py", "print(1)");
        wanted.files.push(SubmissionFile::from_bytes("main.py", b"print(2)".to_vec()));
        match plan_submissions(1, &[contest()], vec![], &[wanted]) {
            Err(ReconcileError::DuplicateDesiredFileName { team_id, file_name }) => {
                assert_eq!(team_id, 7);
                assert_eq!(file_name, "main.py");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_assemble_rejects_duplicate_file_names() {
        let row = SubmissionRow {
            id: 3,
            predecessor_id: None,
            team_id: 7,
            contest_id: 1,
            language: "py3".to_string(),
            submit_time: start(),
            expected_results: None,
        };
        let file = SubmissionFileRow {
            submission_id: 3,
            file_name: "main.py".to_string(),
            hash: Fingerprint::of(b"x"),
        };
        let assembled = assemble_submissions(vec![row.clone()], vec![file.clone()]).unwrap();
        assert_eq!(assembled[0].files.len(), 1);
        assert!(matches!(
            assemble_submissions(vec![row], vec![file.clone(), file]),
            Err(ReconcileError::DuplicateFileName { submission_id: 3, .. })
        ));
    }
}
