//! Entity model for reconciliation
//!
//! Desired entities are built once per run from the problem description and
//! never mutated. Persisted entities mirror store rows with their store-assigned
//! identity.

use crate::content::ContentSource;
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ─────────────────────────────────────────────────────
// Verdicts
// ─────────────────────────────────────────────────────

/// Judging outcome a jury submission is expected to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verdict {
    Correct,
    WrongAnswer,
    TimeLimit,
    RunError,
    CompilerError,
    NoOutput,
    OutputLimit,
    PresentationError,
    MemoryLimit,
}

impl Verdict {
    pub const ALL: [Verdict; 9] = [
        Verdict::Correct,
        Verdict::WrongAnswer,
        Verdict::TimeLimit,
        Verdict::RunError,
        Verdict::CompilerError,
        Verdict::NoOutput,
        Verdict::OutputLimit,
        Verdict::PresentationError,
        Verdict::MemoryLimit,
    ];

    /// Key used by the judge's `expected_results` column
    pub fn judge_key(self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::WrongAnswer => "wrong-answer",
            Verdict::TimeLimit => "timelimit",
            Verdict::RunError => "run-error",
            Verdict::CompilerError => "compiler-error",
            Verdict::NoOutput => "no-output",
            Verdict::OutputLimit => "output-limit",
            Verdict::PresentationError => "presentation-error",
            Verdict::MemoryLimit => "memory-limit",
        }
    }

    pub fn from_judge_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.judge_key() == key)
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.judge_key())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Verdict::from_judge_key(&key).ok_or_else(|| de::Error::custom(format!("unknown verdict {:?}", key)))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.judge_key())
    }
}

/// A stored `expected_results` value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("invalid expected results {value:?} on submission {submission_id}")]
pub struct InvalidExpectedOutcome {
    pub submission_id: i64,
    pub value: String,
}

/// Parse a stored `expected_results` JSON list. Absent and empty values are
/// the empty set.
pub fn parse_expected_results(
    submission_id: i64,
    raw: Option<&str>,
) -> Result<BTreeSet<Verdict>, InvalidExpectedOutcome> {
    let invalid = || InvalidExpectedOutcome {
        submission_id,
        value: raw.unwrap_or_default().to_string(),
    };
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(BTreeSet::new()),
        Some(raw) => raw,
    };
    let keys: Vec<String> = serde_json::from_str(raw).map_err(|_| invalid())?;
    keys.iter()
        .map(|k| Verdict::from_judge_key(k).ok_or_else(invalid))
        .collect()
}

/// Encode expected outcomes as the judge's JSON list of keys.
pub fn encode_expected_results(expected: &BTreeSet<Verdict>) -> String {
    let keys: Vec<&str> = expected.iter().map(|v| v.judge_key()).collect();
    serde_json::Value::from(keys).to_string()
}

// ─────────────────────────────────────────────────────
// Test cases
// ─────────────────────────────────────────────────────

/// Optional illustration attached to a test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseImage {
    /// File extension, stored as the case's image type
    pub extension: String,
    pub source: ContentSource,
}

/// A test case the caller wants to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredTestCase {
    /// Match key, unique within the problem
    pub unique_name: String,
    pub description: Option<String>,
    pub input_hash: Fingerprint,
    pub output_hash: Fingerprint,
    pub is_sample: bool,
    pub input: ContentSource,
    pub output: ContentSource,
    pub image: Option<TestCaseImage>,
}

impl DesiredTestCase {
    /// Build a test case from in-memory content.
    pub fn from_bytes(unique_name: impl Into<String>, input: Vec<u8>, output: Vec<u8>) -> Self {
        let unique_name = unique_name.into();
        Self {
            is_sample: unique_name.starts_with("sample"),
            unique_name,
            description: None,
            input_hash: Fingerprint::of(&input),
            output_hash: Fingerprint::of(&output),
            input: ContentSource::Bytes(input),
            output: ContentSource::Bytes(output),
            image: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, extension: impl Into<String>, data: Vec<u8>) -> Self {
        self.image = Some(TestCaseImage {
            extension: extension.into(),
            source: ContentSource::Bytes(data),
        });
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn image_type(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.extension.as_str())
    }

    /// Description as stored, truncated to `limit` characters
    pub fn stored_description(&self, limit: usize) -> Option<String> {
        self.description.as_ref().map(|d| d.chars().take(limit).collect())
    }
}

impl fmt::Display for DesiredTestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TC({})", self.unique_name)
    }
}

// ─────────────────────────────────────────────────────
// Submissions
// ─────────────────────────────────────────────────────

/// Match key of a submission lineage: the team plus its sorted file names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub team_id: i64,
    pub files: Vec<String>,
}

impl GroupKey {
    pub fn new(team_id: i64, files: impl IntoIterator<Item = String>) -> Self {
        let mut files: Vec<String> = files.into_iter().collect();
        files.sort();
        Self { team_id, files }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}: {}", self.team_id, self.files.join(","))
    }
}

/// One source file of a desired submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFile {
    pub name: String,
    pub hash: Fingerprint,
    pub source: ContentSource,
}

impl SubmissionFile {
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            hash: Fingerprint::of(&data),
            source: ContentSource::Bytes(data),
        }
    }
}

/// A jury submission the caller wants to exist in every selected contest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredSubmission {
    pub team_id: i64,
    pub language: String,
    pub files: Vec<SubmissionFile>,
    pub expected: BTreeSet<Verdict>,
}

impl DesiredSubmission {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.team_id, self.files.iter().map(|f| f.name.clone()))
    }

    pub fn file_hashes(&self) -> BTreeMap<&str, &Fingerprint> {
        self.files.iter().map(|f| (f.name.as_str(), &f.hash)).collect()
    }
}

impl fmt::Display for DesiredSubmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.files.iter().map(|f| f.name.as_str()).collect();
        write!(f, "{} ({}) by team {}", names.join(","), self.language, self.team_id)
    }
}

/// A submission revision as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSubmission {
    pub id: i64,
    pub predecessor_id: Option<i64>,
    pub team_id: i64,
    pub contest_id: i64,
    pub language: String,
    pub submit_time: DateTime<Utc>,
    pub expected_raw: Option<String>,
    /// File name to content fingerprint
    pub files: BTreeMap<String, Fingerprint>,
}

impl PersistedSubmission {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.team_id, self.files.keys().cloned())
    }
}

// ─────────────────────────────────────────────────────
// Run results
// ─────────────────────────────────────────────────────

/// A soft failure recorded during a run; never aborts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    InvalidExpectedOutcome(InvalidExpectedOutcome),
    SubmissionWithoutFiles { submission_id: i64 },
    MissingTestCaseContent { test_case_id: i64, name: String },
    DuplicateDesired { key: String },
    StrayRevision { submission_id: i64, group: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::InvalidExpectedOutcome(e) => write!(f, "{}", e),
            Warning::SubmissionWithoutFiles { submission_id } => {
                write!(f, "no files for submission {}", submission_id)
            }
            Warning::MissingTestCaseContent { test_case_id, name } => {
                write!(f, "missing content on test case {} ({})", test_case_id, name)
            }
            Warning::DuplicateDesired { key } => write!(f, "duplicate desired entity {}", key),
            Warning::StrayRevision { submission_id, group } => {
                write!(f, "submission {} is not on the lineage of {}", submission_id, group)
            }
        }
    }
}

/// Count-based outcome of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Desired entities paired with an existing row
    pub matched: usize,
    /// Rows inserted from scratch
    pub created: usize,
    /// Leftover rows overwritten in place for a missing entity
    pub recycled: usize,
    /// Existing rows changed, including new revisions of a lineage
    pub updated: usize,
    pub deleted: usize,
    pub warnings: Vec<Warning>,
}

impl Summary {
    /// Number of store mutations the run performed
    pub fn changes(&self) -> usize {
        self.created + self.recycled + self.updated + self.deleted
    }

    pub fn merge(&mut self, other: Summary) {
        self.matched += other.matched;
        self.created += other.created;
        self.recycled += other.recycled;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matched {}, created {}, recycled {}, updated {}, deleted {}",
            self.matched, self.created, self.recycled, self.updated, self.deleted
        )?;
        if !self.warnings.is_empty() {
            write!(f, " ({} warnings)", self.warnings.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expected_results() {
        let parsed = parse_expected_results(1, Some(r#"["correct","timelimit"]"#)).unwrap();
        assert_eq!(parsed, BTreeSet::from([Verdict::Correct, Verdict::TimeLimit]));
        assert!(parse_expected_results(1, None).unwrap().is_empty());
        assert!(parse_expected_results(1, Some("")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_expected_results_invalid() {
        let err = parse_expected_results(7, Some(r#"["correct","accepted"]"#)).unwrap_err();
        assert_eq!(err.submission_id, 7);
        assert_eq!(err.value, r#"["correct","accepted"]"#);
        assert!(parse_expected_results(7, Some("{not json")).is_err());
    }

    #[test]
    fn test_encode_expected_results_is_sorted() {
        let set = BTreeSet::from([Verdict::TimeLimit, Verdict::Correct]);
        let encoded = encode_expected_results(&set);
        assert_eq!(encoded, r#"["correct","timelimit"]"#);
        assert_eq!(parse_expected_results(1, Some(&encoded)).unwrap(), set);
    }

    #[test]
    fn test_verdict_serde_matches_judge_key() {
        for verdict in Verdict::ALL {
            let json = serde_json::to_string(&verdict).unwrap();
            assert_eq!(json, format!("\"{}\"", verdict.judge_key()));
            assert_eq!(serde_json::from_str::<Verdict>(&json).unwrap(), verdict);
        }
        assert!(serde_json::from_str::<Verdict>("\"time-limit\"").is_err());
    }

    #[test]
    fn test_group_key_sorts_files() {
        let a = GroupKey::new(7, ["util.py".to_string(), "main.py".to_string()]);
        let b = GroupKey::new(7, ["main.py".to_string(), "util.py".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "team 7: main.py,util.py");
    }

    #[test]
    fn test_stored_description_truncates_chars() {
        let case = DesiredTestCase::from_bytes("secret/1", vec![], vec![]).with_description("é".repeat(300));
        let stored = case.stored_description(255).unwrap();
        assert_eq!(stored.chars().count(), 255);
    }

    #[test]
    fn test_summary_changes_excludes_matched() {
        let summary = Summary { matched: 5, ..Default::default() };
        assert_eq!(summary.changes(), 0);
        let mut total = Summary { created: 1, deleted: 2, ..Default::default() };
        total.merge(Summary { recycled: 1, updated: 1, matched: 3, ..Default::default() });
        assert_eq!(total.changes(), 5);
        assert_eq!(total.matched, 3);
    }
}
