//! Persisted store abstraction
//!
//! The reconciler never sees raw query rows: reads come back as the named
//! records below and writes go through single-purpose methods. One
//! [`StoreTransaction`] covers one entity collection; dropping it without
//! calling [`StoreTransaction::commit`] rolls everything back.

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A test case row as read at transaction start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTestCase {
    pub id: i64,
    /// Match key (`orig_input_filename`); may be unset on broken rows
    pub name: Option<String>,
    pub description: Option<String>,
    pub rank: i64,
    pub input_hash: Option<Fingerprint>,
    pub output_hash: Option<Fingerprint>,
    pub image_type: Option<String>,
    /// A content row exists for this case
    pub has_content: bool,
    /// The content row holds an image
    pub has_image: bool,
}

/// Column values written when a test case row is inserted or recycled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseRecord {
    pub name: String,
    pub description: Option<String>,
    pub input_hash: Fingerprint,
    pub output_hash: Fingerprint,
    pub sample: bool,
    pub image_type: Option<String>,
}

/// Bytes stored alongside a test case; the thumbnail is always reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseContent {
    pub input: Vec<u8>,
    pub output: Vec<u8>,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContestInfo {
    pub id: i64,
    pub start_time: DateTime<Utc>,
}

/// A submission row as read at transaction start
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRow {
    pub id: i64,
    pub predecessor_id: Option<i64>,
    pub team_id: i64,
    pub contest_id: i64,
    pub language: String,
    pub submit_time: DateTime<Utc>,
    pub expected_results: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFileRow {
    pub submission_id: i64,
    pub file_name: String,
    pub hash: Fingerprint,
}

/// Column values of a submission to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission<'a> {
    pub predecessor_id: Option<i64>,
    pub contest_id: i64,
    pub team_id: i64,
    pub problem_id: i64,
    pub language: &'a str,
    pub submit_time: DateTime<Utc>,
    pub expected_results: String,
}

/// Entry point to the persisted store
pub trait Store {
    /// Open a transaction scoped to one unit of work.
    fn begin(&mut self) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}

/// Reads and writes inside one store transaction
pub trait StoreTransaction {
    // Reads

    fn test_cases(&self, problem_id: i64) -> StoreResult<Vec<PersistedTestCase>>;

    /// Contests that include the problem
    fn contests_for_problem(&self, problem_id: i64) -> StoreResult<Vec<ContestInfo>>;

    /// Contests by id; unknown ids are absent from the result
    fn contests(&self, contest_ids: &[i64]) -> StoreResult<Vec<ContestInfo>>;

    fn submissions(
        &self,
        problem_id: i64,
        team_ids: &[i64],
        contest_ids: &[i64],
    ) -> StoreResult<Vec<SubmissionRow>>;

    fn submission_files(&self, submission_ids: &[i64]) -> StoreResult<Vec<SubmissionFileRow>>;

    // Test case writes

    /// Insert a test case row, returning its new id.
    fn insert_test_case(&mut self, problem_id: i64, record: &TestCaseRecord, rank: i64) -> StoreResult<i64>;

    /// Overwrite every column of a leftover row except id and rank, and clear
    /// its deleted flag.
    fn overwrite_test_case(&mut self, id: i64, record: &TestCaseRecord) -> StoreResult<()>;

    fn update_test_case_description(&mut self, id: i64, description: Option<&str>) -> StoreResult<()>;

    fn update_test_case_hashes(
        &mut self,
        id: i64,
        input_hash: &Fingerprint,
        output_hash: &Fingerprint,
        image_type: Option<&str>,
    ) -> StoreResult<()>;

    fn set_test_case_rank(&mut self, id: i64, rank: i64) -> StoreResult<()>;

    /// Replace the content row of a test case, resetting its thumbnail.
    fn write_test_case_content(&mut self, id: i64, content: &TestCaseContent) -> StoreResult<()>;

    /// Drop stored images and thumbnails, returning the number of rows changed.
    fn clear_test_case_images(&mut self, ids: &[i64]) -> StoreResult<usize>;

    fn delete_test_case_contents(&mut self, ids: &[i64]) -> StoreResult<usize>;

    fn delete_test_cases(&mut self, ids: &[i64]) -> StoreResult<usize>;

    // Submission writes

    /// Insert a submission row, returning its new id.
    fn insert_submission(&mut self, submission: &NewSubmission<'_>) -> StoreResult<i64>;

    fn insert_submission_file(
        &mut self,
        submission_id: i64,
        file_name: &str,
        rank: i64,
        source: &[u8],
    ) -> StoreResult<()>;

    fn update_submission_metadata(
        &mut self,
        id: i64,
        submit_time: DateTime<Utc>,
        expected_results: &str,
    ) -> StoreResult<()>;

    fn delete_submission_files(&mut self, submission_ids: &[i64]) -> StoreResult<usize>;

    fn delete_submissions(&mut self, submission_ids: &[i64]) -> StoreResult<usize>;

    // Boundaries

    /// Open a nested, separately confirmed step.
    fn begin_phase(&mut self, name: &str) -> StoreResult<()>;

    /// Confirm the step opened by [`StoreTransaction::begin_phase`].
    fn end_phase(&mut self, name: &str) -> StoreResult<()>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}
