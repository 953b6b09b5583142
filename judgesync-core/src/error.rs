//! Errors that abort a reconciliation run
//!
//! Every variant is raised before the enclosing transaction commits, so a
//! failed run leaves the store in its pre-run state.

use crate::content::ContentError;
use crate::store::StoreError;

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Two persisted rows share a non-empty match key
    #[error("Duplicate persisted entities for key {key}")]
    DuplicateKey { key: String },

    /// A predecessor is claimed by two successors
    #[error("Multiple successors for submission {predecessor}: {first} and {second}")]
    MultipleSuccessors {
        predecessor: i64,
        first: i64,
        second: i64,
    },

    /// Walking a lineage revisited a submission
    #[error("Cyclic submission chain through {ids:?}")]
    CyclicChain { ids: Vec<i64> },

    /// The plan does not account for every desired entity
    #[error("Expected {expected} entities in plan, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Duplicate file name {file_name:?} for submission {submission_id}")]
    DuplicateFileName { submission_id: i64, file_name: String },

    /// A desired submission lists two files of the same name
    #[error("Duplicate file name {file_name:?} in desired submission of team {team_id}")]
    DuplicateDesiredFileName { team_id: i64, file_name: String },

    #[error("Contests not found: {0:?}")]
    ContestNotFound(Vec<i64>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),
}
