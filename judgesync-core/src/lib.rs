//! JudgeSync Core Library
//!
//! Reconciles a file-based problem description against a judge database:
//! - Content fingerprints and the entity model (test cases, submissions)
//! - Key matching, leftover recycling and two-phase rank reassignment
//! - Submission lineages (revision chains) with cycle detection
//! - Test case and submission planners, and the executor applying their plans
//! - Store abstraction with an SQLite implementation (rusqlite)
//! - JSON problem descriptions and reconciler configuration

pub mod fingerprint;
pub mod model;
pub mod error;
pub mod config;
pub mod content;
pub mod matcher;
pub mod rank;
pub mod recycle;
pub mod chain;
pub mod store;
pub mod sqlite_store;
pub mod testcase_plan;
pub mod submission_plan;
pub mod executor;
pub mod reconcile;
pub mod description;

pub use chain::{resolve_chains, ChainResolution, Lineage, RevisionGroup};
pub use config::ReconcileConfig;
pub use content::{ContentError, ContentProvider, ContentSource, SourceLoader};
pub use description::ProblemDescription;
pub use error::{ReconcileError, Result};
pub use fingerprint::Fingerprint;
pub use matcher::{match_by_key, KeyMatch};
pub use model::{
    DesiredSubmission, DesiredTestCase, GroupKey, InvalidExpectedOutcome, PersistedSubmission, SubmissionFile,
    Summary, TestCaseImage, Verdict, Warning,
};
pub use rank::{plan_ranks, RankAssignment, RankEntry, RankPhaseOne, RankPhaseTwo, RankPlan};
pub use reconcile::Reconciler;
pub use recycle::{recycle, Recycled};
pub use sqlite_store::{SqliteStore, SqliteTransaction};
pub use store::{
    ContestInfo, NewSubmission, PersistedTestCase, Store, StoreError, StoreResult, StoreTransaction,
    SubmissionFileRow, SubmissionRow, TestCaseContent, TestCaseRecord,
};
pub use submission_plan::{SubmissionOperation, SubmissionPlan};
pub use testcase_plan::{RowRef, TestCaseOperation, TestCasePlan};
