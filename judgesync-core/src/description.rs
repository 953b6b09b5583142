//! Problem description manifests
//!
//! A problem directory carries a `problem.json` listing its test cases and
//! jury submissions. Paths are relative to the manifest. Fingerprints are
//! computed here; the bytes themselves are only read again when written.
//!
//! ```json
//! {
//!   "problem": "hello",
//!   "name": "Hello World",
//!   "test_cases": [
//!     {"name": "sample/1", "input": "data/sample/1.in", "output": "data/sample/1.ans"}
//!   ],
//!   "submissions": [
//!     {"team": "jury", "language": "py3", "files": ["submissions/accepted/main.py"], "expected": ["correct"]}
//!   ]
//! }
//! ```

use crate::config::ReconcileConfig;
use crate::content::ContentSource;
use crate::model::{DesiredSubmission, DesiredTestCase, SubmissionFile, TestCaseImage, Verdict};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct TestCaseEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub image: Option<PathBuf>,
    /// Overrides the sample prefix rule
    #[serde(default)]
    pub sample: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionEntry {
    pub team: String,
    pub language: String,
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub expected: BTreeSet<Verdict>,
}

/// A parsed `problem.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemDescription {
    /// External id of the problem
    pub problem: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseEntry>,
    #[serde(default)]
    pub submissions: Vec<SubmissionEntry>,
    #[serde(skip)]
    root: PathBuf,
}

impl ProblemDescription {
    /// Load a manifest file, or `problem.json` inside a directory.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest = if path.is_dir() { path.join("problem.json") } else { path.to_path_buf() };
        let data = fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read problem description {:?}", manifest))?;
        let mut description: ProblemDescription = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse problem description {:?}", manifest))?;
        description.root = manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::debug!(
            "Loaded problem {} with {} test cases and {} submissions",
            description.problem,
            description.test_cases.len(),
            description.submissions.len()
        );
        Ok(description)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.problem)
    }

    fn source(&self, relative: &Path) -> ContentSource {
        ContentSource::file(self.root.join(relative))
    }

    /// Desired test cases, in manifest order.
    pub fn test_cases(&self, config: &ReconcileConfig) -> Result<Vec<DesiredTestCase>> {
        self.test_cases
            .iter()
            .map(|entry| -> Result<DesiredTestCase> {
                if entry.name.trim().is_empty() {
                    bail!("Test case with input {:?} has an empty name", entry.input);
                }
                let input = self.source(&entry.input);
                let output = self.source(&entry.output);
                let image = match &entry.image {
                    Some(path) => {
                        let extension = path
                            .extension()
                            .and_then(|e| e.to_str())
                            .ok_or_else(|| anyhow!("Image {:?} of {} has no extension", path, entry.name))?;
                        Some(TestCaseImage {
                            extension: extension.to_ascii_lowercase(),
                            source: self.source(path),
                        })
                    }
                    None => None,
                };
                Ok(DesiredTestCase {
                    unique_name: entry.name.clone(),
                    description: entry.description.clone(),
                    input_hash: input.fingerprint()?,
                    output_hash: output.fingerprint()?,
                    is_sample: entry.sample.unwrap_or_else(|| config.is_sample_name(&entry.name)),
                    input,
                    output,
                    image,
                })
            })
            .collect()
    }

    /// Team names used by the jury submissions
    pub fn team_names(&self) -> BTreeSet<&str> {
        self.submissions.iter().map(|s| s.team.as_str()).collect()
    }

    /// Desired submissions, with teams resolved through `team_ids`.
    pub fn submissions(&self, team_ids: &HashMap<String, i64>) -> Result<Vec<DesiredSubmission>> {
        let mut submissions = Vec::with_capacity(self.submissions.len());
        for entry in &self.submissions {
            let team_id = *team_ids
                .get(&entry.team)
                .ok_or_else(|| anyhow!("Unknown team {}", entry.team))?;
            if entry.files.is_empty() {
                bail!("Submission by {} in {} has no files", entry.team, entry.language);
            }
            let mut files: Vec<SubmissionFile> = Vec::with_capacity(entry.files.len());
            for path in &entry.files {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("Invalid submission file {:?}", path))?;
                if files.iter().any(|f| f.name == name) {
                    bail!("Submission by {} lists {} twice", entry.team, name);
                }
                let source = self.source(path);
                files.push(SubmissionFile {
                    name: name.to_string(),
                    hash: source.fingerprint()?,
                    source,
                });
            }
            submissions.push(DesiredSubmission {
                team_id,
                language: entry.language.clone(),
                files,
                expected: entry.expected.clone(),
            });
        }
        Ok(submissions)
    }
}
