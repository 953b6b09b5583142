//! Reconciler configuration
//!
//! Stored as JSON (by default `judgesync.json` next to the database). Every
//! field has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration passed to the reconciler at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Name prefixes ordering test cases, first tier first. Names matching no
    /// prefix sort after every tier.
    #[serde(default = "default_case_order")]
    pub case_order: Vec<String>,
    /// Prefix marking a test case as a sample when the description is silent
    #[serde(default = "default_sample_prefix")]
    pub sample_prefix: String,
    /// Maximum stored description length, in characters
    #[serde(default = "default_description_limit")]
    pub description_limit: usize,
}

fn default_case_order() -> Vec<String> {
    ["sample", "tiny", "small", "medium", "large", "huge", "xlarge", "special", "sparse"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sample_prefix() -> String {
    "sample".to_string()
}

fn default_description_limit() -> usize {
    255
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            case_order: default_case_order(),
            sample_prefix: default_sample_prefix(),
            description_limit: default_description_limit(),
        }
    }
}

impl ReconcileConfig {
    /// Load config from a JSON file, falling back to defaults if it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: ReconcileConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config JSON {:?}", path))?;
        Ok(config)
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Ordering key of a test case name: tier index, then the rest of the name.
    pub fn case_order_key<'n>(&self, name: &'n str) -> (usize, &'n str) {
        for (tier, prefix) in self.case_order.iter().enumerate() {
            if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                return (tier, rest);
            }
        }
        tracing::debug!("Case {} name does not start with a regular key", name);
        (self.case_order.len(), name)
    }

    pub fn is_sample_name(&self, name: &str) -> bool {
        name.starts_with(&self.sample_prefix)
    }
}
