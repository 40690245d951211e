//! Configuration stores the policy is persisted through

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::error::{PolicyError, Result};

/// Property name to list of `path=value` strings
pub type PolicyProperties = BTreeMap<String, Vec<String>>;

/// Per-property outcome of a commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub results: BTreeMap<String, bool>,
}

impl CommitReport {
    /// Every key of `properties` marked as committed
    #[must_use]
    pub fn all_committed(properties: &PolicyProperties) -> Self {
        Self {
            results: properties.keys().map(|k| (k.clone(), true)).collect(),
        }
    }

    /// Keys that failed to commit
    #[must_use]
    pub fn failed(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(k, _)| k.clone())
            .collect()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }
}

/// Atomic multi-property configuration storage
pub trait ConfigStore: Send + Sync + fmt::Debug {
    /// Current properties; an absent store is empty
    fn load(&self) -> Result<PolicyProperties>;

    /// Replace the given properties all at once
    fn commit(&self, properties: &PolicyProperties) -> Result<CommitReport>;
}

/// TOML file store
///
/// Commits write `<file>.tmp` and rename it over the target, so readers
/// see either the old or the new policy.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<PolicyProperties> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Policy file absent, starting empty");
            return Ok(PolicyProperties::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            PolicyError::Store(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    fn commit(&self, properties: &PolicyProperties) -> Result<CommitReport> {
        let mut merged = self.load()?;
        for (key, values) in properties {
            merged.insert(key.clone(), values.clone());
        }

        let content = toml::to_string(&merged)
            .map_err(|e| PolicyError::Store(format!("failed to serialize policy: {e}")))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, content)?;
        fs::rename(&temp, &self.path)?;

        tracing::info!(path = %self.path.display(), keys = properties.len(), "Policy committed");
        Ok(CommitReport::all_committed(properties))
    }
}

/// In-memory store
///
/// Keys registered with [`MemoryConfigStore::with_failing_key`] report a
/// failed commit, and a commit with any failure changes nothing.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    properties: Mutex<PolicyProperties>,
    failing_keys: BTreeSet<String>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_properties(properties: PolicyProperties) -> Self {
        Self {
            properties: Mutex::new(properties),
            failing_keys: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> PolicyProperties {
        self.properties.lock().clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<PolicyProperties> {
        Ok(self.snapshot())
    }

    fn commit(&self, properties: &PolicyProperties) -> Result<CommitReport> {
        let report = CommitReport {
            results: properties
                .keys()
                .map(|k| (k.clone(), !self.failing_keys.contains(k)))
                .collect(),
        };
        if report.is_success() {
            let mut stored = self.properties.lock();
            for (key, values) in properties {
                stored.insert(key.clone(), values.clone());
            }
        }
        Ok(report)
    }
}
