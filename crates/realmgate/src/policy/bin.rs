//! Policy entries and the bins they are grouped into

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::error::{PolicyError, Result};
use crate::credential::CredentialKind;

/// Required attribute constraints, compared by exact equality
pub type RequiredAttributes = BTreeMap<String, String>;

/// One configured path with its policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub path: String,
    pub realm: String,
    /// Acceptable authentication types, in preference order
    pub authentication_types: Vec<String>,
    pub required_attributes: RequiredAttributes,
}

impl PolicyEntry {
    pub fn new<I, S>(path: impl Into<String>, realm: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            realm: realm.into(),
            authentication_types: types.into_iter().map(Into::into).collect(),
            required_attributes: RequiredAttributes::new(),
        }
    }

    #[must_use]
    pub fn with_required_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.required_attributes.insert(key.into(), value.into());
        self
    }
}

/// Canonical context path: trimmed, without a trailing `/` unless it is the root
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Same keys with the same values; subsets and supersets differ
#[must_use]
pub fn has_same_required_attributes(a: &RequiredAttributes, b: &RequiredAttributes) -> bool {
    a == b
}

/// Paths sharing one realm, authentication type list and attribute set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPolicyBin {
    pub context_paths: BTreeSet<String>,
    pub realm: String,
    pub authentication_types: Vec<String>,
    pub required_attributes: RequiredAttributes,
}

impl ContextPolicyBin {
    /// Start a bin from one entry
    #[must_use]
    pub fn from_entry(entry: PolicyEntry) -> Self {
        let mut context_paths = BTreeSet::new();
        context_paths.insert(normalize_path(&entry.path));
        Self {
            context_paths,
            realm: entry.realm,
            authentication_types: entry.authentication_types,
            required_attributes: entry.required_attributes,
        }
    }

    /// Whether `entry` belongs in this bin: equal realm, equal ordered
    /// type list, equal attribute map
    #[must_use]
    pub fn accepts(&self, entry: &PolicyEntry) -> bool {
        self.realm == entry.realm
            && self.authentication_types == entry.authentication_types
            && has_same_required_attributes(&self.required_attributes, &entry.required_attributes)
    }

    pub fn add_path(&mut self, path: &str) {
        self.context_paths.insert(normalize_path(path));
    }

    /// Authentication types that name a known credential kind, in order
    #[must_use]
    pub fn credential_kinds(&self) -> Vec<CredentialKind> {
        let mut kinds = Vec::with_capacity(self.authentication_types.len());
        for name in &self.authentication_types {
            match name.parse::<CredentialKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(e) => tracing::warn!(realm = %self.realm, error = %e, "Skipping authentication type"),
            }
        }
        kinds
    }

    /// Reject bins that could never authenticate anything
    pub fn validate(&self) -> Result<()> {
        if self.context_paths.iter().any(String::is_empty) {
            return Err(PolicyError::ConfigValidation(format!(
                "bin for realm '{}' has an empty context path",
                self.realm
            )));
        }
        if self.context_paths.is_empty() {
            return Err(PolicyError::ConfigValidation(format!(
                "bin for realm '{}' has no context paths",
                self.realm
            )));
        }
        if self.realm.trim().is_empty() {
            return Err(PolicyError::ConfigValidation(format!(
                "bin for {:?} has a blank realm",
                self.context_paths
            )));
        }
        if self.authentication_types.is_empty() {
            return Err(PolicyError::ConfigValidation(format!(
                "bin for realm '{}' has no authentication types",
                self.realm
            )));
        }
        Ok(())
    }
}

/// Group entries into bins, first match wins
///
/// Bins appear in order of first occurrence of each distinct
/// (realm, types, attributes) triple. When a path is configured more than
/// once, its last entry is the one kept.
#[must_use]
pub fn group_entries(entries: impl IntoIterator<Item = PolicyEntry>) -> Vec<ContextPolicyBin> {
    let entries: Vec<PolicyEntry> = entries.into_iter().collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries.into_iter().rev() {
        let path = normalize_path(&entry.path);
        if seen.insert(path.clone()) {
            kept.push(entry);
        } else {
            tracing::warn!(path = %path, realm = %entry.realm, "Context path configured again later, earlier entry ignored");
        }
    }
    kept.reverse();

    let mut bins: Vec<ContextPolicyBin> = Vec::new();
    for entry in kept {
        match bins.iter_mut().find(|bin| bin.accepts(&entry)) {
            Some(bin) => bin.add_path(&entry.path),
            None => bins.push(ContextPolicyBin::from_entry(entry)),
        }
    }
    bins
}
