//! Path to policy resolution

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::bin::{
    ContextPolicyBin, PolicyEntry, RequiredAttributes, group_entries, normalize_path,
};
use super::error::{PolicyError, Result};
use super::store::{ConfigStore, PolicyProperties};
use crate::constants::{
    AUTH_TYPES_KEY, REALMS_KEY, REQUIRED_ATTRIBUTES_KEY, WHITE_LIST_CONTEXTS_KEY,
};

/// Outcome of resolving a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Path is covered by a policy bin
    Bin(Arc<ContextPolicyBin>),
    /// Path needs no authentication
    Whitelisted,
    /// No bin or whitelist entry covers the path
    Unprotected,
}

/// Immutable set of bins plus the whitelist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    pub bins: Vec<Arc<ContextPolicyBin>>,
    pub whitelist: Vec<String>,
}

/// How well `pattern` covers `path`
///
/// An exact match ranks above any prefix. A prefix must end at a segment
/// boundary, so `/a` covers `/a/b` but not `/ab`. `/` covers everything.
fn match_rank(pattern: &str, path: &str) -> Option<usize> {
    if pattern == path {
        return Some(usize::MAX);
    }
    let prefix = pattern.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/').then_some(0);
    }
    path.strip_prefix(prefix)
        .filter(|rest| rest.starts_with('/'))
        .map(|_| prefix.len())
}

impl PolicySnapshot {
    /// Group `entries` into bins
    #[must_use]
    pub fn from_entries(
        entries: impl IntoIterator<Item = PolicyEntry>,
        whitelist: Vec<String>,
    ) -> Self {
        Self {
            bins: group_entries(entries).into_iter().map(Arc::new).collect(),
            whitelist: normalize_whitelist(&whitelist),
        }
    }

    /// Every bin valid, and no context path in more than one bin
    pub fn validate(&self) -> Result<()> {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for bin in &self.bins {
            bin.validate()?;
            for path in &bin.context_paths {
                if let Some(other) = owners.insert(path.as_str(), bin.realm.as_str()) {
                    return Err(PolicyError::ConfigValidation(format!(
                        "context path {path} is in two bins (realms '{other}' and '{}')",
                        bin.realm
                    )));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn resolve(&self, path: &str) -> Resolution {
        let best_bin = self
            .bins
            .iter()
            .filter_map(|bin| {
                bin.context_paths
                    .iter()
                    .filter_map(|p| match_rank(p, path))
                    .max()
                    .map(|rank| (rank, bin))
            })
            .max_by_key(|(rank, _)| *rank);

        let best_white = self
            .whitelist
            .iter()
            .filter_map(|p| match_rank(p, path))
            .max();

        match (best_bin, best_white) {
            (Some((bin_rank, _)), Some(white_rank)) if white_rank >= bin_rank => {
                Resolution::Whitelisted
            }
            (Some((_, bin)), _) => Resolution::Bin(Arc::clone(bin)),
            (None, Some(_)) => Resolution::Whitelisted,
            (None, None) => Resolution::Unprotected,
        }
    }

    /// Flatten into persisted property lists
    #[must_use]
    pub fn to_properties(&self) -> PolicyProperties {
        let mut realms = Vec::new();
        let mut types = Vec::new();
        let mut attributes = Vec::new();

        for bin in &self.bins {
            let joined_types = bin.authentication_types.join("|");
            let joined_attrs = format_attributes(&bin.required_attributes);
            for path in &bin.context_paths {
                realms.push(format!("{path}={}", bin.realm));
                types.push(format!("{path}={joined_types}"));
                attributes.push(format!("{path}={joined_attrs}"));
            }
        }

        let mut properties = PolicyProperties::new();
        properties.insert(AUTH_TYPES_KEY.to_string(), types);
        properties.insert(REALMS_KEY.to_string(), realms);
        properties.insert(REQUIRED_ATTRIBUTES_KEY.to_string(), attributes);
        properties.insert(WHITE_LIST_CONTEXTS_KEY.to_string(), self.whitelist.clone());
        properties
    }

    /// Rebuild from persisted property lists
    ///
    /// Paths are taken from the realm list in order, a repeated path keeping
    /// its last line. A path without an authentication type entry is
    /// malformed; a missing attribute entry means no required attributes.
    /// The result must pass [`PolicySnapshot::validate`].
    pub fn from_properties(properties: &PolicyProperties) -> Result<Self> {
        let mut types: HashMap<&str, Vec<String>> = HashMap::new();
        for line in property_list(properties, AUTH_TYPES_KEY) {
            let (path, value) = split_line(AUTH_TYPES_KEY, line)?;
            let kinds = value
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            types.insert(path, kinds);
        }

        let mut attributes: HashMap<&str, RequiredAttributes> = HashMap::new();
        for line in property_list(properties, REQUIRED_ATTRIBUTES_KEY) {
            let (path, value) = split_line(REQUIRED_ATTRIBUTES_KEY, line)?;
            attributes.insert(path, parse_attributes(line, value)?);
        }

        let mut entries = Vec::new();
        for line in property_list(properties, REALMS_KEY) {
            let (path, realm) = split_line(REALMS_KEY, line)?;
            let authentication_types = types.get(path).cloned().ok_or_else(|| {
                PolicyError::Malformed {
                    key: AUTH_TYPES_KEY.to_string(),
                    value: format!("no entry for {path}"),
                }
            })?;
            entries.push(PolicyEntry {
                path: path.to_string(),
                realm: realm.to_string(),
                authentication_types,
                required_attributes: attributes.get(path).cloned().unwrap_or_default(),
            });
        }

        let whitelist = property_list(properties, WHITE_LIST_CONTEXTS_KEY).to_vec();

        let snapshot = Self::from_entries(entries, whitelist);
        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn normalize_whitelist(whitelist: &[String]) -> Vec<String> {
    whitelist
        .iter()
        .map(|p| normalize_path(p))
        .filter(|p| !p.is_empty())
        .collect()
}

fn property_list<'a>(properties: &'a PolicyProperties, key: &str) -> &'a [String] {
    properties.get(key).map_or(&[], Vec::as_slice)
}

fn split_line<'a>(key: &str, line: &'a str) -> Result<(&'a str, &'a str)> {
    line.split_once('=')
        .map(|(path, value)| (path.trim(), value.trim()))
        .filter(|(path, _)| !path.is_empty())
        .ok_or_else(|| PolicyError::Malformed {
            key: key.to_string(),
            value: line.to_string(),
        })
}

fn format_attributes(attributes: &RequiredAttributes) -> String {
    if attributes.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = attributes.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(";"))
}

fn parse_attributes(line: &str, value: &str) -> Result<RequiredAttributes> {
    let inner = value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value);

    let mut attributes = RequiredAttributes::new();
    for pair in inner.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').ok_or_else(|| PolicyError::Malformed {
            key: REQUIRED_ATTRIBUTES_KEY.to_string(),
            value: line.to_string(),
        })?;
        attributes.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(attributes)
}

/// Resolves request paths against the current policy
///
/// The policy sits behind an `ArcSwap`: `resolve` never blocks, and a
/// reload or persist swaps in a whole new snapshot.
#[derive(Debug, Default)]
pub struct ContextPolicyEngine {
    snapshot: ArcSwap<PolicySnapshot>,
}

impl ContextPolicyEngine {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = PolicyEntry>, whitelist: Vec<String>) -> Self {
        Self::from_snapshot(PolicySnapshot::from_entries(entries, whitelist))
    }

    #[must_use]
    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Build from persisted properties
    pub fn load(properties: &PolicyProperties) -> Result<Self> {
        Ok(Self::from_snapshot(PolicySnapshot::from_properties(properties)?))
    }

    /// Build from whatever `store` currently holds
    pub fn from_store(store: &dyn ConfigStore) -> Result<Self> {
        Self::load(&store.load()?)
    }

    /// Current policy (lock-free read)
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.load_full()
    }

    #[must_use]
    pub fn resolve(&self, path: &str) -> Resolution {
        let resolution = self.snapshot.load().resolve(path);
        tracing::debug!(
            path = %path,
            realm = match &resolution {
                Resolution::Bin(bin) => bin.realm.as_str(),
                _ => "",
            },
            whitelisted = matches!(resolution, Resolution::Whitelisted),
            "Resolved context policy"
        );
        resolution
    }

    /// Swap in policy re-read from `store`
    pub fn reload(&self, store: &dyn ConfigStore) -> Result<()> {
        let snapshot = PolicySnapshot::from_properties(&store.load()?)?;
        tracing::info!(bins = snapshot.bins.len(), "Context policy reloaded");
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Validate, commit through `store`, then swap in the new policy
    ///
    /// Paths are normalized first; a path left in two bins is rejected.
    /// Nothing changes in memory unless every property committed.
    pub fn persist(
        &self,
        bins: Vec<ContextPolicyBin>,
        whitelist: Vec<String>,
        store: &dyn ConfigStore,
    ) -> Result<()> {
        let snapshot = PolicySnapshot {
            bins: bins
                .into_iter()
                .map(|mut bin| {
                    bin.context_paths = bin.context_paths.iter().map(|p| normalize_path(p)).collect();
                    Arc::new(bin)
                })
                .collect(),
            whitelist: normalize_whitelist(&whitelist),
        };
        snapshot.validate()?;

        let report = store.commit(&snapshot.to_properties())?;
        let failed = report.failed();
        if !failed.is_empty() {
            tracing::error!(failed = ?failed, "Policy commit rejected by config store");
            return Err(PolicyError::Persist { failed });
        }

        tracing::info!(bins = snapshot.bins.len(), "Context policy persisted");
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::store::MemoryConfigStore;

    fn engine() -> ContextPolicyEngine {
        ContextPolicyEngine::new(
            [
                PolicyEntry::new("/", "karaf", ["BASIC"]),
                PolicyEntry::new("/services", "karaf", ["PKI", "BASIC"]),
                PolicyEntry::new("/services/admin", "admin", ["BASIC"])
                    .with_required_attribute("role", "admin"),
            ],
            vec!["/services/public".into(), "/favicon.ico".into()],
        )
    }

    fn realm_of(resolution: &Resolution) -> Option<&str> {
        match resolution {
            Resolution::Bin(bin) => Some(bin.realm.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_match_rank() {
        assert_eq!(match_rank("/a", "/a"), Some(usize::MAX));
        assert_eq!(match_rank("/a", "/a/b"), Some(2));
        assert_eq!(match_rank("/a/", "/a/b"), Some(2));
        assert_eq!(match_rank("/a", "/ab"), None);
        assert_eq!(match_rank("/", "/anything"), Some(0));
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let engine = engine();
        assert_eq!(realm_of(&engine.resolve("/services/admin/users")), Some("admin"));
        assert_eq!(realm_of(&engine.resolve("/services/csw")), Some("karaf"));
        assert_eq!(realm_of(&engine.resolve("/servicesx")), Some("karaf"));

        let Resolution::Bin(bin) = engine.resolve("/services/csw") else {
            panic!("expected bin");
        };
        assert_eq!(bin.authentication_types, vec!["PKI", "BASIC"]);
    }

    #[test]
    fn test_resolve_whitelist() {
        let engine = engine();
        assert_eq!(engine.resolve("/services/public/logo.png"), Resolution::Whitelisted);
        assert_eq!(engine.resolve("/favicon.ico"), Resolution::Whitelisted);
    }

    #[test]
    fn test_exact_bin_beats_whitelist_prefix() {
        let engine = ContextPolicyEngine::new(
            [PolicyEntry::new("/open/secret", "karaf", ["BASIC"])],
            vec!["/open".into()],
        );
        assert_eq!(realm_of(&engine.resolve("/open/secret")), Some("karaf"));
        assert_eq!(engine.resolve("/open/other"), Resolution::Whitelisted);
    }

    #[test]
    fn test_unprotected_without_root_bin() {
        let engine =
            ContextPolicyEngine::new([PolicyEntry::new("/admin", "karaf", ["BASIC"])], vec![]);
        assert_eq!(engine.resolve("/search"), Resolution::Unprotected);
    }

    #[test]
    fn test_properties_format() {
        let props = engine().snapshot().to_properties();
        assert!(props[REALMS_KEY].contains(&"/services/admin=admin".to_string()));
        assert!(props[AUTH_TYPES_KEY].contains(&"/services=PKI|BASIC".to_string()));
        assert!(props[REQUIRED_ATTRIBUTES_KEY].contains(&"/=".to_string()));
        assert!(
            props[REQUIRED_ATTRIBUTES_KEY].contains(&"/services/admin={role=admin}".to_string())
        );
        assert_eq!(props[WHITE_LIST_CONTEXTS_KEY].len(), 2);
    }

    #[test]
    fn test_load_inverts_properties() {
        let original = engine();
        let loaded = ContextPolicyEngine::load(&original.snapshot().to_properties()).unwrap();
        assert_eq!(loaded.snapshot().bins, original.snapshot().bins);
        assert_eq!(loaded.snapshot().whitelist, original.snapshot().whitelist);
    }

    #[test]
    fn test_load_rejects_path_without_types() {
        let mut props = PolicyProperties::new();
        props.insert(REALMS_KEY.into(), vec!["/=karaf".into()]);
        let err = ContextPolicyEngine::load(&props).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_load_rejects_blank_realm() {
        let mut props = PolicyProperties::new();
        props.insert(REALMS_KEY.into(), vec!["/x=".into()]);
        props.insert(AUTH_TYPES_KEY.into(), vec!["/x=BASIC".into()]);
        let err = ContextPolicyEngine::load(&props).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_load_rejects_empty_type_list() {
        let mut props = PolicyProperties::new();
        props.insert(REALMS_KEY.into(), vec!["/x=karaf".into()]);
        props.insert(AUTH_TYPES_KEY.into(), vec!["/x= | ".into()]);
        assert!(ContextPolicyEngine::load(&props).unwrap_err().is_validation());
    }

    #[test]
    fn test_load_repeated_path_keeps_last_line() {
        let mut props = PolicyProperties::new();
        props.insert(
            REALMS_KEY.into(),
            vec!["/x=a".into(), "/y=a".into(), "/x=b".into()],
        );
        props.insert(
            AUTH_TYPES_KEY.into(),
            vec!["/x=BASIC".into(), "/y=BASIC".into()],
        );
        let engine = ContextPolicyEngine::load(&props).unwrap();
        assert_eq!(engine.snapshot().bins.len(), 2);
        assert_eq!(realm_of(&engine.resolve("/x")), Some("b"));
        assert_eq!(realm_of(&engine.resolve("/y/z")), Some("a"));
    }

    #[test]
    fn test_new_repeated_path_is_in_one_bin() {
        let engine = ContextPolicyEngine::new(
            [
                PolicyEntry::new("/x", "a", ["BASIC"]),
                PolicyEntry::new("/x", "b", ["PKI"]),
            ],
            vec![],
        );
        assert_eq!(engine.snapshot().bins.len(), 1);
        assert_eq!(realm_of(&engine.resolve("/x")), Some("b"));
        assert!(engine.snapshot().validate().is_ok());
    }

    #[test]
    fn test_persist_rejects_path_in_two_bins() {
        let store = MemoryConfigStore::new();
        let engine = engine();
        let bins = vec![
            ContextPolicyBin::from_entry(PolicyEntry::new("/x", "a", ["BASIC"])),
            ContextPolicyBin::from_entry(PolicyEntry::new("/x/", "b", ["PKI"])),
        ];

        let err = engine.persist(bins, vec![], &store).unwrap_err();
        assert!(err.is_validation());
        assert!(store.snapshot().is_empty());
        assert_eq!(realm_of(&engine.resolve("/services/csw")), Some("karaf"));
    }

    #[test]
    fn test_trailing_slash_paths_match_on_segment_boundary() {
        let engine = ContextPolicyEngine::new(
            [PolicyEntry::new("/api/", "karaf", ["BASIC"])],
            vec!["/api/docs/".into()],
        );
        assert_eq!(realm_of(&engine.resolve("/api")), Some("karaf"));
        assert_eq!(realm_of(&engine.resolve("/api/x")), Some("karaf"));
        assert_eq!(engine.resolve("/api/docs"), Resolution::Whitelisted);
        assert_eq!(engine.resolve("/apix"), Resolution::Unprotected);
    }

    #[test]
    fn test_persist_validates_bins() {
        let store = MemoryConfigStore::new();
        let engine = engine();
        let mut bad = ContextPolicyBin::from_entry(PolicyEntry::new("/x", "", ["BASIC"]));
        bad.realm = " ".into();

        let err = engine.persist(vec![bad], vec![], &store).unwrap_err();
        assert_eq!(err.kind(), crate::validation::ErrorKind::ConfigValidationError);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_persist_failure_keeps_current_policy() {
        let store = MemoryConfigStore::new().with_failing_key(WHITE_LIST_CONTEXTS_KEY);
        let engine = engine();
        let bins = vec![ContextPolicyBin::from_entry(PolicyEntry::new("/", "ldap", ["BASIC"]))];

        let err = engine.persist(bins, vec![], &store).unwrap_err();
        assert_eq!(err.kind(), crate::validation::ErrorKind::PersistFailure);
        assert_eq!(realm_of(&engine.resolve("/services/csw")), Some("karaf"));
    }

    #[test]
    fn test_persist_then_reload() {
        let store = MemoryConfigStore::new();
        let engine = engine();
        let bins = vec![ContextPolicyBin::from_entry(PolicyEntry::new("/", "ldap", ["OIDC"]))];
        engine.persist(bins, vec!["/health".into()], &store).unwrap();
        assert_eq!(realm_of(&engine.resolve("/services/csw")), Some("ldap"));

        let other = ContextPolicyEngine::from_store(&store).unwrap();
        assert_eq!(other.resolve("/health"), Resolution::Whitelisted);
        assert_eq!(realm_of(&other.resolve("/x")), Some("ldap"));

        other.reload(&store).unwrap();
        assert_eq!(other.snapshot().bins.len(), 1);
    }
}
