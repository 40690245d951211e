//! Token claim sets

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims of a verified (or deliberately unverified userinfo) token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    #[must_use]
    pub const fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String-valued claim
    #[must_use]
    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn sub(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    #[must_use]
    pub fn nonce(&self) -> Option<&str> {
        self.str_claim("nonce")
    }

    #[must_use]
    pub fn at_hash(&self) -> Option<&str> {
        self.str_claim("at_hash")
    }

    /// Expiry in unix seconds
    #[must_use]
    pub fn exp(&self) -> Option<u64> {
        self.0.get("exp").and_then(Value::as_u64)
    }

    /// `preferred_username`, then `email`, then `sub`
    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        ["preferred_username", "email", "sub"]
            .into_iter()
            .find_map(|name| self.str_claim(name).filter(|v| !v.is_empty()))
    }

    /// Every string, number and boolean claim rendered as a string
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((k.clone(), value))
            })
            .collect()
    }

    /// Add claims from `other` that are not already present
    pub fn merge_missing(&mut self, other: Self) {
        for (k, v) in other.0 {
            self.0.entry(k).or_insert(v);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
