//! Explicit map from credential kind to validator

use std::collections::HashMap;
use std::sync::Arc;

use super::TokenValidator;
use crate::credential::CredentialKind;

/// Validator lookup by credential kind
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<CredentialKind, Arc<dyn TokenValidator>>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator under its own kind, replacing any previous one
    pub fn register(&mut self, validator: Arc<dyn TokenValidator>) {
        let kind = validator.kind();
        if self.validators.insert(kind, validator).is_some() {
            tracing::warn!(kind = %kind, "Replacing previously registered validator");
        }
    }

    #[must_use]
    pub fn with(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.register(validator);
        self
    }

    #[must_use]
    pub fn get(&self, kind: CredentialKind) -> Option<&Arc<dyn TokenValidator>> {
        self.validators.get(&kind)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<CredentialKind> {
        let mut kinds: Vec<_> = self.validators.keys().copied().collect();
        kinds.sort();
        kinds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
