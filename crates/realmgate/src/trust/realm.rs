//! In-memory realm backed by a static user table

use std::collections::HashMap;
use std::fmt;

use subtle::ConstantTimeEq;

use super::{RealmError, RealmLogin};

struct StaticUser {
    password: String,
    attributes: HashMap<String, String>,
}

/// Realm with a fixed username/password table
///
/// Passwords are compared in constant time. Intended for tests and small
/// deployments that keep users in the config file.
pub struct StaticRealm {
    name: String,
    users: HashMap<String, StaticUser>,
}

impl fmt::Debug for StaticRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRealm")
            .field("name", &self.name)
            .field("user_count", &self.users.len())
            .finish_non_exhaustive()
    }
}

impl StaticRealm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_user_attributes(username, password, HashMap::new())
    }

    #[must_use]
    pub fn with_user_attributes(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        attributes: HashMap<String, String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            StaticUser {
                password: password.into(),
                attributes,
            },
        );
        self
    }

    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl RealmLogin for StaticRealm {
    fn name(&self) -> &str {
        &self.name
    }

    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<HashMap<String, String>>, RealmError> {
        let Some(user) = self.users.get(username) else {
            return Ok(None);
        };

        let matches: bool = user
            .password
            .as_bytes()
            .ct_eq(password.as_bytes())
            .into();

        Ok(matches.then(|| user.attributes.clone()))
    }
}
