//! Projection of stored credentials into configuration key/value pairs
//!
//! Each generic record becomes two entries:
//!
//! ```text
//! {prefix_tag}:{target without identity prefix}:{username_tag} = username
//! {prefix_tag}:{target without identity prefix}:{password_tag} = password
//! ```
//!
//! Keys that collide within one load keep the value of the later record.

use crate::constants::{DEFAULT_PASSWORD_TAG, DEFAULT_PREFIX_TAG, DEFAULT_USERNAME_TAG};
use crate::core::CredentialStore;
use crate::normalize::{configuration_key, strip_identity_prefix};
use crate::utils::CredentialError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// Key segments used when projecting records
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionOptions {
    pub prefix_tag: String,
    pub username_tag: String,
    pub password_tag: String,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        ProjectionOptions {
            prefix_tag: DEFAULT_PREFIX_TAG.to_string(),
            username_tag: DEFAULT_USERNAME_TAG.to_string(),
            password_tag: DEFAULT_PASSWORD_TAG.to_string(),
        }
    }
}

/// Ordered key/value map with last-write-wins inserts
///
/// Keys keep the position of their first insertion. Values are zeroed on
/// drop since they include passwords.
#[derive(Default)]
pub struct ConfigurationData {
    entries: Vec<(String, Zeroizing<String>)>,
    index: HashMap<String, usize>,
}

impl ConfigurationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key
    ///
    /// Returns `true` when an existing value was replaced.
    pub fn insert(&mut self, key: String, value: impl Into<String>) -> bool {
        let value = Zeroizing::new(value.into());
        match self.index.get(&key) {
            Some(&slot) => {
                self.entries[slot].1 = value;
                true
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Merge another map into this one; `other` wins on collisions
    pub fn merge(&mut self, other: ConfigurationData) {
        for (key, value) in other.entries {
            self.insert(key, value.as_str());
        }
    }
}

impl fmt::Debug for ConfigurationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SECURITY: keys only
        f.debug_set().entries(self.keys()).finish()
    }
}

/// Something that contributes key/value pairs to the aggregate configuration
pub trait ConfigurationSource {
    fn load(&self) -> Result<ConfigurationData, CredentialError>;

    /// Load and merge into an existing aggregate
    fn load_into(&self, aggregate: &mut ConfigurationData) -> Result<(), CredentialError> {
        aggregate.merge(self.load()?);
        Ok(())
    }
}

/// Configuration source backed by a credential store
pub struct CredentialConfigurationProvider<S: CredentialStore> {
    store: S,
    identity_prefix: Option<String>,
    options: ProjectionOptions,
}

impl<S: CredentialStore> CredentialConfigurationProvider<S> {
    /// Project every generic record whose target starts with `identity_prefix`
    ///
    /// `None` or an empty prefix projects all generic records unchanged.
    pub fn new(store: S, identity_prefix: Option<String>) -> Self {
        CredentialConfigurationProvider {
            store,
            identity_prefix: identity_prefix.filter(|prefix| !prefix.is_empty()),
            options: ProjectionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProjectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn identity_prefix(&self) -> Option<&str> {
        self.identity_prefix.as_deref()
    }
}

impl<S: CredentialStore> ConfigurationSource for CredentialConfigurationProvider<S> {
    fn load(&self) -> Result<ConfigurationData, CredentialError> {
        let prefix = self.identity_prefix.as_deref();
        let records = self.store.enumerate(prefix.unwrap_or(""))?;

        let mut data = ConfigurationData::new();
        for record in records {
            let name = strip_identity_prefix(&record.target, prefix);
            let username_key =
                configuration_key(&self.options.prefix_tag, name, &self.options.username_tag);
            let password_key =
                configuration_key(&self.options.prefix_tag, name, &self.options.password_tag);

            if data.insert(username_key, record.username.as_str()) {
                debug!("Key for '{}' overwritten by a later record", record.target);
            }
            data.insert(password_key, record.password.to_plaintext().as_str());
        }

        debug!("Projected {} configuration entries", data.len());
        Ok(data)
    }
}
