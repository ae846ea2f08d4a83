//! Platform-agnostic credential storage trait

use crate::models::CredentialRecord;
use crate::normalize::starts_with_prefix;
use crate::utils::CredentialError;

/// Platform-agnostic credential storage
///
/// Implementations adapt a backing secret store (Windows Credential Manager,
/// an in-memory store for tests, ...) that offers single-record read, write,
/// delete and prefix enumeration for the calling principal.
///
/// Every call acquires whatever native memory it needs and releases it before
/// returning; no native resource outlives a call.
pub trait CredentialStore: Send + Sync {
    /// Read one generic credential
    ///
    /// # Returns
    /// * `Ok(record)` - If a record with that target exists
    /// * `Err(CredentialError::NotFound)` - If it does not
    /// * `Err(CredentialError::Read)` - If the store call failed
    fn read(&self, target: &str) -> Result<CredentialRecord, CredentialError>;

    /// Create or overwrite the record at `record.target`
    ///
    /// # Security
    /// - MUST NOT log password values
    /// - The persistence tier is taken from the record
    fn write(&self, record: &CredentialRecord) -> Result<(), CredentialError>;

    /// Delete one generic credential
    ///
    /// Deleting a missing target is reported as `CredentialError::Delete`,
    /// not treated as success.
    fn delete(&self, target: &str) -> Result<(), CredentialError>;

    /// List generic credentials whose target starts with `prefix`
    ///
    /// An empty prefix lists everything. Records of other types are skipped.
    fn enumerate(&self, prefix: &str) -> Result<CredentialRecords, CredentialError>;

    /// Check if a target exists
    fn exists(&self, target: &str) -> Result<bool, CredentialError> {
        match self.read(target) {
            Ok(_) => Ok(true),
            Err(CredentialError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for &S {
    fn read(&self, target: &str) -> Result<CredentialRecord, CredentialError> {
        (**self).read(target)
    }

    fn write(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        (**self).write(record)
    }

    fn delete(&self, target: &str) -> Result<(), CredentialError> {
        (**self).delete(target)
    }

    fn enumerate(&self, prefix: &str) -> Result<CredentialRecords, CredentialError> {
        (**self).enumerate(prefix)
    }
}

/// Records produced by one enumeration
///
/// Materialized once per call and consumed once; iterating it again
/// requires a new `enumerate` call.
#[derive(Debug, Default)]
pub struct CredentialRecords {
    inner: std::vec::IntoIter<CredentialRecord>,
}

impl CredentialRecords {
    /// Keep generic records whose target matches `prefix`, in store order
    pub fn from_native(records: Vec<CredentialRecord>, prefix: &str) -> Self {
        let kept: Vec<CredentialRecord> = records
            .into_iter()
            .filter(|record| record.credential_type.is_generic())
            .filter(|record| starts_with_prefix(&record.target, prefix))
            .collect();
        CredentialRecords {
            inner: kept.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl Iterator for CredentialRecords {
    type Item = CredentialRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for CredentialRecords {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CredentialType, SecureBuffer};

    fn record(target: &str, credential_type: CredentialType) -> CredentialRecord {
        CredentialRecord::generic(target, "user", SecureBuffer::from_plaintext("pw"))
            .with_type(credential_type)
    }

    #[test]
    fn from_native_skips_other_types_and_prefixes() {
        let records = CredentialRecords::from_native(
            vec![
                record("AppX:db", CredentialType::Generic),
                record("AppX:dc", CredentialType::DomainPassword),
                record("AppY:db", CredentialType::Generic),
                record("appx:cache", CredentialType::Generic),
            ],
            "AppX:",
        );
        assert_eq!(records.len(), 2);
        let targets: Vec<String> = records.map(|r| r.target).collect();
        assert_eq!(targets, vec!["AppX:db", "appx:cache"]);
    }

    #[test]
    fn empty_prefix_keeps_all_generic() {
        let records = CredentialRecords::from_native(
            vec![
                record("a", CredentialType::Generic),
                record("b", CredentialType::Other(9)),
            ],
            "",
        );
        assert_eq!(records.count(), 1);
    }
}
