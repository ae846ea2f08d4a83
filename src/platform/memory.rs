//! Portable in-memory credential store
//!
//! Behaves like the Windows Credential Manager for one principal: records are
//! keyed by (type, target), reads hand out freshly allocated native blocks
//! through [`CredentialHandle`], and every block is zeroed and freed before
//! the call returns. A library-level store that builds on every platform;
//! the portable tests run against it.

use crate::core::{CredentialAllocator, CredentialHandle, CredentialRecords, CredentialStore};
use crate::models::{CredentialRecord, CredentialType, Persistence, SecureBuffer};
use crate::normalize::{normalize_target, starts_with_prefix};
use crate::utils::CredentialError;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Win32 ERROR_NOT_FOUND, reported for deletes of missing targets
const ERROR_NOT_FOUND: u32 = 1168;

/// Native layout of one in-memory record
pub struct MemoryCredential {
    target: String,
    credential_type: CredentialType,
    username: String,
    persistence: Persistence,
    blob: Box<[u8]>,
}

impl MemoryCredential {
    fn from_record(record: &CredentialRecord) -> Self {
        let plaintext = record.password.to_plaintext();
        MemoryCredential {
            target: record.target.clone(),
            credential_type: record.credential_type,
            username: record.username.clone(),
            persistence: record.persistence,
            blob: plaintext.as_bytes().into(),
        }
    }
}

/// Allocator for [`MemoryCredential`] blocks
pub struct MemoryAllocator;

unsafe impl CredentialAllocator for MemoryAllocator {
    type Raw = MemoryCredential;

    unsafe fn materialize(raw: *const MemoryCredential) -> Result<CredentialRecord, CredentialError> {
        let raw = &*raw;
        let password = std::str::from_utf8(&raw.blob).map_err(|e| CredentialError::Decode {
            target: raw.target.clone(),
            reason: e.to_string(),
        })?;

        Ok(CredentialRecord {
            target: raw.target.clone(),
            credential_type: raw.credential_type,
            username: raw.username.clone(),
            password: SecureBuffer::from_plaintext(password),
            persistence: raw.persistence,
        })
    }

    unsafe fn secret_blob(raw: *mut MemoryCredential) -> Option<(*mut u8, usize)> {
        let raw = &mut *raw;
        Some((raw.blob.as_mut_ptr(), raw.blob.len()))
    }

    unsafe fn free(block: NonNull<c_void>, count: u32) {
        if count == 0 {
            drop(Box::from_raw(block.as_ptr() as *mut MemoryCredential));
            return;
        }

        let array = Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            block.as_ptr() as *mut *mut MemoryCredential,
            count as usize,
        ));
        for record in array.iter() {
            drop(Box::from_raw(*record));
        }
    }
}

struct StoredCredential {
    target: String,
    credential_type: CredentialType,
    username: String,
    password: SecureBuffer,
    persistence: Persistence,
}

impl StoredCredential {
    fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            target: self.target.clone(),
            credential_type: self.credential_type,
            username: self.username.clone(),
            password: self.password.clone(),
            persistence: self.persistence,
        }
    }
}

/// In-memory credential store for a single principal
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<Vec<StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredCredential>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn position(records: &[StoredCredential], target: &str) -> Option<usize> {
        records.iter().position(|stored| {
            stored.credential_type == CredentialType::Generic && stored.target == target
        })
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn read(&self, target: &str) -> Result<CredentialRecord, CredentialError> {
        let target = normalize_target(target)?;
        let raw = {
            let records = self.lock();
            let slot = Self::position(&records, &target)
                .ok_or_else(|| CredentialError::NotFound(target.clone()))?;
            Box::into_raw(Box::new(MemoryCredential::from_record(
                &records[slot].to_record(),
            )))
        };

        // SAFETY: raw was allocated above in the layout MemoryAllocator frees.
        let handle = unsafe { CredentialHandle::<MemoryAllocator>::single(raw) };
        handle.read_one()
    }

    fn write(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        let target = normalize_target(&record.target)?;
        record.persistence.to_native()?;

        let stored = StoredCredential {
            target: target.clone(),
            credential_type: record.credential_type,
            username: record.username.clone(),
            password: record.password.clone(),
            persistence: record.persistence,
        };

        let mut records = self.lock();
        let existing = records.iter().position(|s| {
            s.credential_type == record.credential_type && s.target == target
        });
        match existing {
            Some(slot) => records[slot] = stored,
            None => records.push(stored),
        }
        debug!("Stored credential '{}'", target);
        Ok(())
    }

    fn delete(&self, target: &str) -> Result<(), CredentialError> {
        let target = normalize_target(target)?;
        let mut records = self.lock();
        match Self::position(&records, &target) {
            Some(slot) => {
                records.remove(slot);
                debug!("Deleted credential '{}'", target);
                Ok(())
            }
            None => Err(CredentialError::Delete {
                target,
                code: ERROR_NOT_FOUND,
            }),
        }
    }

    fn enumerate(&self, prefix: &str) -> Result<CredentialRecords, CredentialError> {
        let raws: Vec<*mut MemoryCredential> = {
            let records = self.lock();
            records
                .iter()
                .filter(|stored| starts_with_prefix(&stored.target, prefix))
                .map(|stored| {
                    Box::into_raw(Box::new(MemoryCredential::from_record(&stored.to_record())))
                })
                .collect()
        };

        if raws.is_empty() {
            return Ok(CredentialRecords::empty());
        }

        let count = raws.len() as u32;
        let array = Box::into_raw(raws.into_boxed_slice()) as *mut *mut MemoryCredential;
        // SAFETY: array holds `count` records in the layout MemoryAllocator frees.
        let handle = unsafe { CredentialHandle::<MemoryAllocator>::enumeration(array, count) };
        let records = handle.read_many()?;
        drop(handle);

        Ok(CredentialRecords::from_native(records, prefix))
    }
}
