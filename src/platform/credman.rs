//! Windows Credential Manager implementation
//!
//! This module contains all unsafe Windows API code for credential storage.
//! Every `CredReadW` / `CredEnumerateW` result is owned by a
//! [`CredentialHandle`], so secret blobs are zeroed before `CredFree` runs.

use super::{to_wide, win32_code};
use crate::core::{CredentialAllocator, CredentialHandle, CredentialRecords, CredentialStore};
use crate::models::{CredentialRecord, CredentialType, Persistence, SecureBuffer};
use crate::normalize::normalize_target;
use crate::utils::CredentialError;
use std::ffi::c_void;
use std::ptr::NonNull;
use tracing::debug;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_NOT_FOUND, FILETIME};
use windows::Win32::Security::Credentials::{
    CredDeleteW, CredEnumerateW, CredFree, CredReadW, CredWriteW, CREDENTIALW,
    CRED_ENUMERATE_FLAGS, CRED_FLAGS, CRED_PERSIST, CRED_TYPE, CRED_TYPE_GENERIC,
};
use zeroize::Zeroizing;

/// Native layout and free routine of Credential Manager results
pub struct WinCredAllocator;

unsafe impl CredentialAllocator for WinCredAllocator {
    type Raw = CREDENTIALW;

    unsafe fn materialize(raw: *const CREDENTIALW) -> Result<CredentialRecord, CredentialError> {
        let cred = &*raw;
        let target = pwstr_to_string(cred.TargetName);

        let username = if cred.UserName.is_null() {
            String::new()
        } else {
            cred.UserName.to_string().map_err(|e| CredentialError::Decode {
                target: target.clone(),
                reason: format!("username is not valid UTF-16: {}", e),
            })?
        };

        // Blob is UTF-16LE; an odd trailing byte cannot be part of it.
        let password = if cred.CredentialBlob.is_null() || cred.CredentialBlobSize < 2 {
            SecureBuffer::new()
        } else {
            let bytes =
                std::slice::from_raw_parts(cred.CredentialBlob, cred.CredentialBlobSize as usize);
            let units: Zeroizing<Vec<u16>> = Zeroizing::new(
                bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            );
            SecureBuffer::from_utf16(&units).map_err(|e| match e {
                CredentialError::Decode { reason, .. } => CredentialError::Decode {
                    target: target.clone(),
                    reason,
                },
                other => other,
            })?
        };

        Ok(CredentialRecord {
            target,
            credential_type: CredentialType::from_native(cred.Type.0),
            username,
            password,
            persistence: Persistence::from_native(cred.Persist.0),
        })
    }

    unsafe fn secret_blob(raw: *mut CREDENTIALW) -> Option<(*mut u8, usize)> {
        let cred = &*raw;
        Some((cred.CredentialBlob, cred.CredentialBlobSize as usize))
    }

    unsafe fn free(block: NonNull<c_void>, _count: u32) {
        // One CredFree releases a record or a whole enumeration array.
        CredFree(block.as_ptr() as *const c_void);
    }
}

unsafe fn pwstr_to_string(value: PWSTR) -> String {
    if value.is_null() {
        return String::new();
    }
    value.to_string().unwrap_or_else(|_| String::from_utf16_lossy(value.as_wide()))
}

/// Windows Credential Manager implementation
///
/// Uses the CredRead/CredWrite/CredDelete/CredEnumerate APIs on generic
/// credentials of the calling principal (or of the identity the thread is
/// currently impersonating).
///
/// # Security
/// - Credentials encrypted at rest using DPAPI
/// - Native result blocks are zeroed before they are freed
/// - Credentials never logged or exposed
pub struct WindowsCredentialManager;

impl WindowsCredentialManager {
    /// Create a new Windows credential manager instance
    pub fn new() -> Self {
        WindowsCredentialManager
    }
}

impl Default for WindowsCredentialManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for WindowsCredentialManager {
    fn read(&self, target: &str) -> Result<CredentialRecord, CredentialError> {
        let target = normalize_target(target)?;
        let target_w = to_wide(&target);
        let mut pcred: *mut CREDENTIALW = std::ptr::null_mut();

        // SAFETY: target_w is NUL-terminated and outlives the call.
        let result = unsafe {
            CredReadW(
                PCWSTR::from_raw(target_w.as_ptr()),
                CRED_TYPE_GENERIC,
                0,
                &mut pcred,
            )
        };
        if let Err(e) = result {
            let code = win32_code(&e);
            return Err(if code == ERROR_NOT_FOUND.0 {
                CredentialError::NotFound(target)
            } else {
                CredentialError::Read { target, code }
            });
        }

        // SAFETY: pcred was just returned by CredReadW and is owned by nobody else.
        let handle = unsafe { CredentialHandle::<WinCredAllocator>::single(pcred) };
        handle.read_one()
    }

    fn write(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        let target = normalize_target(&record.target)?;
        let persist = record.persistence.to_native()?;

        let target_w = to_wide(&target);
        let username_w = to_wide(&record.username);
        // No terminator: the blob size is exactly the secret.
        let mut secret_w = record.password.to_utf16();
        let blob_size = secret_w.len() * std::mem::size_of::<u16>();

        // SAFETY: all pointers are valid for the duration of the CredWriteW call
        let cred = CREDENTIALW {
            Flags: CRED_FLAGS(0),
            Type: CRED_TYPE(record.credential_type.to_native()),
            TargetName: PWSTR(target_w.as_ptr() as *mut u16),
            Comment: PWSTR::null(),
            LastWritten: FILETIME::default(),
            CredentialBlobSize: blob_size as u32,
            CredentialBlob: if blob_size == 0 {
                std::ptr::null_mut()
            } else {
                secret_w.as_mut_ptr() as *mut u8
            },
            Persist: CRED_PERSIST(persist),
            AttributeCount: 0,
            Attributes: std::ptr::null_mut(),
            TargetAlias: PWSTR::null(),
            UserName: PWSTR(username_w.as_ptr() as *mut u16),
        };

        let result = unsafe { CredWriteW(&cred, 0) };
        result.map_err(|e| CredentialError::Write {
            target: target.clone(),
            code: win32_code(&e),
        })?;

        debug!("Stored credential '{}' ({})", target, record.persistence);
        Ok(())
    }

    fn delete(&self, target: &str) -> Result<(), CredentialError> {
        let target = normalize_target(target)?;
        let target_w = to_wide(&target);

        // SAFETY: target_w is NUL-terminated and outlives the call.
        let result =
            unsafe { CredDeleteW(PCWSTR::from_raw(target_w.as_ptr()), CRED_TYPE_GENERIC, 0) };
        result.map_err(|e| CredentialError::Delete {
            target: target.clone(),
            code: win32_code(&e),
        })?;

        debug!("Deleted credential '{}'", target);
        Ok(())
    }

    fn enumerate(&self, prefix: &str) -> Result<CredentialRecords, CredentialError> {
        let filter_w = (!prefix.is_empty()).then(|| to_wide(&format!("{}*", prefix)));
        let filter = filter_w
            .as_ref()
            .map_or(PCWSTR::null(), |filter| PCWSTR::from_raw(filter.as_ptr()));

        let mut count: u32 = 0;
        let mut pcreds: *mut *mut CREDENTIALW = std::ptr::null_mut();

        // SAFETY: filter is null or NUL-terminated and outlives the call.
        let result =
            unsafe { CredEnumerateW(filter, CRED_ENUMERATE_FLAGS(0), &mut count, &mut pcreds) };
        if let Err(e) = result {
            let code = win32_code(&e);
            if code == ERROR_NOT_FOUND.0 {
                debug!("No credentials match '{}'", prefix);
                return Ok(CredentialRecords::empty());
            }
            return Err(CredentialError::Read {
                target: prefix.to_string(),
                code,
            });
        }

        // SAFETY: pcreds holds `count` records just returned by CredEnumerateW.
        let handle = unsafe { CredentialHandle::<WinCredAllocator>::enumeration(pcreds, count) };
        let records = handle.read_many()?;
        drop(handle);

        Ok(CredentialRecords::from_native(records, prefix))
    }
}
