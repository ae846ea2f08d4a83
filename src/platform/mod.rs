//! Platform-specific implementations
//!
//! All native code is isolated here. The Windows Credential Manager and
//! token APIs are only compiled on Windows; the in-memory store builds
//! everywhere and backs the portable tests.

pub mod memory;

#[cfg(windows)]
pub mod credman;
#[cfg(windows)]
pub mod security;

pub use memory::InMemoryCredentialStore;

#[cfg(windows)]
pub use credman::WindowsCredentialManager;
#[cfg(windows)]
pub use security::WindowsSecurity;

/// Encode a string as NUL-terminated UTF-16 for Win32 calls
#[cfg(windows)]
fn to_wide(value: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    OsStr::new(value).encode_wide().chain(std::iter::once(0)).collect()
}

/// Win32 error code carried by a Windows API error
#[cfg(windows)]
fn win32_code(error: &windows::core::Error) -> u32 {
    hresult_to_win32(error.code().0)
}

/// Unwrap `HRESULT_FROM_WIN32`; other HRESULTs are returned as-is
#[cfg_attr(not(windows), allow(dead_code))]
fn hresult_to_win32(hresult: i32) -> u32 {
    let value = hresult as u32;
    if value & 0xFFFF_0000 == 0x8007_0000 {
        value & 0xFFFF
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win32_errors_are_unwrapped() {
        // HRESULT_FROM_WIN32(ERROR_NOT_FOUND)
        assert_eq!(hresult_to_win32(0x8007_0490u32 as i32), 1168);
        // E_FAIL is not a wrapped Win32 code
        assert_eq!(hresult_to_win32(0x8000_4005u32 as i32), 0x8000_4005);
    }

    #[cfg(windows)]
    #[test]
    fn wide_strings_are_terminated() {
        assert_eq!(to_wide("ab"), vec![b'a' as u16, b'b' as u16, 0]);
    }
}
