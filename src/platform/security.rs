//! Windows token, privilege and profile primitives
//!
//! All unsafe Win32 security calls used by impersonation live here. Handles
//! are returned raw to [`ImpersonationContext`](crate::core::ImpersonationContext),
//! which owns their release.

use super::{to_wide, win32_code};
use crate::core::{Privilege, SecurityApi};
use crate::models::{LogonIdentity, SecureBuffer};
use tracing::{debug, trace};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_NOT_ALL_ASSIGNED, HANDLE, LUID};
use windows::Win32::Security::{
    AdjustTokenPrivileges, DuplicateTokenEx, ImpersonateLoggedOnUser, LogonUserW,
    LookupPrivilegeValueW, RevertToSelf, SecurityImpersonation, TokenImpersonation,
    LOGON32_LOGON_INTERACTIVE, LOGON32_PROVIDER_DEFAULT, LUID_AND_ATTRIBUTES,
    SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_ALL_ACCESS, TOKEN_DUPLICATE,
    TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, OpenProcess, OpenProcessToken, PROCESS_QUERY_INFORMATION,
};
use windows::Win32::UI::Shell::{LoadUserProfileW, UnloadUserProfile, PI_NOUI, PROFILEINFOW};
use zeroize::Zeroizing;

/// Win32 implementation of [`SecurityApi`]
///
/// Stateless; the state it changes (privileges, thread token) belongs to
/// the process and calling thread.
#[derive(Debug, Default)]
pub struct WindowsSecurity;

impl WindowsSecurity {
    pub fn new() -> Self {
        WindowsSecurity
    }
}

fn last_code(e: windows::core::Error) -> u32 {
    win32_code(&e)
}

/// Enable `name` on an already opened process token
unsafe fn adjust_privilege(token: HANDLE, name: &[u16]) -> Result<(), u32> {
    let mut luid = LUID::default();
    LookupPrivilegeValueW(PCWSTR::null(), PCWSTR::from_raw(name.as_ptr()), &mut luid)
        .map_err(last_code)?;

    let privileges = TOKEN_PRIVILEGES {
        PrivilegeCount: 1,
        Privileges: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: SE_PRIVILEGE_ENABLED,
        }],
    };
    AdjustTokenPrivileges(token, false, Some(&privileges as *const _), 0, None, None)
        .map_err(last_code)?;

    // Reports success even when the token does not hold the privilege.
    let status = GetLastError();
    if status == ERROR_NOT_ALL_ASSIGNED {
        return Err(status.0);
    }
    Ok(())
}

fn image_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|unit| *unit == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

impl SecurityApi for WindowsSecurity {
    type Token = HANDLE;
    type Profile = HANDLE;
    type Process = HANDLE;

    fn enable_privilege(&self, privilege: Privilege) -> Result<(), u32> {
        let name = to_wide(privilege.name());
        let mut token = HANDLE::default();

        unsafe {
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            )
            .map_err(last_code)?;

            let result = adjust_privilege(token, &name);
            let _ = CloseHandle(token);
            if result.is_ok() {
                debug!("Enabled {}", privilege.name());
            }
            result
        }
    }

    fn logon_user(&self, identity: &LogonIdentity, secret: &SecureBuffer) -> Result<HANDLE, u32> {
        let user_w = to_wide(&identity.user);
        let authority_w = identity.authority.as_deref().map(to_wide);
        let authority = authority_w
            .as_ref()
            .map_or(PCWSTR::null(), |authority| PCWSTR::from_raw(authority.as_ptr()));

        let units = secret.to_utf16();
        let mut secret_w: Zeroizing<Vec<u16>> = Zeroizing::new(Vec::with_capacity(units.len() + 1));
        secret_w.extend_from_slice(&units);
        secret_w.push(0);

        let mut token = HANDLE::default();
        // SAFETY: all strings are NUL-terminated and outlive the call.
        unsafe {
            LogonUserW(
                PCWSTR::from_raw(user_w.as_ptr()),
                authority,
                PCWSTR::from_raw(secret_w.as_ptr()),
                LOGON32_LOGON_INTERACTIVE,
                LOGON32_PROVIDER_DEFAULT,
                &mut token,
            )
            .map_err(last_code)?;
        }
        Ok(token)
    }

    fn load_profile(&self, token: &HANDLE, user: &str) -> Result<HANDLE, u32> {
        let mut user_w = to_wide(user);
        let mut info = PROFILEINFOW {
            dwSize: std::mem::size_of::<PROFILEINFOW>() as u32,
            dwFlags: PI_NOUI,
            lpUserName: PWSTR(user_w.as_mut_ptr()),
            ..Default::default()
        };

        // SAFETY: info and user_w outlive the call.
        unsafe { LoadUserProfileW(*token, &mut info) }.map_err(last_code)?;
        trace!("Loaded profile for {}", user);
        Ok(info.hProfile)
    }

    fn unload_profile(&self, token: &HANDLE, profile: HANDLE) -> Result<(), u32> {
        unsafe { UnloadUserProfile(*token, profile) }.map_err(last_code)
    }

    fn find_process(&self, image: &str) -> Result<Option<u32>, u32> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(last_code)?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut found = None;
            let mut next = Process32FirstW(snapshot, &mut entry);
            while next.is_ok() {
                if image_name(&entry).eq_ignore_ascii_case(image) {
                    found = Some(entry.th32ProcessID);
                    break;
                }
                next = Process32NextW(snapshot, &mut entry);
            }

            let _ = CloseHandle(snapshot);
            if let Some(process_id) = found {
                debug!("Found {} (pid {})", image, process_id);
            }
            Ok(found)
        }
    }

    fn open_process(&self, process_id: u32) -> Result<HANDLE, u32> {
        unsafe { OpenProcess(PROCESS_QUERY_INFORMATION, false, process_id) }.map_err(last_code)
    }

    fn open_process_token(&self, process: &HANDLE) -> Result<HANDLE, u32> {
        let mut token = HANDLE::default();
        unsafe { OpenProcessToken(*process, TOKEN_DUPLICATE | TOKEN_QUERY, &mut token) }
            .map_err(last_code)?;
        Ok(token)
    }

    fn duplicate_token(&self, token: &HANDLE) -> Result<HANDLE, u32> {
        let mut duplicate = HANDLE::default();
        unsafe {
            DuplicateTokenEx(
                *token,
                TOKEN_ALL_ACCESS,
                None,
                SecurityImpersonation,
                TokenImpersonation,
                &mut duplicate,
            )
        }
        .map_err(last_code)?;
        Ok(duplicate)
    }

    fn impersonate(&self, token: &HANDLE) -> Result<(), u32> {
        unsafe { ImpersonateLoggedOnUser(*token) }.map_err(last_code)
    }

    fn revert(&self) -> Result<(), u32> {
        unsafe { RevertToSelf() }.map_err(last_code)
    }

    fn close_token(&self, token: HANDLE) -> Result<(), u32> {
        unsafe { CloseHandle(token) }.map_err(last_code)
    }

    fn close_process(&self, process: HANDLE) -> Result<(), u32> {
        unsafe { CloseHandle(process) }.map_err(last_code)
    }
}
