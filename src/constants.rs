//! # Application-Wide Constants
//!
//! Centralized names and magic values used throughout the secrets manager.
//!
//! ## Usage
//!
//! ```rust
//! use secrets_manager::constants::*;
//!
//! let key = format!("{}:db:{}", DEFAULT_PREFIX_TAG, DEFAULT_USERNAME_TAG);
//! assert_eq!(key, "CustomCredentials:db:Username");
//! ```

// ============================================================================
// Configuration key namespace
// ============================================================================

/// First segment of every projected configuration key
pub const DEFAULT_PREFIX_TAG: &str = "CustomCredentials";

/// Last segment of the key holding a record's username
pub const DEFAULT_USERNAME_TAG: &str = "Username";

/// Last segment of the key holding a record's password
pub const DEFAULT_PASSWORD_TAG: &str = "Password";

/// Separator between key segments
pub const KEY_SEPARATOR: &str = ":";

/// Identity prefix baked in at build time
///
/// Set `SECRETS_MANAGER_PREFIX_ID` when compiling to give the binary a
/// default prefix without a config file.
pub const BUILD_PREFIX_ID: Option<&str> = option_env!("SECRETS_MANAGER_PREFIX_ID");

// ============================================================================
// Identities and privileges
// ============================================================================

/// Authority value meaning "this machine"
pub const LOCAL_AUTHORITY: &str = ".";

/// Always-running process whose token carries the SYSTEM identity
pub const SYSTEM_PROCESS_NAME: &str = "winlogon.exe";

pub const SE_BACKUP_PRIVILEGE: &str = "SeBackupPrivilege";
pub const SE_RESTORE_PRIVILEGE: &str = "SeRestorePrivilege";
pub const SE_IMPERSONATE_PRIVILEGE: &str = "SeImpersonatePrivilege";
pub const SE_DEBUG_PRIVILEGE: &str = "SeDebugPrivilege";

// ============================================================================
// Environment and files
// ============================================================================

/// Folder name under `%APPDATA%` / `%LOCALAPPDATA%`
pub const APP_DIR_NAME: &str = "SecretsManager";

/// Config file name inside the app folder
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Explicit config file path
pub const ENV_CONFIG: &str = "SECRETS_MANAGER_CONFIG";

/// `EnvFilter` directives for log output
pub const ENV_LOG: &str = "SECRETS_MANAGER_LOG";

/// Set to `1` to also log to a file
pub const ENV_LOG_FILE: &str = "SECRETS_MANAGER_LOG_FILE";

/// Log file rotation threshold
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
