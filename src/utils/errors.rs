//! Error types for the secrets manager
//!
//! All error types use thiserror for clean error handling.
//! SECURITY: Error messages MUST NOT contain passwords or sensitive data.

use std::fmt;

/// Errors from credential storage operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Invalid credential handle")]
    InvalidHandle,

    #[error("Failed to read credential '{target}' (error {code})")]
    Read { target: String, code: u32 },

    #[error("Failed to write credential '{target}' (error {code})")]
    Write { target: String, code: u32 },

    #[error("Failed to delete credential '{target}' (error {code})")]
    Delete { target: String, code: u32 },

    #[error("Failed to decode credential '{target}': {reason}")]
    Decode { target: String, reason: String },

    #[error("Credential target cannot be empty")]
    InvalidTarget,

    #[error("Unsupported persistence tier: {0}")]
    InvalidPersistence(u32),

    #[error("Secure buffer is read-only")]
    SealedBuffer,
}

impl CredentialError {
    /// Native error code carried by store failures, if any
    pub fn native_code(&self) -> Option<u32> {
        match self {
            CredentialError::Read { code, .. }
            | CredentialError::Write { code, .. }
            | CredentialError::Delete { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors from identity parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity cannot be empty")]
    Empty,
}

/// Errors from impersonation setup
///
/// Every variant aborts the impersonated operation before the wrapped work runs.
#[derive(Debug, thiserror::Error)]
pub enum ImpersonationError {
    #[error("Failed to enable {privilege} (error {code})")]
    Privilege { privilege: &'static str, code: u32 },

    #[error("Logon failed for '{user}' (error {code})")]
    Authentication { user: String, code: u32 },

    #[error("Failed to load profile for '{user}' (error {code}); the process must be elevated")]
    ProfileLoad { user: String, code: u32 },

    #[error("System process '{0}' not found")]
    ProcessNotFound(String),

    #[error("{operation} failed (error {code})")]
    Token { operation: &'static str, code: u32 },

    #[error("Password cannot be empty")]
    EmptySecret,
}

/// Cleanup step that failed while leaving an impersonated context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    RevertContext,
    UnloadProfile,
    CloseToken,
    CloseProcess,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStage::RevertContext => "RevertToSelf",
            TeardownStage::UnloadProfile => "UnloadUserProfile",
            TeardownStage::CloseToken => "CloseHandle(token)",
            TeardownStage::CloseProcess => "CloseHandle(process)",
        };
        f.write_str(name)
    }
}

/// Non-fatal cleanup failure
///
/// Recorded and logged, never escalated over the operation's own result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownWarning {
    pub stage: TeardownStage,
    pub code: u32,
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during teardown (error {})", self.stage, self.code)
    }
}

/// Errors surfaced by a caller-level operation
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Impersonation(#[from] ImpersonationError),

    #[error("Invalid identity: {0}")]
    Identity(#[from] IdentityError),
}

/// Errors from configuration resolution
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No credential prefix id configured")]
    MissingPrefixId,

    #[error("Credential prefix id cannot be empty")]
    EmptyPrefixId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_carry_target_and_code() {
        let err = CredentialError::Write {
            target: "AppX:db".to_string(),
            code: 1312,
        };
        assert_eq!(err.to_string(), "Failed to write credential 'AppX:db' (error 1312)");
        assert_eq!(err.native_code(), Some(1312));
        assert_eq!(CredentialError::InvalidHandle.native_code(), None);
    }

    #[test]
    fn teardown_warning_display() {
        let warning = TeardownWarning {
            stage: TeardownStage::UnloadProfile,
            code: 5,
        };
        assert_eq!(
            warning.to_string(),
            "UnloadUserProfile failed during teardown (error 5)"
        );
    }

    #[test]
    fn operation_error_is_transparent() {
        let err: OperationError = CredentialError::NotFound("AppX:db".to_string()).into();
        assert_eq!(err.to_string(), "Credential not found: AppX:db");
    }
}
