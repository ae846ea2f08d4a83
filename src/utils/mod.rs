//! # Utilities Module
//!
//! Cross-cutting concerns shared by the core and platform modules.
//!
//! ## Modules
//!
//! - [`errors`]: Typed error hierarchy using `thiserror` for domain-specific errors
//!
//! ## Design Notes
//!
//! Error types are defined in this module to avoid circular dependencies between
//! the `core` and `platform` modules. Store failures are never retried: secret
//! store errors are rarely transient and repeated logon attempts can trip
//! account lockout policies.

pub mod errors;

pub use errors::{
    ConfigError, CredentialError, IdentityError, ImpersonationError, OperationError,
    TeardownStage, TeardownWarning,
};
