//! Secrets Manager - Windows Credential Manager secrets utility
//!
//! Reads, writes, enumerates and deletes generic credentials, projects them
//! into configuration key/value pairs and can do all of it as another local
//! or domain identity, or as the local system identity.

// Public modules
pub mod commands;
pub mod config;
pub mod constants;
pub mod core;
pub mod logger;
pub mod models;
pub mod normalize;
pub mod platform;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use core::{
    ConfigurationData, ConfigurationSource, CredentialConfigurationProvider, CredentialStore,
    IdentityResolver, ImpersonationContext, ProjectionOptions,
};
pub use models::{CredentialRecord, CredentialType, ParsedIdentity, Persistence, SecureBuffer};
pub use utils::{
    ConfigError, CredentialError, IdentityError, ImpersonationError, OperationError,
    TeardownWarning,
};
