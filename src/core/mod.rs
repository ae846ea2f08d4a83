//! Core logic (platform-agnostic)
//!
//! CRITICAL: This module MUST NOT import platform-specific code. Native
//! stores and security primitives are reached through the
//! [`CredentialStore`], [`CredentialAllocator`] and [`SecurityApi`] traits.

pub mod credential;
pub mod handle;
pub mod identity;
pub mod impersonation;
pub mod operations;
pub mod provider;

// Recording SecurityApi double (tests only)
#[cfg(test)]
pub mod mock_security;

pub use credential::{CredentialRecords, CredentialStore};
pub use handle::{CredentialAllocator, CredentialHandle};
pub use identity::IdentityResolver;
pub use impersonation::{ImpersonationContext, ImpersonationState, Privilege, SecurityApi};
pub use operations::{execute, ExecutionReport, Operation, OperationOutcome, SecurityContext};
pub use provider::{
    ConfigurationData, ConfigurationSource, CredentialConfigurationProvider, ProjectionOptions,
};
