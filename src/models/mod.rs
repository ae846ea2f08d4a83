//! # Domain Models
//!
//! Core data structures representing credential records, secure buffers and
//! parsed identities.
//!
//! ## Security Design
//!
//! The [`SecureBuffer`] type provides memory-safe secret handling:
//! - Secret bytes are zeroed on release and on drop (via `zeroize`)
//! - Never exposed in `Debug` or `Display` implementations
//! - Plaintext copies are handed out as `Zeroizing<String>`
//!
//! ## Persistence tiers
//!
//! Records are written under one of three tiers:
//! 1. **Session** - gone at logoff
//! 2. **Local machine** - the default, survives logoff
//! 3. **Enterprise** - roams with the profile

pub mod credentials;
pub mod identity;

pub use credentials::{CredentialRecord, CredentialType, Persistence, SecureBuffer};
pub use identity::{IdentityKind, LogonIdentity, ParsedIdentity};
