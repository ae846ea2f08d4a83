//! Credential model types
//!
//! SECURITY: Secret-bearing types zero their memory when released or dropped.

use crate::utils::CredentialError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Password buffer that zeros memory on release
///
/// Created from plaintext at the moment a secret crosses into or out of the
/// process and released as soon as the current operation is done with it.
/// Buffers built with [`SecureBuffer::from_plaintext`] are sealed immediately;
/// buffers built incrementally stay writable until [`SecureBuffer::seal`].
///
/// SECURITY: This type never implements Display or Debug in a way that reveals the password.
pub struct SecureBuffer {
    bytes: Vec<u8>,
    sealed: bool,
}

impl SecureBuffer {
    /// Create an empty, writable buffer
    pub fn new() -> Self {
        SecureBuffer {
            bytes: Vec::new(),
            sealed: false,
        }
    }

    /// Copy a plaintext secret into a sealed buffer
    pub fn from_plaintext(plaintext: &str) -> Self {
        let mut bytes = Vec::with_capacity(plaintext.len());
        bytes.extend_from_slice(plaintext.as_bytes());
        SecureBuffer {
            bytes,
            sealed: true,
        }
    }

    /// Decode UTF-16 code units straight into a sealed buffer
    ///
    /// Trailing NUL units are dropped so terminated blobs round-trip.
    pub fn from_utf16(units: &[u16]) -> Result<Self, CredentialError> {
        let end = units
            .iter()
            .rposition(|unit| *unit != 0)
            .map_or(0, |last| last + 1);

        let mut buffer = SecureBuffer::new();
        for decoded in char::decode_utf16(units[..end].iter().copied()) {
            match decoded {
                Ok(ch) => buffer.push(ch)?,
                Err(_) => {
                    return Err(CredentialError::Decode {
                        target: String::new(),
                        reason: "secret is not valid UTF-16".to_string(),
                    })
                }
            }
        }
        buffer.seal();
        Ok(buffer)
    }

    /// Append text to a writable buffer
    pub fn push_str(&mut self, text: &str) -> Result<(), CredentialError> {
        if self.sealed {
            return Err(CredentialError::SealedBuffer);
        }
        self.reserve_zeroing(text.len());
        self.bytes.extend_from_slice(text.as_bytes());
        Ok(())
    }

    /// Append a single character to a writable buffer
    pub fn push(&mut self, ch: char) -> Result<(), CredentialError> {
        let mut encoded = [0u8; 4];
        let result = self.push_str(ch.encode_utf8(&mut encoded));
        encoded.zeroize();
        result
    }

    /// Make the buffer read-only
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Materialize a plaintext copy
    ///
    /// Use this sparingly and only when necessary for API calls. The copy is
    /// zeroed when the returned value is dropped.
    pub fn to_plaintext(&self) -> Zeroizing<String> {
        // Bytes only ever enter through &str/char, so they are valid UTF-8.
        Zeroizing::new(String::from_utf8_lossy(&self.bytes).into_owned())
    }

    /// Encode the secret as UTF-16 code units (no terminator)
    pub fn to_utf16(&self) -> Zeroizing<Vec<u16>> {
        let plaintext = self.to_plaintext();
        // UTF-16 never needs more units than UTF-8 has bytes, so this
        // allocation is never grown and no partial copy is left behind.
        let mut units = Zeroizing::new(Vec::with_capacity(plaintext.len()));
        units.extend(plaintext.encode_utf16());
        units
    }

    /// Get the length of the secret in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Zero and free the backing memory
    ///
    /// Idempotent. Also runs automatically on drop.
    pub fn release(&mut self) {
        self.wipe();
        self.bytes = Vec::new();
    }

    /// Zero the whole allocation (including spare capacity) in place.
    fn wipe(&mut self) {
        self.bytes.zeroize();
    }

    /// Grow through a fresh allocation so the old one is zeroed rather than
    /// handed back to the allocator with secret content.
    fn reserve_zeroing(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let mut grown = Vec::with_capacity(needed.max(self.bytes.capacity() * 2));
        grown.extend_from_slice(&self.bytes);
        self.wipe();
        self.bytes = grown;
    }
}

impl Default for SecureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SecureBuffer {
    fn clone(&self) -> Self {
        let mut bytes = Vec::with_capacity(self.bytes.len());
        bytes.extend_from_slice(&self.bytes);
        SecureBuffer {
            bytes,
            sealed: self.sealed,
        }
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time over equal lengths
        if self.bytes.len() != other.bytes.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.bytes.iter().zip(other.bytes.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for SecureBuffer {}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SECURITY: Never reveal the password content
        write!(f, "SecureBuffer(*** {} bytes ***)", self.bytes.len())
    }
}

/// Kind of a secret-store record
///
/// Only [`CredentialType::Generic`] records are processed; the rest are
/// materialized so they can be recognised and skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialType {
    Generic,
    DomainPassword,
    DomainCertificate,
    DomainVisiblePassword,
    GenericCertificate,
    DomainExtended,
    Other(u32),
}

impl CredentialType {
    pub fn from_native(value: u32) -> Self {
        match value {
            1 => CredentialType::Generic,
            2 => CredentialType::DomainPassword,
            3 => CredentialType::DomainCertificate,
            4 => CredentialType::DomainVisiblePassword,
            5 => CredentialType::GenericCertificate,
            6 => CredentialType::DomainExtended,
            other => CredentialType::Other(other),
        }
    }

    pub fn to_native(self) -> u32 {
        match self {
            CredentialType::Generic => 1,
            CredentialType::DomainPassword => 2,
            CredentialType::DomainCertificate => 3,
            CredentialType::DomainVisiblePassword => 4,
            CredentialType::GenericCertificate => 5,
            CredentialType::DomainExtended => 6,
            CredentialType::Other(value) => value,
        }
    }

    pub fn is_generic(self) -> bool {
        self == CredentialType::Generic
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialType::Generic => f.write_str("generic"),
            CredentialType::DomainPassword => f.write_str("domain-password"),
            CredentialType::DomainCertificate => f.write_str("domain-certificate"),
            CredentialType::DomainVisiblePassword => f.write_str("domain-visible-password"),
            CredentialType::GenericCertificate => f.write_str("generic-certificate"),
            CredentialType::DomainExtended => f.write_str("domain-extended"),
            CredentialType::Other(value) => write!(f, "type-{}", value),
        }
    }
}

/// Scope a credential is persisted under
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persistence {
    /// Lives for the current logon session only
    Session,
    /// Survives logoff on this machine
    #[default]
    LocalMachine,
    /// Roams with the user profile
    Enterprise,
    /// Tier value not known to this tool (read-only)
    #[serde(skip)]
    Unknown(u32),
}

impl Persistence {
    pub fn from_native(value: u32) -> Self {
        match value {
            1 => Persistence::Session,
            2 => Persistence::LocalMachine,
            3 => Persistence::Enterprise,
            other => Persistence::Unknown(other),
        }
    }

    /// Native tier value for writes
    pub fn to_native(self) -> Result<u32, CredentialError> {
        match self {
            Persistence::Session => Ok(1),
            Persistence::LocalMachine => Ok(2),
            Persistence::Enterprise => Ok(3),
            Persistence::Unknown(value) => Err(CredentialError::InvalidPersistence(value)),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Session => f.write_str("session"),
            Persistence::LocalMachine => f.write_str("local-machine"),
            Persistence::Enterprise => f.write_str("enterprise"),
            Persistence::Unknown(value) => write!(f, "unknown({})", value),
        }
    }
}

impl std::str::FromStr for Persistence {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Persistence::Session),
            "local-machine" | "localmachine" | "local" => Ok(Persistence::LocalMachine),
            "enterprise" => Ok(Persistence::Enterprise),
            other => Err(format!(
                "unknown persistence '{}' (expected session, local-machine or enterprise)",
                other
            )),
        }
    }
}

/// Normalized, in-process copy of one secret-store entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub target: String,
    pub credential_type: CredentialType,
    pub username: String,
    pub password: SecureBuffer,
    pub persistence: Persistence,
}

impl CredentialRecord {
    /// Create a generic credential persisted on the local machine
    pub fn generic(
        target: impl Into<String>,
        username: impl Into<String>,
        password: SecureBuffer,
    ) -> Self {
        CredentialRecord {
            target: target.into(),
            credential_type: CredentialType::Generic,
            username: username.into(),
            password,
            persistence: Persistence::LocalMachine,
        }
    }

    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_type(mut self, credential_type: CredentialType) -> Self {
        self.credential_type = credential_type;
        self
    }
}
