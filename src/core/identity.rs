//! Identity string parsing
//!
//! Classifies `user`, `.\user`, `MACHINE\user`, `DOMAIN\user` and
//! `user@realm` inputs deterministically from their syntax and the local
//! machine name.

use crate::constants::LOCAL_AUTHORITY;
use crate::models::{IdentityKind, ParsedIdentity};
use crate::utils::IdentityError;
use tracing::debug;

/// Parses identity strings against a known machine name
#[derive(Clone, Debug)]
pub struct IdentityResolver {
    machine_name: String,
}

impl IdentityResolver {
    /// Create a resolver that treats `machine_name\user` as a local account
    pub fn new(machine_name: impl Into<String>) -> Self {
        IdentityResolver {
            machine_name: machine_name.into(),
        }
    }

    /// Create a resolver for the machine this process runs on
    ///
    /// Prefers the NetBIOS name from `COMPUTERNAME`, falling back to the
    /// host name.
    pub fn for_local_machine() -> Self {
        let machine_name = std::env::var("COMPUTERNAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        Self::new(machine_name)
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// Parse an identity string
    ///
    /// Rules, highest priority first:
    /// 1. `user@realm` - principal name, used verbatim, no authority
    /// 2. `left\user` - local when `left` is `.` or this machine, else domain
    /// 3. anything else - local user, no authority
    pub fn resolve(&self, input: &str) -> Result<ParsedIdentity, IdentityError> {
        let original = input.trim();
        if original.is_empty() {
            return Err(IdentityError::Empty);
        }

        if let Some((left, right)) = split_once_non_empty(original, '@') {
            debug!("Identity '{}' is a principal name ({}@{})", original, left, right);
            return Ok(ParsedIdentity {
                original: original.to_string(),
                user: original.to_string(),
                authority: None,
                kind: IdentityKind::PrincipalName,
            });
        }

        if let Some((left, user)) = split_once_non_empty(original, '\\') {
            let local = left == LOCAL_AUTHORITY
                || (!self.machine_name.is_empty() && left.eq_ignore_ascii_case(&self.machine_name));

            let identity = if local {
                ParsedIdentity {
                    original: original.to_string(),
                    user: user.to_string(),
                    authority: Some(LOCAL_AUTHORITY.to_string()),
                    kind: IdentityKind::Local,
                }
            } else {
                ParsedIdentity {
                    original: original.to_string(),
                    user: user.to_string(),
                    authority: Some(left.to_string()),
                    kind: IdentityKind::DomainRealm,
                }
            };
            debug!("Identity '{}' classified as {}", original, identity.kind);
            return Ok(identity);
        }

        Ok(ParsedIdentity {
            original: original.to_string(),
            user: original.to_string(),
            authority: None,
            kind: IdentityKind::Local,
        })
    }
}

/// Split at the first `separator` when both sides are non-empty.
fn split_once_non_empty(input: &str, separator: char) -> Option<(&str, &str)> {
    input
        .split_once(separator)
        .filter(|(left, right)| !left.is_empty() && !right.is_empty())
}
