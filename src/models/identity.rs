//! Parsed identity types
//!
//! Valid input formats:
//! - `user` (local user)
//! - `.\\user` or `MACHINE\\user` (explicit local user)
//! - `DOMAIN\\user` (domain or trusted realm user)
//! - `user@domain.com` (principal name)

use crate::constants::LOCAL_AUTHORITY;
use std::fmt;

/// Classification of an identity string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityKind {
    /// Account on this machine
    Local,
    /// `REALM\user` where REALM is not this machine
    DomainRealm,
    /// `user@realm`, self-contained
    PrincipalName,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKind::Local => f.write_str("local"),
            IdentityKind::DomainRealm => f.write_str("domain"),
            IdentityKind::PrincipalName => f.write_str("principal-name"),
        }
    }
}

/// Result of parsing a free-form identity string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedIdentity {
    /// Trimmed input
    pub original: String,
    /// User name without authority (the full string for principal names)
    pub user: String,
    /// `"."` for explicit local accounts, the realm for domain accounts,
    /// `None` for principal names and bare user names
    pub authority: Option<String>,
    pub kind: IdentityKind,
}

impl ParsedIdentity {
    pub fn is_local(&self) -> bool {
        self.kind == IdentityKind::Local
    }

    pub fn is_domain(&self) -> bool {
        matches!(
            self.kind,
            IdentityKind::DomainRealm | IdentityKind::PrincipalName
        )
    }

    /// The (user, authority, kind) triple passed to the logon call
    ///
    /// Principal names never carry a separate authority; local accounts
    /// always authenticate against `"."`.
    pub fn for_logon(&self) -> LogonIdentity {
        let authority = match self.kind {
            IdentityKind::PrincipalName => None,
            IdentityKind::DomainRealm => self.authority.clone(),
            IdentityKind::Local => Some(LOCAL_AUTHORITY.to_string()),
        };

        LogonIdentity {
            user: self.user.clone(),
            authority,
            kind: self.kind,
        }
    }
}

impl fmt::Display for ParsedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Identity in the shape the authentication call expects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogonIdentity {
    pub user: String,
    pub authority: Option<String>,
    pub kind: IdentityKind,
}

impl fmt::Display for LogonIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.authority {
            Some(authority) => write!(f, "{}\\{}", authority, self.user),
            None => f.write_str(&self.user),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(user: &str, authority: Option<&str>, kind: IdentityKind) -> ParsedIdentity {
        ParsedIdentity {
            original: user.to_string(),
            user: user.to_string(),
            authority: authority.map(str::to_string),
            kind,
        }
    }

    #[test]
    fn logon_triple_per_kind() {
        let upn = parsed("alice@corp.example", None, IdentityKind::PrincipalName).for_logon();
        assert_eq!(upn.authority, None);
        assert_eq!(upn.user, "alice@corp.example");

        let realm = parsed("alice", Some("CORP"), IdentityKind::DomainRealm).for_logon();
        assert_eq!(realm.authority.as_deref(), Some("CORP"));

        let bare = parsed("alice", None, IdentityKind::Local).for_logon();
        assert_eq!(bare.authority.as_deref(), Some("."));
        assert_eq!(bare.to_string(), ".\\alice");
    }

    #[test]
    fn kind_predicates() {
        assert!(parsed("a", None, IdentityKind::Local).is_local());
        assert!(parsed("a@b", None, IdentityKind::PrincipalName).is_domain());
        assert!(!parsed("a", Some("X"), IdentityKind::DomainRealm).is_local());
    }
}
