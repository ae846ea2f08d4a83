//! Normalisation helpers for credential targets and configuration keys.
//!
//! Every target that leaves the store passes through these functions before
//! it becomes a configuration key, so all records sharing an application
//! prefix land in a single key namespace.

use crate::constants::KEY_SEPARATOR;
use crate::utils::CredentialError;

/// Normalise a user-supplied target: trim whitespace, reject empty input.
pub fn normalize_target(input: &str) -> Result<String, CredentialError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::InvalidTarget);
    }
    Ok(trimmed.to_string())
}

/// Whether `target` begins with `prefix`, ignoring ASCII case the way the
/// Windows credential filter does. An empty prefix matches everything.
pub fn starts_with_prefix(target: &str, prefix: &str) -> bool {
    target
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Remove the identity prefix from the front of a target.
///
/// Targets that do not carry the prefix are returned unchanged.
pub fn strip_identity_prefix<'a>(target: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(prefix) if !prefix.is_empty() && starts_with_prefix(target, prefix) => {
            &target[prefix.len()..]
        }
        _ => target,
    }
}

/// Build `{prefix_tag}:{target}:{field_tag}`.
pub fn configuration_key(prefix_tag: &str, target: &str, field_tag: &str) -> String {
    let mut key = String::with_capacity(
        prefix_tag.len() + target.len() + field_tag.len() + 2 * KEY_SEPARATOR.len(),
    );
    key.push_str(prefix_tag);
    key.push_str(KEY_SEPARATOR);
    key.push_str(target);
    key.push_str(KEY_SEPARATOR);
    key.push_str(field_tag);
    key
}
