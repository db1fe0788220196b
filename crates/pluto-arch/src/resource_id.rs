//! Platform-facing resource identifiers.

use sha2::{Digest, Sha256};

/// Longest identifier most provisioning targets accept.
pub const RESOURCE_ID_MAX_LEN: usize = 64;

const HASH_LEN: usize = 8;

/// Derive the id of a resource from its project, stack, type tag and name.
///
/// Every run of characters outside `[_0-9a-zA-Z]` collapses into one `_`,
/// and the result is capped at [`RESOURCE_ID_MAX_LEN`].
pub fn resource_id(project: &str, stack: &str, type_tag: &str, name: &str) -> String {
    let joined = [project, stack, type_tag, name].join("_");

    let mut id = String::with_capacity(joined.len());
    let mut in_run = false;
    for c in joined.chars() {
        if c == '_' || c.is_ascii_alphanumeric() {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('_');
            in_run = true;
        }
    }

    truncate_with_hash(&id, RESOURCE_ID_MAX_LEN)
}

/// Cap `s` at `max_len` bytes.
///
/// Longer strings keep their trailing portion and get `_` plus a short hash of
/// the full string appended, so distinct long ids stay distinct. A `max_len`
/// too small for `_` and the hash yields a prefix of the hash alone.
pub fn truncate_with_hash(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let digest = hex::encode(Sha256::digest(s.as_bytes()));
    if max_len <= HASH_LEN {
        return digest[..max_len].to_string();
    }
    let keep = max_len - HASH_LEN - 1;
    let mut start = s.len() - keep;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("{}_{}", &s[start..], &digest[..HASH_LEN])
}
