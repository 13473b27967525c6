//! Description normalization and the dedup identity.
//!
//! Job boards routinely republish an unchanged vacancy with cosmetic markup
//! or whitespace edits, so the description is normalized before hashing;
//! otherwise every re-publish would defeat the notified ledger.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").expect("static regex");
}

/// Strip markup tags and collapse whitespace runs to single spaces.
pub fn normalize_description(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex-encoded SHA-256 of the normalized description.
pub fn content_hash(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// The (user, vacancy id, content hash) triple deciding whether a
/// notification was already sent. The ledger treats a match on either the
/// vacancy id or the hash as "already notified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub user_id: i64,
    pub vacancy_id: String,
    pub description_hash: String,
}

impl DedupKey {
    pub fn for_description(user_id: i64, vacancy_id: &str, description: &str) -> Self {
        let normalized = normalize_description(description);
        Self {
            user_id,
            vacancy_id: vacancy_id.to_string(),
            description_hash: content_hash(&normalized),
        }
    }
}
