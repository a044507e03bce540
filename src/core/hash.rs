//! Snapshot Digests
//!
//! SHA-256 over the serialized game document, prefixed with a domain tag
//! so a digest can never collide with one taken over some other payload.
//! Digests double as HTTP entity tags.

use sha2::{Digest, Sha256};

/// Digest output (32 bytes).
pub type StateHash = [u8; 32];

/// Domain tag for game state documents.
pub const GAME_STATE_DOMAIN: &[u8] = b"CONQUEST_STATE_V1";

/// Digest `document` under `domain`.
///
/// The domain length is hashed first so `("ab", "c")` and `("a", "bc")`
/// produce different digests.
pub fn digest_with_domain(domain: &[u8], document: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u32).to_le_bytes());
    hasher.update(domain);
    hasher.update(document);
    hasher.finalize().into()
}

/// Digest a serialized game document.
pub fn digest_game_state(document: &[u8]) -> StateHash {
    digest_with_domain(GAME_STATE_DOMAIN, document)
}

/// Format a digest as a strong, quoted entity tag.
pub fn to_etag(hash: &StateHash) -> String {
    format!("\"{}\"", hex::encode(hash))
}

/// Whether an `If-None-Match` value names this digest.
///
/// Accepts `*`, comma-separated lists and weak (`W/`) tags.
pub fn etag_matches(if_none_match: &str, hash: &StateHash) -> bool {
    let ours = to_etag(hash);
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == ours
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_determinism() {
        let doc = br#"{"players":{},"version":1}"#;
        assert_eq!(digest_game_state(doc), digest_game_state(doc));
        assert_ne!(digest_game_state(doc), digest_game_state(br#"{"players":{}}"#));
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];
        assert_ne!(digest_with_domain(b"DOMAIN_A", &data), digest_with_domain(b"DOMAIN_B", &data));
        assert_ne!(digest_with_domain(b"ab", b"c"), digest_with_domain(b"a", b"bc"));
    }

    #[test]
    fn test_etag_format() {
        let etag = to_etag(&[0xab; 32]);
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 66);
        assert!(etag.contains("abab"));
    }

    #[test]
    fn test_etag_matches() {
        let hash = [0x01; 32];
        let tag = to_etag(&hash);

        assert!(etag_matches(&tag, &hash));
        assert!(etag_matches(&format!("W/{tag}"), &hash));
        assert!(etag_matches(&format!("\"stale\", {tag}"), &hash));
        assert!(etag_matches("*", &hash));
        assert!(!etag_matches("\"stale\"", &hash));
        assert!(!etag_matches(&to_etag(&[0x02; 32]), &hash));
    }
}
