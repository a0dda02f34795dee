//! Identifier and chunk-key utilities for the federation node.
//!
//! A `Cdid` ("content-derived id") is minted from a 10-byte content hash and
//! the signed timestamp of the document it identifies. It carries a 1-char
//! kind prefix (`m` message, `a` association, `t` timeline) so a bare id
//! string is self-describing without a DB lookup.
//!
//! Chunk keys bucket timestamps into 10-minute, epoch-aligned windows so
//! timeline reads can be served from a small number of cache entries instead
//! of a per-item lookup.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};

/// Width of a chunk, in seconds. Timestamps bucket into windows of this size.
pub const CHUNK_SECONDS: i64 = 600;

/// The kind prefixes a `Cdid` may carry.
pub const KIND_MESSAGE: char = 'm';
pub const KIND_ASSOCIATION: char = 'a';
pub const KIND_TIMELINE: char = 't';

/// `floor(unix(t)/600)*600`, formatted as a decimal string so chunk keys
/// sort lexicographically in the same order as their numeric value.
pub fn time_to_chunk(t: DateTime<Utc>) -> String {
    ((t.timestamp() / CHUNK_SECONDS) * CHUNK_SECONDS).to_string()
}

/// Exclusive upper bound of a chunk: `unix(chunk) + 600`.
pub fn chunk_to_recent_time(chunk: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = chunk.parse().ok()?;
    Utc.timestamp_opt(secs + CHUNK_SECONDS, 0).single()
}

/// Inclusive lower bound of a chunk: `unix(chunk)`.
pub fn chunk_to_immediate_time(chunk: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = chunk.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

/// A 10-byte content hash, already truncated by the caller (the first 10
/// bytes of a sha256 digest, per the message/association services).
pub type Hash10 = [u8; 10];

/// The first 10 bytes of `sha256(data)`. Used by the object services to
/// derive the content-hash half of a `Cdid` from a document's canonical
/// JSON bytes.
pub fn hash10(data: &[u8]) -> Hash10 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(data);
    let mut out = [0u8; 10];
    out.copy_from_slice(&digest[..10]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cdid {
    pub kind: char,
    pub hash10: Hash10,
    pub signed_at: DateTime<Utc>,
}

impl Cdid {
    /// Mints a new id. The payload is `hash10 || signed_at_millis (i64 BE) ||
    /// reserved (1 byte, always 0)` -- 19 bytes, which base64 (URL-safe, no
    /// padding) encodes to exactly 26 characters, giving a 27-char id once
    /// the 1-char kind prefix is prepended.
    pub fn new(kind: char, hash10: Hash10, signed_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            hash10,
            signed_at,
        }
    }

    pub fn to_id_string(&self) -> String {
        let mut payload = [0u8; 19];
        payload[..10].copy_from_slice(&self.hash10);
        payload[10..18].copy_from_slice(&self.signed_at.timestamp_millis().to_be_bytes());
        // payload[18] stays 0 (reserved)
        format!("{}{}", self.kind, URL_SAFE_NO_PAD.encode(payload))
    }

    /// Parses a 27-char id back into its kind, hash10, and signed_at. Returns
    /// `None` for anything that doesn't match the exact id shape.
    pub fn parse(id: &str) -> Option<Self> {
        if id.len() != 27 {
            return None;
        }
        let kind = id.chars().next()?;
        let body = &id[1..];
        let payload = URL_SAFE_NO_PAD.decode(body).ok()?;
        if payload.len() != 19 {
            return None;
        }
        let mut hash10 = [0u8; 10];
        hash10.copy_from_slice(&payload[..10]);
        let mut millis_bytes = [0u8; 8];
        millis_bytes.copy_from_slice(&payload[10..18]);
        let millis = i64::from_be_bytes(millis_bytes);
        let signed_at = Utc.timestamp_millis_opt(millis).single()?;
        Some(Self {
            kind,
            hash10,
            signed_at,
        })
    }
}

/// `id.len() == 27 && id.starts_with(kind)` and the body decodes cleanly --
/// the shape check used by `NormalizeTimelineID` and friends, not a full
/// semantic validator.
pub fn is_seems_cdid(id: &str, kind: char) -> bool {
    id.len() == 27 && id.starts_with(kind) && Cdid::parse(id).is_some_and(|c| c.kind == kind)
}

/// Classifies a 27-char id by its kind prefix, or `None` if the shape
/// doesn't match any known kind. Mirrors the original `TypedIDToType`.
pub fn id_kind(id: &str) -> Option<char> {
    if id.len() != 27 {
        return None;
    }
    match id.chars().next()? {
        k @ (KIND_MESSAGE | KIND_ASSOCIATION | KIND_TIMELINE) => Some(k),
        _ => None,
    }
}

fn has_no_dot(s: &str) -> bool {
    !s.contains('.')
}

/// `ccid` shape check: 42 chars, prefix `con`, no `.`.
pub fn is_ccid(id: &str) -> bool {
    id.len() == 42 && id.starts_with("con") && has_no_dot(id)
}

/// `cckey` shape check: 42 chars, prefix `cck`, no `.`.
pub fn is_cckey(id: &str) -> bool {
    id.len() == 42 && id.starts_with("cck") && has_no_dot(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash10_of(data: &[u8]) -> Hash10 {
        hash10(data)
    }

    #[test]
    fn new_and_parse_round_trip() {
        let signed_at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let cdid = Cdid::new(KIND_MESSAGE, hash10_of(b"hello"), signed_at);
        let id = cdid.to_id_string();
        assert_eq!(id.len(), 27);

        let parsed = Cdid::parse(&id).expect("round trip should parse");
        assert_eq!(parsed.kind, KIND_MESSAGE);
        assert_eq!(parsed.hash10, cdid.hash10);
        assert_eq!(parsed.signed_at, signed_at);
    }

    #[test]
    fn parse_rejects_wrong_length_and_garbage() {
        assert!(Cdid::parse("short").is_none());
        assert!(Cdid::parse(&"m".repeat(27)).is_none());
    }

    #[test]
    fn is_seems_cdid_checks_kind_and_shape() {
        let signed_at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let id = Cdid::new(KIND_TIMELINE, hash10_of(b"t"), signed_at).to_id_string();
        assert!(is_seems_cdid(&id, KIND_TIMELINE));
        assert!(!is_seems_cdid(&id, KIND_MESSAGE));
        assert!(!is_seems_cdid("not-a-cdid", KIND_TIMELINE));
    }

    #[test]
    fn id_kind_classifies_known_prefixes_only() {
        let signed_at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let message_id = Cdid::new(KIND_MESSAGE, hash10_of(b"m"), signed_at).to_id_string();
        let assoc_id = Cdid::new(KIND_ASSOCIATION, hash10_of(b"a"), signed_at).to_id_string();
        assert_eq!(id_kind(&message_id), Some(KIND_MESSAGE));
        assert_eq!(id_kind(&assoc_id), Some(KIND_ASSOCIATION));
        assert_eq!(id_kind("xxxxxxxxxxxxxxxxxxxxxxxxxxx"), None);
    }

    #[test]
    fn time_to_chunk_is_epoch_aligned_and_ordered() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_599, 0).single().unwrap();
        let t3 = Utc.timestamp_opt(1_700_000_600, 0).single().unwrap();
        assert_eq!(time_to_chunk(t1), time_to_chunk(t2));
        assert_ne!(time_to_chunk(t2), time_to_chunk(t3));
    }

    #[test]
    fn chunk_bounds_span_exactly_600_seconds() {
        let t = Utc.timestamp_opt(1_700_000_123, 0).single().unwrap();
        let chunk = time_to_chunk(t);
        let immediate = chunk_to_immediate_time(&chunk).unwrap();
        let recent = chunk_to_recent_time(&chunk).unwrap();
        assert!(immediate <= t);
        assert!(t < recent);
        assert_eq!((recent - immediate).num_seconds(), CHUNK_SECONDS);
    }

    #[test]
    fn ccid_and_cckey_shape_checks() {
        let ccid = format!("con{}", "a".repeat(39));
        let cckey = format!("cck{}", "b".repeat(39));
        assert!(is_ccid(&ccid));
        assert!(!is_ccid(&cckey));
        assert!(is_cckey(&cckey));
        assert!(!is_cckey(&ccid));
        assert!(!is_ccid("con.has.dots.padded.out.to.len.42.chars.x"));
        assert!(!is_ccid("too-short"));
    }
}
