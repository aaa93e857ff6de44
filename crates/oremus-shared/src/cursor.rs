//! Opaque pagination cursors.
//!
//! A cursor wraps the composite sort key of the last row of a page: a short
//! tuple of non-negative integers (rank digit, activity time, urgency score,
//! ...) plus the row id as the final tiebreak.  The raw form is fixed-width
//! zero-padded decimal, so comparing two raw keys as strings gives exactly
//! the numeric tuple order.  The token handed to callers is the raw form
//! wrapped in base64url; callers must never decode semantics out of it, only
//! re-supply it as the resume bound of the next query.
//!
//! Every listing in the system uses the same fetch-N+1 pattern: request one
//! row more than the page size, and if it arrives, pop it and re-encode its
//! key as `next_cursor`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `i64::MAX` has 19 decimal digits.
const PART_WIDTH: usize = 19;

/// Separator between integer parts.
const PART_SEP: char = '.';

/// Separator between the integer parts and the id tiebreak.
const ID_SEP: char = '~';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("Cursor is not valid base64url")]
    InvalidEncoding,

    #[error("Cursor payload is malformed")]
    InvalidFormat,
}

/// The composite sort key a cursor carries.
///
/// Parts are compared in order, then `id` breaks exact ties
/// deterministically.  All parts must be non-negative; negative values are
/// clamped to zero on encode (no ordering in this system produces them).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorKey {
    pub parts: Vec<i64>,
    pub id: String,
}

impl CursorKey {
    pub fn new(parts: Vec<i64>, id: impl Into<String>) -> Self {
        Self {
            parts,
            id: id.into(),
        }
    }

    /// Fixed-width raw form.  Lexicographic order of raw keys with the same
    /// number of parts equals numeric tuple order.
    pub fn raw(&self) -> String {
        let mut out = String::with_capacity(self.parts.len() * (PART_WIDTH + 1) + self.id.len());
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(PART_SEP);
            }
            out.push_str(&format!("{:0width$}", part.max(&0), width = PART_WIDTH));
        }
        out.push(ID_SEP);
        out.push_str(&self.id);
        out
    }

    /// Encode as an opaque token.
    pub fn encode(&self) -> String {
        base64_url_encode(self.raw().as_bytes())
    }

    /// Decode a token back into its sort-key components.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = base64_url_decode(token)?;
        let raw = String::from_utf8(bytes).map_err(|_| CursorError::InvalidFormat)?;

        let (parts_str, id) = raw.split_once(ID_SEP).ok_or(CursorError::InvalidFormat)?;
        if id.is_empty() {
            return Err(CursorError::InvalidFormat);
        }

        let mut parts = Vec::new();
        for segment in parts_str.split(PART_SEP) {
            if segment.len() != PART_WIDTH {
                return Err(CursorError::InvalidFormat);
            }
            let value: i64 = segment.parse().map_err(|_| CursorError::InvalidFormat)?;
            parts.push(value);
        }
        if parts.is_empty() {
            return Err(CursorError::InvalidFormat);
        }

        Ok(Self {
            parts,
            id: id.to_string(),
        })
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, CursorError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| CursorError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = CursorKey::new(vec![1, 1_700_000_000_000], "a1b2c3");
        let decoded = CursorKey::decode(&key.encode()).expect("decode should work");
        assert_eq!(decoded, key);
    }

    #[test]
    fn raw_order_matches_tuple_order() {
        let earlier = CursorKey::new(vec![0, 100], "zzz");
        let later = CursorKey::new(vec![0, 200], "aaa");
        let ranked = CursorKey::new(vec![1, 50], "mmm");

        // Second part dominates the id.
        assert!(earlier.raw() < later.raw());
        // First part dominates the second.
        assert!(later.raw() < ranked.raw());
    }

    #[test]
    fn id_breaks_exact_ties() {
        let a = CursorKey::new(vec![42], "aaaa");
        let b = CursorKey::new(vec![42], "bbbb");
        assert!(a.raw() < b.raw());
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            CursorKey::decode("not base64!!"),
            Err(CursorError::InvalidEncoding)
        );
        // Valid base64 of a malformed payload.
        let bogus = super::base64_url_encode(b"12~x");
        assert_eq!(CursorKey::decode(&bogus), Err(CursorError::InvalidFormat));
        let empty_id = CursorKey::new(vec![7], "").encode();
        assert_eq!(CursorKey::decode(&empty_id), Err(CursorError::InvalidFormat));
    }

    #[test]
    fn negative_parts_clamp_to_zero() {
        let key = CursorKey::new(vec![-5], "id");
        let decoded = CursorKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded.parts, vec![0]);
    }
}
