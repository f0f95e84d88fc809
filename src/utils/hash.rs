//! Hashing helpers.
//!
//! - `compute`: fast FxHash for change detection
//! - `short_id`: stable blake3-derived id for names that end up in output

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Compute 64-bit hash from byte data.
#[inline]
pub fn compute<T: AsRef<[u8]> + ?Sized>(data: &T) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_ref());
    hasher.finish()
}

/// First `len` hex chars of the blake3 digest of `data`.
pub fn short_id<T: AsRef<[u8]> + ?Sized>(data: &T, len: usize) -> String {
    let digest = blake3::hash(data.as_ref());
    let mut id = hex::encode(digest.as_bytes());
    id.truncate(len);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_deterministic() {
        assert_eq!(compute("a"), compute("a"));
        assert_ne!(compute("a"), compute("b"));
    }

    #[test]
    fn test_short_id_is_stable_hex() {
        let id = short_id("Pages/Index.razor.css", 10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, short_id("Pages/Index.razor.css", 10));
        assert_ne!(id, short_id("Pages/Counter.razor.css", 10));
    }
}
