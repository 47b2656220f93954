//! Content hashing for duplicate detection

/// Hash of a content locator, hex encoded. Pushing the same locator twice
/// into one memory space yields the same hash.
pub fn content_hash(content_ref: &str) -> String {
    blake3::hash(content_ref.as_bytes()).to_hex().to_string()
}
