use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Separator between attribute parts of a composite fingerprint.
///
/// A unit separator never appears in JVM names or signatures, so distinct part
/// lists never hash the same input.
const PART_SEPARATOR: char = '\u{1f}';

/// Deterministic content address: lowercase hex SHA-256 over the UTF-8 bytes of `content`.
pub(crate) fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of an ordered list of attributes, used for edge identity.
pub(crate) fn fingerprint_parts(parts: &[&str]) -> String {
    let mut joined = String::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            joined.push(PART_SEPARATOR);
        }
        joined.push_str(part);
    }
    fingerprint(&joined)
}

/// Fingerprint of a freshly generated random token.
///
/// Used for methods that carry no signature. The resulting id is unique but is
/// not stable across runs.
pub(crate) fn random_fingerprint() -> String {
    fingerprint(&Uuid::new_v4().to_string())
}
