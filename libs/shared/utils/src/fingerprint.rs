//! Criteria fingerprinting for session state: a stable hash of the
//! caller's current search criteria, used to detect when the criteria
//! changed so accumulated rejected slots can be cleared.

use sha2::{Digest, Sha256};

/// Builds a fingerprint from the normalized criteria fields. Field order is
/// fixed so that callers hash in a consistent way regardless of how the
/// criteria struct is constructed upstream.
pub fn criteria_fingerprint(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f");
        }
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_produce_same_fingerprint() {
        let a = criteria_fingerprint(&["dr-smith", "northshore", "checkup"]);
        let b = criteria_fingerprint(&["dr-smith", "northshore", "checkup"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_fields_produce_different_fingerprints() {
        let a = criteria_fingerprint(&["dr-smith", "northshore", "checkup"]);
        let b = criteria_fingerprint(&["dr-jones", "northshore", "checkup"]);
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundary_is_not_ambiguous() {
        let a = criteria_fingerprint(&["ab", "c"]);
        let b = criteria_fingerprint(&["a", "bc"]);
        assert_ne!(a, b);
    }
}
