use sha2::{Digest, Sha256};

/// Collapses runs of whitespace and lowercases text
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of the normalized text
///
/// Layout-only changes (indentation, line breaks, letter case) keep the
/// fingerprint stable; any change of wording does not.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_and_case_insensitive() {
        assert_eq!(
            content_fingerprint("Hello   World\n\n  Welcome"),
            content_fingerprint("hello world welcome")
        );
    }

    #[test]
    fn test_wording_changes_fingerprint() {
        assert_ne!(content_fingerprint("price: 10"), content_fingerprint("price: 12"));
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = content_fingerprint("");
        assert_eq!(fp.len(), 64);
        assert_eq!(
            fp,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
