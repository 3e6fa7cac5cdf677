//! Content digests for statements and changesets.
//!
//! - algorithm: SHA-256
//! - input: the UTF-8 bytes of the rendered statement text
//! - output: `"sha256:<64 lowercase hex digits>"`
//!
//! A changeset digest folds the ordered `(id, statement digest)` pairs, so any
//! change to text or order shows up in CI diffs.

use sha2::{Digest, Sha256};

pub const DIGEST_PREFIX: &str = "sha256:";

pub fn statement_digest(text: &str) -> String {
    format!("{DIGEST_PREFIX}{:x}", Sha256::digest(text.as_bytes()))
}

pub fn changeset_digest<'a>(changeset_id: &str, statements: impl IntoIterator<Item = (u32, &'a str)>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"changeset=");
    hasher.update(changeset_id.as_bytes());
    for (id, digest) in statements {
        hasher.update(b"|");
        hasher.update(id.to_string().as_bytes());
        hasher.update(b"=");
        hasher.update(digest.as_bytes());
    }
    format!("{DIGEST_PREFIX}{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_has_expected_prefix_and_width() {
        let d = statement_digest("MERGE (n0:tag {key:'a', value:'b'})");
        assert!(d.starts_with(DIGEST_PREFIX));
        assert_eq!(d.len(), DIGEST_PREFIX.len() + 64);
    }

    #[test]
    fn changeset_digest_depends_on_order() {
        let a = changeset_digest("X", [(1, "sha256:a"), (2, "sha256:b")]);
        let b = changeset_digest("X", [(1, "sha256:b"), (2, "sha256:a")]);
        assert_ne!(a, b);
        assert_eq!(a, changeset_digest("X", [(1, "sha256:a"), (2, "sha256:b")]));
    }
}
