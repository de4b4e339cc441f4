//! Content-addressed identity for highlightable code.
//!
//! An [`Identity`] is a SHA-256 digest over `(language, theme, code)`. It is
//! recomputed from the AST during both the collect and the render pass, so it
//! must depend on nothing but those three inputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic cache key for one block variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Hash the given inputs into an identity.
    pub fn of(language: Option<&str>, theme: Option<&str>, code: &str) -> Self {
        content_hash(language, theme, code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map `(language, theme, code)` to a stable identity token.
///
/// Optional fields are length-prefixed and tagged so that an absent value, an
/// empty value and a value that happens to contain the separator never hash
/// the same way.
pub fn content_hash(language: Option<&str>, theme: Option<&str>, code: &str) -> Identity {
    let mut hasher = Sha256::new();
    update_optional(&mut hasher, language);
    update_optional(&mut hasher, theme);
    update_field(&mut hasher, code);
    Identity(hex::encode(hasher.finalize()))
}

fn update_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            update_field(hasher, value);
        }
        None => hasher.update([0u8]),
    }
}

fn update_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_hash_identically() {
        let first = content_hash(Some("php"), Some("github-dark"), "echo 1;");
        let second = content_hash(Some("php"), Some("github-dark"), "echo 1;");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn each_input_contributes_to_the_hash() {
        let base = content_hash(Some("php"), Some("github-dark"), "echo 1;");
        assert_ne!(base, content_hash(Some("ruby"), Some("github-dark"), "echo 1;"));
        assert_ne!(base, content_hash(Some("php"), Some("github-light"), "echo 1;"));
        assert_ne!(base, content_hash(Some("php"), Some("github-dark"), "echo 2;"));
    }

    #[test]
    fn absent_and_empty_fields_are_distinct() {
        assert_ne!(
            content_hash(None, None, "x"),
            content_hash(Some(""), None, "x")
        );
        assert_ne!(
            content_hash(None, Some(""), "x"),
            content_hash(None, None, "x")
        );
    }

    #[test]
    fn field_boundaries_do_not_shift() {
        assert_ne!(
            content_hash(Some("ab"), Some("c"), "d"),
            content_hash(Some("a"), Some("bc"), "d")
        );
    }
}
