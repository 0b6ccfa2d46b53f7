//! Deterministic cache and job keys.
//!
//! A fingerprint identifies one logical shopping list: the menu plus the
//! options that change the output. `use_cache` only controls how a request
//! is served, so it is not part of the key.

use sha2::{Digest, Sha256};

/// Bumped whenever the generated list format changes, orphaning old entries
const FINGERPRINT_VERSION: &str = "shopping-list/v1";

/// Options that influence the content of a generated list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationOptions {
    pub use_ai: bool,
}

/// Hex-encoded SHA-256 of the menu id and the generation options
pub fn fingerprint(menu_id: &str, options: GenerationOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    hasher.update([0u8]);
    hasher.update(menu_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(if options.use_ai { b"ai=1" } else { b"ai=0" });
    hex::encode(hasher.finalize())
}

/// Both fingerprints a menu can have, used when invalidating it
pub fn all_fingerprints(menu_id: &str) -> [String; 2] {
    [
        fingerprint(menu_id, GenerationOptions { use_ai: true }),
        fingerprint(menu_id, GenerationOptions { use_ai: false }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let options = GenerationOptions { use_ai: true };
        assert_eq!(fingerprint("menu-1", options), fingerprint("menu-1", options));
        assert_eq!(fingerprint("menu-1", options).len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_menu_and_options() {
        let ai = GenerationOptions { use_ai: true };
        let rules = GenerationOptions { use_ai: false };

        assert_ne!(fingerprint("menu-1", ai), fingerprint("menu-2", ai));
        assert_ne!(fingerprint("menu-1", ai), fingerprint("menu-1", rules));
    }

    #[test]
    fn test_all_fingerprints_cover_both_options() {
        let [ai, rules] = all_fingerprints("menu-1");
        assert_eq!(ai, fingerprint("menu-1", GenerationOptions { use_ai: true }));
        assert_eq!(rules, fingerprint("menu-1", GenerationOptions { use_ai: false }));
    }
}
