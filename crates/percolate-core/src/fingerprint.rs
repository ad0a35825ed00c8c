use rustc_hash::FxHashMap;

/// Compute Blake3 hash of module text
pub fn hash_content(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Last seen content hash of each module
///
/// The compilation cache is keyed by identity alone; this is what tells the
/// caller whether a touched module really changed and its keys need
/// invalidating.
#[derive(Debug, Default, Clone)]
pub struct SourceFingerprints {
    hashes: FxHashMap<String, String>,
}

impl SourceFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the hash of `text` for `id`, returning true if it differs from
    /// the previously recorded one (or none was recorded)
    pub fn refresh(&mut self, id: &str, text: &str) -> bool {
        let hash = hash_content(text);
        match self.hashes.get(id) {
            Some(previous) if *previous == hash => false,
            _ => {
                self.hashes.insert(id.to_string(), hash);
                true
            }
        }
    }

    /// Forget a module, e.g. after it was deleted
    pub fn forget(&mut self, id: &str) -> bool {
        self.hashes.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.hashes.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_consistency() {
        let hash1 = hash_content("class Animal");
        let hash2 = hash_content("class Animal");

        assert_eq!(hash1, hash2, "Hash should be consistent");
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_content_differs() {
        assert_ne!(
            hash_content("class Animal"),
            hash_content("class Animal extends Base"),
            "Different content should produce different hashes"
        );
    }

    #[test]
    fn test_refresh_reports_changes_only() {
        let mut fingerprints = SourceFingerprints::new();

        assert!(fingerprints.refresh("animal.coffee", "class Animal"));
        assert!(!fingerprints.refresh("animal.coffee", "class Animal"));
        assert!(fingerprints.refresh("animal.coffee", "class Animal extends Base"));
        assert_eq!(fingerprints.len(), 1);

        assert!(fingerprints.forget("animal.coffee"));
        assert!(fingerprints.is_empty());
        assert!(fingerprints.refresh("animal.coffee", "class Animal extends Base"));
    }
}
