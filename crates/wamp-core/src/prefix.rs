//! CURIE prefix expansion
//!
//! PREFIX messages let a client abbreviate URIs for the rest of its session:
//! after `[1, "calc", "http://example.com/calc#"]` the CURIE `calc:square`
//! stands for `http://example.com/calc#square`.

use std::collections::HashMap;

/// Per-session table of CURIE prefixes
#[derive(Debug, Clone, Default)]
pub struct PrefixMap {
    prefixes: HashMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a prefix
    pub fn insert(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.prefixes.insert(prefix.into(), uri.into());
    }

    /// Expand a CURIE to its full URI.
    ///
    /// Input without a registered prefix is returned unchanged, so full URIs
    /// such as `http://...` pass through even though they contain a colon.
    pub fn resolve(&self, curie_or_uri: &str) -> String {
        if let Some((prefix, rest)) = curie_or_uri.split_once(':') {
            if let Some(uri) = self.prefixes.get(prefix) {
                return format!("{}{}", uri, rest);
            }
        }
        curie_or_uri.to_string()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered_prefix() {
        let mut map = PrefixMap::new();
        map.insert("calc", "http://example.com/calc#");
        assert_eq!(map.resolve("calc:square"), "http://example.com/calc#square");
    }

    #[test]
    fn test_resolve_passthrough() {
        let mut map = PrefixMap::new();
        map.insert("calc", "http://example.com/calc#");
        assert_eq!(map.resolve("http://example.com/x"), "http://example.com/x");
        assert_eq!(map.resolve("other:thing"), "other:thing");
        assert_eq!(map.resolve("plain"), "plain");
    }

    #[test]
    fn test_prefix_replaced() {
        let mut map = PrefixMap::new();
        map.insert("p", "http://a/");
        map.insert("p", "http://b/");
        assert_eq!(map.len(), 1);
        assert_eq!(map.resolve("p:x"), "http://b/x");
    }
}
