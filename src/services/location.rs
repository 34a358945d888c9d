//! Shareable location encoding
//!
//! A `Location` is the query-string part of a shareable link. Values are kept
//! decoded in memory and percent-encoded on output, with spaces written as
//! `%20` so free text round-trips exactly.

use std::fmt;

/// An ordered list of decoded query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    params: Vec<(String, String)>,
}

impl Location {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Parse a query string, with or without the leading `?`
    ///
    /// Malformed pairs are dropped instead of failing: locations come from
    /// hand-edited or shared links and are untrusted.
    pub fn parse(query: &str) -> Self {
        let query = query.trim();
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut location = Location::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let (Some(key), Some(value)) = (decode_component(raw_key), decode_component(raw_value))
            else {
                tracing::debug!(pair, "dropping undecodable location parameter");
                continue;
            };
            if key.is_empty() {
                continue;
            }
            location.set(key, value);
        }

        location
    }

    /// Raw decoded value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing in place to keep parameter order stable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.params.len();
        self.params.retain(|(k, _)| k != key);
        self.params.len() != before
    }

    /// Encoded query string including the leading `?`, or empty
    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("?{}", pairs.join("&"))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query_string())
    }
}

/// Decode one component; `+` is read as a space for hand-typed links
fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaces_encode_as_percent_20() {
        let mut location = Location::new();
        location.set("search", "john doe");
        assert_eq!(location.to_query_string(), "?search=john%20doe");
    }

    #[test]
    fn test_literal_plus_round_trips() {
        let mut location = Location::new();
        location.set("search", "c++ & rust");
        let encoded = location.to_query_string();
        assert!(!encoded.contains('+'));

        let parsed = Location::parse(&encoded);
        assert_eq!(parsed.get("search"), Some("c++ & rust"));
    }

    #[test]
    fn test_parse_accepts_plus_as_space() {
        let location = Location::parse("?search=john+doe&page=2");
        assert_eq!(location.get("search"), Some("john doe"));
        assert_eq!(location.get("page"), Some("2"));
    }

    #[test]
    fn test_parse_drops_malformed_pairs() {
        // %FF alone is not valid UTF-8
        let location = Location::parse("page=2&search=%FF&=x&&sortBy=name");
        assert_eq!(location.get("page"), Some("2"));
        assert_eq!(location.get("search"), None);
        assert_eq!(location.get("sortBy"), Some("name"));
        assert_eq!(location.to_query_string(), "?page=2&sortBy=name");
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut location = Location::parse("a=1&b=2");
        location.set("a", "3");
        assert_eq!(location.to_query_string(), "?a=3&b=2");
        assert!(location.remove("a"));
        assert!(!location.remove("a"));
        assert_eq!(location.to_query_string(), "?b=2");
    }

    #[test]
    fn test_empty_location_encodes_to_empty_string() {
        assert_eq!(Location::parse("?").to_query_string(), "");
        assert_eq!(Location::parse(""), Location::new());
    }
}
