//! Path patterns with literal segments and `:param` placeholders.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern such as `/areas/:town`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for part in split_segments(pattern) {
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("parameter names must be non-empty [A-Za-z0-9_]"));
                }
                if !seen.insert(name) {
                    return Err(invalid("duplicate parameter name"));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains('*') {
                return Err(invalid("'*' is only valid as the whole fallback pattern"));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            source: normalize_path(pattern),
            segments,
        })
    }

    /// The normalised pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    /// Match a normalised pathname, capturing parameters in the order they
    /// appear in the pattern.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split_segments(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Params::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.0.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Collapse duplicate and trailing slashes: `/oldham/` becomes `/oldham`.
pub fn normalize_path(path: &str) -> String {
    let joined: Vec<&str> = split_segments(path).collect();
    format!("/{}", joined.join("/"))
}

/// Split a URL path into pathname, query pairs and hash fragment.
pub fn split_url(url: &str) -> (String, BTreeMap<String, String>, Option<String>) {
    let (rest, hash) = match url.split_once('#') {
        Some((rest, hash)) if !hash.is_empty() => (rest, Some(hash.to_string())),
        Some((rest, _)) => (rest, None),
        None => (url, None),
    };
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let query = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    (normalize_path(path), query, hash)
}

/// Route parameters in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_match_exactly() {
        let pattern = PathPattern::parse("/oldham").unwrap();
        assert!(pattern.matches("/oldham").is_some());
        assert!(pattern.matches("/oldham/extra").is_none());
        assert!(pattern.matches("/saddleworth").is_none());
        assert!(!pattern.has_params());
    }

    #[test]
    fn params_are_captured_in_order() {
        let pattern = PathPattern::parse("/areas/:town/:street").unwrap();
        let params = pattern.matches("/areas/uppermill/high-st").unwrap();
        let collected: Vec<_> = params.iter().collect();
        assert_eq!(collected, vec![("town", "uppermill"), ("street", "high-st")]);
        assert_eq!(params.get("street"), Some("high-st"));
        assert_eq!(params.get("county"), None);
    }

    #[test]
    fn root_pattern_matches_only_root() {
        let root = PathPattern::parse("/").unwrap();
        assert_eq!(root.as_str(), "/");
        assert!(root.matches("/").is_some());
        assert!(root.matches("/quote").is_none());
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(PathPattern::parse("quote").is_err());
        assert!(PathPattern::parse("/areas/:").is_err());
        assert!(PathPattern::parse("/a/:x/:x").is_err());
        assert!(PathPattern::parse("/files/*").is_err());
    }

    #[test]
    fn trailing_slashes_are_normalised() {
        assert_eq!(normalize_path("/oldham/"), "/oldham");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("//quote//"), "/quote");
        assert_eq!(PathPattern::parse("/quote/").unwrap().as_str(), "/quote");
    }

    #[test]
    fn urls_split_into_parts() {
        let (path, query, hash) = split_url("/calculator/?bill=120&roof=south+east#results");
        assert_eq!(path, "/calculator");
        assert_eq!(query.get("bill").map(String::as_str), Some("120"));
        assert_eq!(query.get("roof").map(String::as_str), Some("south east"));
        assert_eq!(hash.as_deref(), Some("results"));

        let (path, query, hash) = split_url("/quote#");
        assert_eq!(path, "/quote");
        assert!(query.is_empty());
        assert_eq!(hash, None);
    }

    #[test]
    fn params_serialize_as_a_map() {
        let params = PathPattern::parse("/areas/:town").unwrap().matches("/areas/oldham").unwrap();
        assert_eq!(serde_json::to_value(&params).unwrap(), serde_json::json!({ "town": "oldham" }));
    }
}
