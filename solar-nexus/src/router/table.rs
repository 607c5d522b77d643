//! The ordered route table.
//!
//! Routes are tried top to bottom: an exact path match wins first, then the
//! first pattern that matches, and only then the `*` fallback. The fallback
//! is held apart from the ordered list, so no registration order can make it
//! shadow another route.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pattern::{Params, PathPattern};
use crate::error::Result;

/// The fallback pattern.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMeta {
    /// Content for `<meta name="description">` and `og:description`.
    pub description: Option<String>,
    /// Additional `<meta>` tags keyed by name or property.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// What a route renders and how it describes itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub name: String,
    pub title: String,
    pub component: String,
    pub module_path: Option<String>,
    #[serde(default)]
    pub meta: RouteMeta,
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, title: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            component: component.into(),
            module_path: None,
            meta: RouteMeta::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    pub fn meta(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.meta.extra.insert(name.into(), content.into());
        self
    }

    /// Load the component from `path` instead of its conventional location.
    pub fn module_path(mut self, path: impl Into<String>) -> Self {
        self.module_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone)]
struct Route {
    pattern: PathPattern,
    config: RouteConfig,
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub pattern: String,
    pub config: RouteConfig,
    pub params: Params,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    fallback: Option<RouteConfig>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`. Re-registering a pattern replaces its config in
    /// place, keeping its original position.
    pub fn add(&mut self, path: &str, config: RouteConfig) -> Result<()> {
        if path == WILDCARD {
            self.fallback = Some(config);
            return Ok(());
        }
        let pattern = PathPattern::parse(path)?;
        match self.routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(existing) => existing.config = config,
            None => self.routes.push(Route { pattern, config }),
        }
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        if let Some(route) = self.routes.iter().find(|r| r.pattern.as_str() == path) {
            return Some(RouteMatch {
                pattern: route.pattern.to_string(),
                config: route.config.clone(),
                params: Params::default(),
            });
        }
        let by_pattern = self.routes.iter().find_map(|route| {
            route.pattern.matches(path).map(|params| RouteMatch {
                pattern: route.pattern.to_string(),
                config: route.config.clone(),
                params,
            })
        });
        by_pattern.or_else(|| {
            self.fallback.as_ref().map(|config| RouteMatch {
                pattern: WILDCARD.to_string(),
                config: config.clone(),
                params: Params::default(),
            })
        })
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered routes in evaluation order, fallback last.
    pub fn entries(&self) -> Vec<(String, RouteConfig)> {
        self.routes
            .iter()
            .map(|r| (r.pattern.to_string(), r.config.clone()))
            .chain(self.fallback.iter().map(|c| (WILDCARD.to_string(), c.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table.add("/", RouteConfig::new("home", "Home", "home")).unwrap();
        table.add("/oldham", RouteConfig::new("oldham", "Oldham", "location")).unwrap();
        table.add("*", RouteConfig::new("not-found", "Not found", "not-found")).unwrap();
        table
    }

    #[test]
    fn literal_route_beats_wildcard() {
        let matched = table().resolve("/oldham").unwrap();
        assert_eq!(matched.config.name, "oldham");
        assert_eq!(matched.pattern, "/oldham");
    }

    #[test]
    fn unknown_paths_fall_back() {
        let matched = table().resolve("/unknown").unwrap();
        assert_eq!(matched.config.name, "not-found");
        assert_eq!(matched.pattern, "*");
    }

    #[test]
    fn wildcard_registered_first_still_only_falls_back() {
        let mut table = RouteTable::new();
        table.add("*", RouteConfig::new("not-found", "Not found", "not-found")).unwrap();
        table.add("/quote", RouteConfig::new("quote", "Quote", "quote")).unwrap();
        assert_eq!(table.resolve("/quote").unwrap().config.name, "quote");
        assert_eq!(table.entries().last().map(|(p, _)| p.as_str()), Some("*"));
    }

    #[test]
    fn first_matching_pattern_wins() {
        let mut table = RouteTable::new();
        table.add("/areas/:town", RouteConfig::new("area", "Area", "location")).unwrap();
        table.add("/areas/:region", RouteConfig::new("region", "Region", "region")).unwrap();
        let matched = table.resolve("/areas/uppermill").unwrap();
        assert_eq!(matched.config.name, "area");
        assert_eq!(matched.params.get("town"), Some("uppermill"));
    }

    #[test]
    fn exact_match_beats_earlier_pattern() {
        let mut table = RouteTable::new();
        table.add("/areas/:town", RouteConfig::new("area", "Area", "location")).unwrap();
        table.add("/areas/map", RouteConfig::new("map", "Map", "map")).unwrap();
        assert_eq!(table.resolve("/areas/map").unwrap().config.name, "map");
    }

    #[test]
    fn no_fallback_means_no_match() {
        let mut table = RouteTable::new();
        table.add("/", RouteConfig::new("home", "Home", "home")).unwrap();
        assert!(table.resolve("/missing").is_none());
        assert!(!table.has_fallback());
    }

    #[test]
    fn re_registering_keeps_position() {
        let mut table = table();
        table.add("/", RouteConfig::new("home", "Solar Home", "home")).unwrap();
        let entries = table.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1.title, "Solar Home");
    }
}
