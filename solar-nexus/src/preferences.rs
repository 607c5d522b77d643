//! Persisted user preferences and how they are applied to the document.

use serde::{Deserialize, Serialize};

use crate::dom::Document;
use crate::state::StateStore;

/// State key holding the preferences; it is on the persisted allow-list.
pub const PREFERENCES_KEY: &str = "preferences";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    /// Light and dark swap; system switches to light.
    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark | Theme::System => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    pub reduced_motion: bool,
    pub animations: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            reduced_motion: false,
            animations: true,
        }
    }
}

impl Preferences {
    /// Read from state, falling back to defaults when unset or malformed.
    pub fn load(state: &StateStore) -> Self {
        match state.get(PREFERENCES_KEY) {
            None => Self::default(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|error| {
                tracing::warn!(%error, "ignoring malformed preferences");
                Self::default()
            }),
        }
    }

    /// Whether animated components should run their loops.
    pub fn motion_enabled(&self) -> bool {
        self.animations && !self.reduced_motion
    }

    /// Reflect the preferences as attributes on `<body>`.
    pub fn apply(&self, document: &Document) {
        let body = document.body();
        document.set_attribute(body, "data-theme", self.theme.as_str());
        document.set_attribute(body, "data-reduced-motion", self.reduced_motion.to_string());
        document.set_attribute(body, "data-animations", self.motion_enabled().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn missing_fields_take_defaults() {
        let prefs: Preferences = serde_json::from_value(json!({ "theme": "dark" })).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert!(prefs.animations);
        assert!(!prefs.reduced_motion);
    }

    #[test]
    fn malformed_preferences_fall_back() {
        let state = StateStore::new(Arc::new(MemoryStorage::new()));
        state.set(PREFERENCES_KEY, json!({ "theme": "sepia" }));
        assert_eq!(Preferences::load(&state), Preferences::default());
    }

    #[test]
    fn apply_sets_body_attributes() {
        let document = Document::new();
        let prefs = Preferences {
            theme: Theme::Dark,
            reduced_motion: true,
            animations: true,
        };
        prefs.apply(&document);
        let body = document.body();
        assert_eq!(document.attribute(body, "data-theme").as_deref(), Some("dark"));
        assert_eq!(document.attribute(body, "data-reduced-motion").as_deref(), Some("true"));
        assert_eq!(document.attribute(body, "data-animations").as_deref(), Some("false"));
    }
}
