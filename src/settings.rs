//! Per-principal settings with default merge
//!
//! Only overrides are stored; reads always merge them over the defaults.

use dashmap::DashMap;
use serde_json::{json, Map, Value};

/// Settings document
pub type Settings = Map<String, Value>;

/// Defaults applied under every principal's overrides
pub fn default_settings() -> Settings {
    let defaults = json!({
        "currency": "USD",
        "language": "es",
        "notifications": true,
        "theme": "light",
        "timezone": "America/Mexico_City",
    });

    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Keyed settings store
#[derive(Default)]
pub struct SettingsStore {
    overrides: DashMap<String, Settings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Effective settings for `email`
    pub fn get(&self, email: &str) -> Settings {
        let mut merged = default_settings();
        if let Some(overrides) = self.overrides.get(&Self::key(email)) {
            for (k, v) in overrides.iter() {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Merge `patch` into the stored overrides and return the effective settings
    pub fn update(&self, email: &str, patch: Settings) -> Settings {
        {
            let mut overrides = self.overrides.entry(Self::key(email)).or_default();
            for (k, v) in patch {
                overrides.insert(k, v);
            }
        }
        self.get(email)
    }
}
