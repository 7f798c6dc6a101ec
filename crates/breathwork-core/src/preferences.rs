//! User preferences that gate cues and pick defaults.
//!
//! Persisted as JSON in a [`KeyValueStore`] under [`PREFERENCES_KEY`]. Older
//! builds wrote the same settings nested under `state` and/or `preferences`
//! with camelCase names; [`Preferences::from_stored`] accepts all of them.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::notifier::{Notifier, SubscriberError, SubscriptionId};
use crate::storage::KeyValueStore;
use crate::technique::TechniqueId;

/// Namespace key the preferences are stored under.
pub const PREFERENCES_KEY: &str = "breathwork.preferences";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
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
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" | "auto" => Ok(Theme::System),
            other => Err(CoreError::state("theme", format!("unknown theme '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_true", alias = "soundEnabled")]
    pub sound_enabled: bool,
    #[serde(default = "default_true", alias = "vibrationEnabled")]
    pub vibration_enabled: bool,
    #[serde(default, alias = "selectedTechnique", alias = "technique_id")]
    pub technique: TechniqueId,
    #[serde(default)]
    pub theme: Theme,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            vibration_enabled: true,
            technique: TechniqueId::default(),
            theme: Theme::default(),
        }
    }
}

impl Preferences {
    /// Parse a stored payload, unwrapping legacy `state`/`preferences`
    /// envelopes. Unknown technique or theme values fall back to defaults
    /// field by field instead of discarding the whole record.
    pub fn from_stored(raw: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        for envelope in ["state", "preferences"] {
            if let Some(inner) = value.get(envelope).filter(|v| v.is_object()).cloned() {
                value = inner;
            }
        }

        match serde_json::from_value::<Preferences>(value.clone()) {
            Ok(prefs) => Ok(prefs),
            Err(err) => {
                tracing::warn!(error = %err, "stored preferences partially invalid, normalizing");
                Ok(Self::salvage(&value))
            }
        }
    }

    fn salvage(value: &serde_json::Value) -> Self {
        let defaults = Self::default();
        let field = |names: &[&str]| names.iter().find_map(|n| value.get(*n)).cloned();
        Self {
            sound_enabled: field(&["sound_enabled", "soundEnabled"])
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.sound_enabled),
            vibration_enabled: field(&["vibration_enabled", "vibrationEnabled"])
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.vibration_enabled),
            technique: field(&["technique", "selectedTechnique", "technique_id"])
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or(defaults.technique),
            theme: field(&["theme"])
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
                .unwrap_or(defaults.theme),
        }
    }
}

/// Observable, persisted preferences.
pub struct PreferencesState {
    prefs: RefCell<Preferences>,
    notifier: Notifier<Preferences>,
    store: Box<dyn KeyValueStore>,
}

impl PreferencesState {
    /// Load from `store`, falling back to defaults when nothing (or
    /// unreadable data) is stored.
    pub fn load(store: impl KeyValueStore + 'static) -> Self {
        Self::load_with_defaults(store, Preferences::default())
    }

    /// Like [`PreferencesState::load`], with `defaults` used for a store
    /// that holds no usable record.
    pub fn load_with_defaults(store: impl KeyValueStore + 'static, defaults: Preferences) -> Self {
        let prefs = match store.get(PREFERENCES_KEY) {
            Ok(Some(raw)) => Preferences::from_stored(&raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "discarding unreadable preferences");
                defaults
            }),
            Ok(None) => defaults,
            Err(err) => {
                tracing::warn!(error = %err, "preferences store unavailable, using defaults");
                defaults
            }
        };
        Self {
            prefs: RefCell::new(prefs),
            notifier: Notifier::new("preferences"),
            store: Box::new(store),
        }
    }

    pub fn get(&self) -> Preferences {
        self.prefs.borrow().clone()
    }

    pub fn sound_enabled(&self) -> bool {
        self.prefs.borrow().sound_enabled
    }

    pub fn vibration_enabled(&self) -> bool {
        self.prefs.borrow().vibration_enabled
    }

    pub fn technique(&self) -> TechniqueId {
        self.prefs.borrow().technique
    }

    pub fn theme(&self) -> Theme {
        self.prefs.borrow().theme
    }

    pub fn set_sound_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|p| p.sound_enabled = enabled)
    }

    pub fn set_vibration_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|p| p.vibration_enabled = enabled)
    }

    pub fn set_technique(&self, technique: TechniqueId) -> Result<()> {
        self.update(|p| p.technique = technique)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.update(|p| p.theme = theme)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Preferences) -> Result<(), SubscriberError> + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Persist first; memory and subscribers only see the change once it
    /// is stored.
    fn update(&self, mutate: impl FnOnce(&mut Preferences)) -> Result<()> {
        let mut next = self.get();
        mutate(&mut next);
        if next == *self.prefs.borrow() {
            return Ok(());
        }
        let raw = serde_json::to_string(&next)?;
        self.store.set(PREFERENCES_KEY, &raw)?;
        *self.prefs.borrow_mut() = next.clone();
        tracing::debug!(preferences = %raw, "preferences updated");
        self.notifier.notify(next);
        Ok(())
    }
}

impl fmt::Debug for PreferencesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferencesState")
            .field("prefs", &*self.prefs.borrow())
            .field("notifier", &self.notifier)
            .finish()
    }
}
