pub mod config;
pub mod prefs;
pub mod session;
pub mod techniques;

use breathwork_core::{Config, FileStore, Preferences, PreferencesState};

/// Preferences from the data directory, seeded with the configured default
/// technique on first run.
pub(crate) fn load_preferences(
    config: &Config,
) -> Result<PreferencesState, Box<dyn std::error::Error>> {
    let defaults = Preferences {
        technique: config.session.default_technique,
        ..Preferences::default()
    };
    Ok(PreferencesState::load_with_defaults(
        FileStore::open_default()?,
        defaults,
    ))
}
