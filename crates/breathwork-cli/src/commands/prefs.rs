use breathwork_core::{Config, TechniqueId, Theme};
use clap::Subcommand;

use super::load_preferences;

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print current preferences as JSON
    Show,
    /// Set a preference
    Set {
        /// One of: sound, vibration, technique, theme
        key: String,
        /// New value (on/off, true/false, technique id, light/dark/system)
        value: String,
    },
}

fn parse_switch(key: &str, value: &str) -> Result<bool, Box<dyn std::error::Error>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("invalid value for {key}: '{other}' (expected on/off)").into()),
    }
}

pub fn run(action: PrefsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let prefs = load_preferences(&config)?;

    match action {
        PrefsAction::Show => {}
        PrefsAction::Set { key, value } => match key.as_str() {
            "sound" | "sound_enabled" => prefs.set_sound_enabled(parse_switch(&key, &value)?)?,
            "vibration" | "vibration_enabled" => {
                prefs.set_vibration_enabled(parse_switch(&key, &value)?)?
            }
            "technique" => prefs.set_technique(value.parse::<TechniqueId>()?)?,
            "theme" => prefs.set_theme(value.parse::<Theme>()?)?,
            other => return Err(format!("unknown preference: {other}").into()),
        },
    }

    println!("{}", serde_json::to_string_pretty(&prefs.get())?);
    Ok(())
}
