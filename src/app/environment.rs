//! Connection defaults read from the process environment.

use std::env;
use std::fs;

use serde_json::Value;

use crate::app::types::ConnectionConfig;
use crate::app::LOGGER;

/// Environment variable holding a JSON-encoded [`ConnectionConfig`].
pub const CONFIG_ENV_VAR: &str = "FIREBASE_ORM_CONFIG";
/// Environment variable naming a file that contains a JSON-encoded [`ConnectionConfig`].
pub const CONFIG_PATH_ENV_VAR: &str = "FIREBASE_ORM_CONFIG_PATH";

/// Returns the connection defaults published through the environment, if any.
pub fn environment_config() -> Option<ConnectionConfig> {
    let raw = defaults_from_env().or_else(defaults_from_path)?;
    parse_config(&raw)
}

fn defaults_from_env() -> Option<String> {
    env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
}

fn defaults_from_path() -> Option<String> {
    let path = env::var(CONFIG_PATH_ENV_VAR).ok()?;
    match fs::read_to_string(&path) {
        Ok(contents) => Some(contents),
        Err(err) => {
            LOGGER.warn(format!("Unable to read {CONFIG_PATH_ENV_VAR} ({path}): {err}"));
            None
        }
    }
}

fn parse_config(raw: &str) -> Option<ConnectionConfig> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            LOGGER.warn(format!("Ignoring malformed connection defaults: {err}"));
            return None;
        }
    };
    match serde_json::from_value(value) {
        Ok(config) => Some(config),
        Err(err) => {
            LOGGER.warn(format!("Ignoring incomplete connection defaults: {err}"));
            None
        }
    }
}
