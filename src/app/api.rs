use std::sync::{LazyLock, RwLock};

use crate::app::environment::environment_config;
use crate::app::types::ConnectionConfig;
use crate::app::LOGGER;
use crate::error::{configuration_error, OrmResult};

static DEFAULT_CONFIG: LazyLock<RwLock<Option<ConnectionConfig>>> =
    LazyLock::new(|| RwLock::new(None));

/// Stores the process-wide default connection parameters.
///
/// Later calls overwrite earlier ones. Sessions and mappings constructed without an
/// explicit config read this value.
pub fn set_default_config(config: ConnectionConfig) -> OrmResult<()> {
    config.validate()?;
    let mut slot = DEFAULT_CONFIG.write().unwrap();
    if let Some(previous) = slot.as_ref() {
        if previous.app_id != config.app_id {
            LOGGER.debug(format!(
                "Replacing default connection '{}' with '{}'",
                previous.app_id, config.app_id
            ));
        }
    }
    *slot = Some(config);
    Ok(())
}

pub fn default_config() -> Option<ConnectionConfig> {
    DEFAULT_CONFIG.read().unwrap().clone()
}

pub fn clear_default_config() {
    DEFAULT_CONFIG.write().unwrap().take();
}

/// Picks the config to connect with: `explicit`, then the process default, then the
/// environment defaults.
///
/// # Errors
/// Returns `orm/configuration` when none is available or the chosen one lacks
/// credentials.
pub fn resolve_config(explicit: Option<ConnectionConfig>) -> OrmResult<ConnectionConfig> {
    let config = explicit
        .or_else(default_config)
        .or_else(environment_config)
        .ok_or_else(|| {
            configuration_error(
                "No connection config was provided and no default has been set - call set_default_config() first",
            )
        })?;
    config.validate()?;
    Ok(config)
}
