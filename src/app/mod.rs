//! Connection configuration: explicit values, the process default, and
//! environment-provided defaults.

mod api;
pub mod environment;
mod types;

use std::sync::LazyLock;

use crate::logger::Logger;

pub use api::{clear_default_config, default_config, resolve_config, set_default_config};
pub use environment::environment_config;
pub use types::ConnectionConfig;

pub(crate) static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-orm/app"));
