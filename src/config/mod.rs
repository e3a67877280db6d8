mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{AccountSettings, BrokerSettings, LogSettings, ServerSettings, Settings};

/// Default location of the configuration file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Prefix of environment variables, e.g. `LEDGERCAST_BROKER__SUBSCRIBER_BUFFER=32`.
pub const ENV_PREFIX: &str = "LEDGERCAST";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional) and environment variables,
/// then merges the result with default values.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
