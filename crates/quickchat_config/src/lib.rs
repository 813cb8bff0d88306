//! quickchat_config
//!
//! Layered configuration: an optional `config/default.{toml,json,yaml}` file,
//! then `QUICKCHAT_*` environment variables (nested keys separated by `__`,
//! e.g. `QUICKCHAT_REALTIME__QUEUE_CAPACITY`), then the bare `PORT` variable.
//! A `.env` file in the working directory is loaded first when present.

pub mod settings;


use config::{Config, Environment, File};

pub use config::ConfigError;
pub use settings::{
    LogSettings, PartialSettings, RealtimeSettings, ServerSettings, Settings, StorageSettings,
};

/// Load settings from the default locations.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Load settings using `path` as the (optional) config file name.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("QUICKCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.port", std::env::var("PORT").ok())?;

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge(Settings::default());
    validate(&settings)?;
    Ok(settings)
}

/// Reject combinations the realtime pumps cannot run with.
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let realtime = &settings.realtime;
    if realtime.queue_capacity == 0 {
        return Err(ConfigError::Message(
            "realtime.queue_capacity must be greater than zero".to_string(),
        ));
    }
    if realtime.ping_period_ms == 0 || realtime.ping_period_ms >= realtime.pong_wait_ms {
        return Err(ConfigError::Message(format!(
            "realtime.ping_period_ms ({}) must be non-zero and shorter than realtime.pong_wait_ms ({})",
            realtime.ping_period_ms, realtime.pong_wait_ms
        )));
    }
    if realtime.write_wait_ms == 0 {
        return Err(ConfigError::Message(
            "realtime.write_wait_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
