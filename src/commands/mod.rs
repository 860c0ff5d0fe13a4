pub mod check;
pub mod run;

use std::path::PathBuf;

use anyhow::Context;
use botkit_core::{BotConfig, LogFormat, LoggingConfig};
use clap::ArgMatches;
use tracing_subscriber::EnvFilter;

pub(crate) fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("botkit.toml"))
}

pub(crate) fn load_config(matches: &ArgMatches) -> anyhow::Result<BotConfig> {
    let path = config_path(matches);
    BotConfig::from_file(&path).with_context(|| format!("loading {}", path.display()))
}

/// `RUST_LOG` wins over the configured level.
pub(crate) fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}
