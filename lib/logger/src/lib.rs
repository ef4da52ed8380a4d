use anyhow::Context;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Server log mode, keeping the `debug` / `release` naming of the
/// `KRANE_LOG_LEVEL` environment variable.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Debug,
  #[default]
  Release,
}

impl From<LogLevel> for tracing::Level {
  fn from(value: LogLevel) -> tracing::Level {
    match value {
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Release => tracing::Level::INFO,
    }
  }
}

pub fn init(level: LogLevel) -> anyhow::Result<()> {
  let log_level: tracing::Level = level.into();

  Registry::default()
    .with(LevelFilter::from(log_level))
    .with(
      tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false),
    )
    .try_init()
    .context("failed to init logger")
}
