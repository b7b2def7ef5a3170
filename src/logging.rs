//! Logging setup for the warehouse binary

use std::env;
use tracing_subscriber::EnvFilter;

/// Log output format, selected with `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Full,
  Compact,
}

impl LogFormat {
  pub fn from_env() -> Self {
    match env::var("LOG_FORMAT").as_deref() {
      Ok("compact") => LogFormat::Compact,
      _ => LogFormat::Full,
    }
  }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Calling this more than once is harmless; later calls keep the first subscriber.
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

  let result = match LogFormat::from_env() {
    LogFormat::Compact => builder.compact().try_init(),
    LogFormat::Full => builder.try_init(),
  };
  if result.is_err() {
    tracing::debug!("Logging already initialized");
  }
}
