use std::path::PathBuf;

use anyhow::Context;
use logger::LogLevel;
use serde::Deserialize;

/// Environment of the krane binary. Every variable is prefixed
/// with `KRANE_`.
#[derive(Deserialize)]
struct Env {
  rest_port: Option<u16>,
  log_level: Option<LogLevel>,
  signing_key: Option<String>,
  #[serde(default)]
  proxy_dashboard_secure: bool,
  proxy_dashboard_alias: Option<String>,
  db_path: Option<PathBuf>,
  job_workers: Option<usize>,
  job_queue_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
  /// Port the rest api binds to. Default: 8500
  pub rest_port: u16,
  pub log_level: LogLevel,
  /// HMAC secret used to sign session tokens. Required; the server
  /// refuses to start without it.
  pub signing_key: String,
  /// Whether the proxy dashboard is served behind tls.
  pub proxy_dashboard_secure: bool,
  /// DNS alias routed to the proxy dashboard.
  pub proxy_dashboard_alias: Option<String>,
  /// Location of the embedded database.
  /// Default: `$HOME/.krane/db/krane`
  pub db_path: PathBuf,
  /// Size of the job worker pool. Default: number of cpus.
  pub job_workers: usize,
  /// Backlog accepted by the job queue before submissions are
  /// rejected. Default: 256
  pub job_queue_size: usize,
}

impl CoreConfig {
  pub fn from_env() -> anyhow::Result<CoreConfig> {
    let env: Env = envy::prefixed("KRANE_")
      .from_env()
      .context("failed to parse krane environment")?;

    let signing_key = env
      .signing_key
      .filter(|key| !key.is_empty())
      .context("KRANE_SIGNING_KEY must be set")?;

    let db_path = match env.db_path {
      Some(path) => path,
      None => {
        let home = std::env::var_os("HOME")
          .context("unable to resolve home directory")?;
        PathBuf::from(home).join(".krane/db/krane")
      }
    };

    Ok(CoreConfig {
      rest_port: env.rest_port.unwrap_or(8500),
      log_level: env.log_level.unwrap_or_default(),
      signing_key,
      proxy_dashboard_secure: env.proxy_dashboard_secure,
      proxy_dashboard_alias: env
        .proxy_dashboard_alias
        .filter(|alias| !alias.is_empty()),
      db_path,
      job_workers: env.job_workers.unwrap_or_else(default_workers),
      job_queue_size: env.job_queue_size.unwrap_or(256),
    })
  }

  /// The config with the signing key redacted, safe to log on
  /// startup.
  pub fn sanitized(&self) -> CoreConfig {
    let mut config = self.clone();
    config.signing_key = String::from("#############");
    config
  }
}

fn default_workers() -> usize {
  std::thread::available_parallelism()
    .map(|count| count.get())
    .unwrap_or(1)
}
