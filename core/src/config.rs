/// Configuration management
use crate::error::{Result, SyncError};
use crate::thread_builder::DEFAULT_DANGLING_WARN_AFTER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the room server, e.g. `http://host:port`
    pub server_url: String,

    /// Directory holding the local message cache
    pub data_dir: PathBuf,

    /// Upper bound for any single request to the server
    pub request_timeout: Duration,

    /// Delay between refreshes in watch mode
    pub poll_interval: Duration,

    /// Cycles a dangling reply may stay unresolved before it is reported
    pub dangling_warn_after: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: PathBuf::from(".roomsync"),
            request_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            dangling_warn_after: DEFAULT_DANGLING_WARN_AFTER,
        }
    }
}

impl Config {
    /// Parse the global flags leading `args` (without the program name).
    /// Parsing stops at the first positional argument, the command; it and
    /// everything after it are returned untouched.
    pub fn from_args(args: &[String]) -> Result<(Self, Vec<String>)> {
        let mut config = Self::default();
        let mut rest = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--server" => {
                    config.server_url = flag_value(args, i, "--server")?.to_string();
                    i += 2;
                }
                "--data-dir" => {
                    config.data_dir = PathBuf::from(flag_value(args, i, "--data-dir")?);
                    i += 2;
                }
                "--timeout-ms" => {
                    config.request_timeout =
                        Duration::from_millis(parse_number(args, i, "--timeout-ms")?);
                    i += 2;
                }
                "--poll-ms" => {
                    config.poll_interval = Duration::from_millis(parse_number(args, i, "--poll-ms")?);
                    i += 2;
                }
                "--dangling-warn" => {
                    let n = parse_number(args, i, "--dangling-warn")?;
                    config.dangling_warn_after = u32::try_from(n).map_err(|_| {
                        SyncError::Config("--dangling-warn is out of range".to_string())
                    })?;
                    i += 2;
                }
                _ => {
                    rest.extend_from_slice(&args[i..]);
                    break;
                }
            }
        }

        config.apply_env();
        config.validate()?;
        Ok((config, rest))
    }

    /// Env overrides (nice for scripts)
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("ROOMSYNC_SERVER") {
            self.server_url = url;
        }
        if let Ok(dir) = std::env::var("ROOMSYNC_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = std::env::var("ROOMSYNC_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.request_timeout = Duration::from_millis(ms);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server_uri()?;
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request timeout must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Server base URL as an absolute http URI
    pub fn server_uri(&self) -> Result<http::Uri> {
        let uri: http::Uri = self
            .server_url
            .parse()
            .map_err(|e| SyncError::Config(format!("Invalid server URL {}: {}", self.server_url, e)))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(SyncError::Config(format!(
                "Server URL must be an absolute http:// URL, got {}",
                self.server_url
            )));
        }
        Ok(uri)
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| SyncError::Config(format!("{} requires an argument", flag)))
}

fn parse_number(args: &[String], i: usize, flag: &str) -> Result<u64> {
    flag_value(args, i, flag)?
        .parse::<u64>()
        .map_err(|_| SyncError::Config(format!("{} must be a number", flag)))
}
