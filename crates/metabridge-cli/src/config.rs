//! Connection and logging settings.
//!
//! Every value can come from a flag or an environment variable; flags win.
//! Validation is separate from parsing so offline commands never need a
//! Metabase URL.

use std::time::Duration;

use clap::{Args, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::error::{CliError, Result};

/// Raw connection flags as parsed by clap.
#[derive(Args, Clone)]
pub struct ConnectionArgs {
    /// Metabase instance URL
    #[arg(long, env = "METABASE_URL", global = true)]
    pub metabase_url: Option<String>,

    /// Metabase API key (takes precedence over username/password)
    #[arg(long, env = "METABASE_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Metabase username for session authentication
    #[arg(long, env = "METABASE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Metabase password for session authentication
    #[arg(long, env = "METABASE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Total timeout for each HTTP request, in seconds
    #[arg(long, env = "METABASE_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ConnectionArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionArgs")
            .field("metabase_url", &self.metabase_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Validated connection settings.
pub struct Settings {
    pub metabase_url: String,
    pub api_key: SecretString,
    pub username: String,
    pub password: SecretString,
    pub timeout: Duration,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("metabase_url", &self.metabase_url)
            .field("api_key", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Settings {
    #[must_use]
    pub fn uses_api_key(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

impl ConnectionArgs {
    /// Normalises and validates the flags.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the URL is missing, if neither an API
    /// key nor a complete username/password pair is given, or if the timeout
    /// is zero.
    pub fn validate(&self) -> Result<Settings> {
        let metabase_url = self
            .metabase_url
            .as_deref()
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/')
            .to_string();
        if metabase_url.is_empty() {
            return Err(CliError::Config(
                "metabase URL is required (--metabase-url or METABASE_URL)".to_string(),
            ));
        }

        let api_key = self.api_key.clone().unwrap_or_default();
        let username = self.username.clone().unwrap_or_default();
        let password = self.password.clone().unwrap_or_default();
        if api_key.is_empty() && (username.is_empty() || password.is_empty()) {
            return Err(CliError::Config(
                "either API key (--api-key or METABASE_API_KEY) or username/password \
                 (--username/--password or METABASE_USERNAME/METABASE_PASSWORD) is required"
                    .to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(CliError::Config(
                "timeout must be at least one second".to_string(),
            ));
        }

        Ok(Settings {
            metabase_url,
            api_key: SecretString::new(api_key.into()),
            username,
            password: SecretString::new(password.into()),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// Output format for log lines on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging flags.
#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format
    #[arg(
        long,
        env = "METABRIDGE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty,
        global = true
    )]
    pub log_format: LogFormat,
}

impl LoggingArgs {
    /// The configured level; an unrecognised value falls back to `info`.
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.log_level.trim().parse().unwrap_or(LevelFilter::INFO)
    }

    /// Filter used by the subscriber: `RUST_LOG` if set, else [`Self::level`].
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level().into())
            .from_env_lossy()
    }
}
