//! # Logging & Tracing Infrastructure
//!
//! Structured logging for the backup engine, built on `tracing`:
//! - Pretty, JSON and compact output
//! - Per-crate filtering through `EnvFilter`
//! - Helpers that keep credentials, e-mails and full paths out of log lines
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() -> core_runtime::Result<()> {
//!     init_logging(
//!         LoggingConfig::default()
//!             .with_format(LogFormat::Compact)
//!             .with_level(LogLevel::Debug),
//!     )?;
//!
//!     tracing::info!("Backup engine started");
//!     Ok(())
//! }
//! ```
//!
//! `RUST_LOG` is not consulted; pass a custom directive string through
//! [`LoggingConfig::with_filter`] instead.

use crate::error::{Error, Result};
use std::io;
use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan, prelude::*};

/// Crates whose events follow the configured level.
const WORKSPACE_TARGETS: &[&str] = &[
    "music_backup_workspace",
    "core_runtime",
    "core_library",
    "core_auth",
    "core_sync",
    "provider_google_drive",
    "bridge_desktop",
];

/// Chatty dependencies pinned to `warn`.
const QUIET_TARGETS: &[&str] = &["h2", "hyper", "reqwest", "rustls", "sqlx"];

/// Minimum severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// One JSON object per event
    Json,
    /// Single-line text
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Custom directives (e.g. `"core_sync=trace,sqlx=info"`), replacing the defaults
    pub filter: Option<String>,
    /// Emit span enter/exit events for `#[instrument]`ed operations
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: false,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`Error::Config`] when the filter is invalid or a global subscriber is
/// already installed (calling this twice is an error).
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_span_events(span_events)
        .with_writer(io::stdout);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(base.pretty()).try_init(),
        LogFormat::Json => registry
            .with(
                base.json()
                    .flatten_event(true)
                    .with_current_span(config.enable_spans)
                    .with_span_list(config.enable_spans),
            )
            .try_init(),
        LogFormat::Compact => registry.with(base.compact()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_directive();
            WORKSPACE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level))
                .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(directives).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

/// Redact a value when its field name marks it as a secret.
///
/// E-mail addresses are masked regardless of the field name.
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// tracing::debug!(cookie = %redact_if_sensitive("innerTubeCookie", &cookie), "Applying account");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "token",
        "secret",
        "password",
        "cookie",
        "session_key",
        "sessionkey",
        "authorization",
        "code_verifier",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|f| field_lower.contains(f)) {
        return "[REDACTED]".to_string();
    }

    match value.find('@') {
        Some(at) if value[at..].contains('.') => {
            let first: String = value.chars().take(1.min(at)).collect();
            format!("{}***@[REDACTED]", first)
        }
        _ => value.to_string(),
    }
}

/// Keep only the final path component.
///
/// ```ignore
/// tracing::info!(file = %strip_path(&backup.to_string_lossy()), "Backup written");
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
