// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Logging setup for binaries and host extensions.
//!
//! ## Why This Module Exists
//!
//! The binding layer logs through `tracing` (allocation and release at trace
//! level, ingest/export at debug, device fallback at warn) but never installs a
//! subscriber on its own. Embedding applications call [`init_logging`] once;
//! the Python extension exposes it as `tensor_bridge.init_logging()`.
//!
//! ## Design Decisions
//!
//! - **tracing-based**: structured fields (`shape`, `dtype`, `bytes`) on every event
//! - **Environment-driven**: `RUST_LOG` always overrides the configured level
//! - **Idempotent**: guarded by `Once`, later calls are no-ops

use std::str::FromStr;
use std::sync::Once;

use crate::error::BridgeError;
use crate::memory::HandleStats;

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub default_level: LogLevel,
    /// Include timestamps in log output.
    pub with_timestamps: bool,
    /// Include target (module path) in log output.
    pub with_target: bool,
    /// Include source file and line numbers.
    pub with_file_line: bool,
    /// Use ANSI colors (disable for file output).
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_file_line: false,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Create a new logging configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Enable or disable timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }

    /// Verbose output with file/line info, including per-handle trace events.
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_level: LogLevel::Trace,
            with_timestamps: true,
            with_target: true,
            with_file_line: true,
            with_ansi: true,
        }
    }

    /// Clean output without colors.
    #[must_use]
    pub fn production() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }

    /// Warnings only, no decoration.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_level: LogLevel::Warn,
            with_timestamps: false,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and above.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Debug messages and above.
    Debug,
    /// All messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    fn as_filter_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(BridgeError::invalid_config(format!("unknown log level `{s}`"))),
        }
    }
}

/// Guard ensuring logging is only initialized once.
static INIT_LOGGING: Once = Once::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.default_level`. Only the first call
/// has an effect.
///
/// ## Example
///
/// ```rust
/// use tensor_bridge::{init_logging, LogConfig};
///
/// init_logging(&LogConfig::testing());
/// ```
pub fn init_logging(config: &LogConfig) {
    INIT_LOGGING.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| config.default_level.as_filter_str().to_string());

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.with_ansi)
            .with_target(config.with_target)
            .with_file(config.with_file_line)
            .with_line_number(config.with_file_line);

        // try_init: a host process may already own the global subscriber.
        let installed = if config.with_timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already set; keeping it");
        }
    });
}

/// Log a handle accounting snapshot.
///
/// ## Arguments
///
/// * `stats` - Snapshot from [`Bridge::stats`](crate::Bridge::stats)
/// * `context` - Description of the point being measured
pub fn log_handle_stats(stats: &HandleStats, context: &str) {
    #[allow(clippy::cast_precision_loss)]
    let to_mb = |bytes: usize| bytes as f64 / (1024.0 * 1024.0);

    tracing::debug!(
        target: "tensor_bridge::memory",
        live_handles = stats.live_handles,
        live_mb = format!("{:.2}", to_mb(stats.live_bytes)),
        peak_mb = format!("{:.2}", to_mb(stats.peak_bytes)),
        allocations = stats.allocations,
        releases = stats.releases,
        context,
        "Handle usage"
    );

    if stats.live_handles == 0 && stats.allocations != stats.releases {
        tracing::warn!(
            target: "tensor_bridge::memory",
            allocations = stats.allocations,
            releases = stats.releases,
            context,
            "allocation and release counts disagree with no live handles"
        );
    }
}
