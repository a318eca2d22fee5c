//! Structured logging system using tracing crate
//!
//! ## Log Format Options
//!
//! The output format is controlled by the `LOG_FORMAT` environment variable:
//!
//! - `json` - Structured JSON format for log aggregation systems
//! - `pretty` - Human-readable format with colors and indentation
//! - `compact` - Terminal-friendly format with colors but minimal spacing
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Log level (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (json, pretty, compact) - defaults to compact
//! - `LOG_SPANS`: Include span events (true/false) - defaults to false
//! - `RUST_LOG`: Override log filtering (follows env_logger format)
//!
//! ## Examples
//!
//! ```bash
//! # Watch the light from a terminal
//! LOG_LEVEL=INFO ./light-sim
//!
//! # Ship logs to an aggregator
//! LOG_FORMAT=json ./light-sim run
//!
//! # Everything, including rumqttc internals
//! RUST_LOG=trace ./light-sim
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

/// Dependencies whose INFO output drowns the light's own messages
const QUIET_TARGETS: &[&str] = &["rumqttc=warn", "tokio=warn"];

/// Log output format options
#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Effective level: `-v` raises to DEBUG, `-vv` to TRACE, otherwise `LOG_LEVEL`
pub fn level_from_env(verbosity: u8) -> Level {
    match verbosity {
        0 => parse_level(&env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string())),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    // Allow RUST_LOG to override
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Initialize logging with manual configuration
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) {
    let span_events = if include_spans {
        fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::registry().with(build_filter(level));

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(true)
                .with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(false)
                .with_span_events(span_events);
            subscriber.with(fmt_layer).init();
        }
    }
}

/// Initialize logging from environment variables and CLI verbosity
pub fn init_default_logging(verbosity: u8) {
    let level = level_from_env(verbosity);

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let log_format = LogFormat::parse(&format);

    let include_spans = env::var("LOG_SPANS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    init_logging(level, log_format, include_spans);
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Create a lifecycle event span
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

// Re-export macros for convenience
pub use {lifecycle_span, mqtt_span};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
        assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
        assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
    }

    #[test]
    fn test_log_format_parse_invalid_defaults_to_compact() {
        assert!(matches!(LogFormat::parse("invalid"), LogFormat::Compact));
        assert!(matches!(LogFormat::parse(""), LogFormat::Compact));
        assert!(matches!(LogFormat::parse("xml"), LogFormat::Compact));
    }

    #[test]
    fn test_parse_level() {
        let test_cases = vec![
            ("ERROR", Level::ERROR),
            ("warn", Level::WARN),
            ("Info", Level::INFO),
            ("DEBUG", Level::DEBUG),
            ("trace", Level::TRACE),
            ("invalid", Level::INFO),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_level(input), expected, "Failed for input: {input}");
        }
    }

    #[test]
    fn test_verbosity_overrides_log_level() {
        assert_eq!(level_from_env(1), Level::DEBUG);
        assert_eq!(level_from_env(2), Level::TRACE);
        assert_eq!(level_from_env(7), Level::TRACE);
    }

    #[test]
    fn test_quiet_targets_are_valid_directives() {
        for directive in QUIET_TARGETS {
            assert!(
                directive.parse::<Directive>().is_ok(),
                "bad directive: {directive}"
            );
        }
    }

    #[test]
    fn test_span_macros_build_spans() {
        let span = crate::mqtt_span!(client_id = "light_simulator_1");
        let _entered = span.enter();
        let _lifecycle = crate::lifecycle_span!(phase = "startup");
    }
}
