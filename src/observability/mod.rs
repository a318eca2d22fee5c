//! Observability for the light simulator
//!
//! Structured logging only; all failures are observable through logs.

pub mod logging;

pub use logging::{init_default_logging, init_logging, level_from_env, LogFormat};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span};
