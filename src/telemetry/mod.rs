//! Observability for the reconciliation engine.
//!
//! The engine emits `tracing` events and spans: one span per module run
//! (`module`, `state`), `debug` events for every computed command and `warn`
//! events for skipped input. This module configures where they go.
//!
//! ```rust,ignore
//! use opengear_om::telemetry::{LogFormat, LogLevel, LoggingBuilder};
//!
//! LoggingBuilder::new()
//!     .with_level(LogLevel::Debug)
//!     .with_format(LogFormat::Json)
//!     .init()?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, LogLevel, LoggingConfig};
pub use logging::{init_logging, LoggingBuilder};
