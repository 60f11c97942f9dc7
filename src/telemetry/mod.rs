//! Telemetry: structured logging for the scheduler.
//!
//! The scheduler has no remote observability surface of its own (§6: "No
//! wire protocol; no on-disk format mandated by the core"), so this module
//! is deliberately narrow: `tracing`-backed structured logging, configurable
//! between JSON and pretty output. Every scheduler subsystem emits spans and
//! events through `tracing`; this module just wires up the subscriber.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};
