//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing, routed to console and/or a log file

pub mod logging;
