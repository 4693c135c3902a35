//! # Observability
//!
//! Structured logging for the harness. Hooks and stores log through `tracing`;
//! test binaries call [`init_logging`] once to see the output.

pub mod logging;

pub use logging::init_logging;
