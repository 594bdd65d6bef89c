//! ui
//!
//! Logging initialisation and command output.
//!
//! # Modules
//!
//! - [`output`] - Verbosity, the `tracing` subscriber, and stdout helpers

pub mod output;
