//! # mrfrank
//!
//! Library side of the mrfrank binary: the CLI definition, its command
//! implementations and the batch run configuration. Exposed so the
//! integration tests can drive commands without spawning a process.

pub mod cli;
pub mod config;
