#![forbid(unsafe_code)]

//! Remote agent execution core for the Catalyst idea workbench.
//!
//! Runs `claude` invocations on a remote host over a bounded pool of SSH
//! connections, decodes the agent's line-delimited stream-json output
//! into typed messages, and supervises one job per idea with idle-output
//! watchdog and cooperative cancellation.

pub mod command;
pub mod config;
pub mod errors;
pub mod models;
pub mod relay;
pub mod runner;
pub mod service;
pub mod store;
pub mod stream;
pub mod supervisor;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
