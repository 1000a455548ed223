//! Domain models shared across the application.

pub mod job;
pub mod message;
pub mod session;
