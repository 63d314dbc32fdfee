//! Utilities shared by the Flowra real-time packages.

pub mod logger;
pub mod time;
