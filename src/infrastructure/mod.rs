//! Infrastructure: configuration loading, logging, and engine setup.

pub mod config;
pub mod logging;
pub mod setup;
