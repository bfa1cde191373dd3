//! Configuration, data paths and the shared error type.

pub mod config;
pub mod error;

pub use config::{ArqonzConfig, DataPaths, GatewayConfig, PollingConfig};
pub use error::{Error, Result};
