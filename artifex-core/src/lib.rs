//! # artifex-core
//!
//! Layered configuration and the HTTP serving boundary for the Artifex
//! prediction service. The model-side logic lives in `artifex-ml`.

pub mod config;
pub mod gateway;

pub use config::{AppConfig, ConfigOverrides, LoggingConfig, load_config};
pub use gateway::{AppState, GatewayConfig, GatewayError};
