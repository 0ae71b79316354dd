//! Shared utilities for the equity research workspace
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and application settings.

pub mod config;
pub mod logging;

pub use config::{LogFormat, Settings, SettingsError};
pub use logging::{init_tracing, init_tracing_with};
