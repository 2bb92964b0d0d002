//! Codepilot Core Library
//!
//! This crate provides the foundational utilities shared by every Codepilot crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (`AppConfig`, `AnalysisSettings`)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AnalysisSettings, AppConfig};
pub use error::{AppError, AppResult};
