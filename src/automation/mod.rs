//! UI automation for reaching and capturing the Alliance Logs page.
//!
//! This module provides:
//! - Configuration loading with defaults
//! - The pop-up dismissal loop and its retry state
//! - OCR report output

pub mod clock;
pub mod config;
pub mod report;
pub mod resolver;
pub mod state;

pub use config::{AppConfig, load_config};
pub use resolver::resolve;
