//! Configuration module for Scrapeflow
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key is optional, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! # Example
//!
//! ```no_run
//! use scrapeflow::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scrapeflow.toml")).unwrap();
//! println!("Up to {} fetches in flight", config.scheduler.concurrency_cap);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, LoggingSettings, NetworkSettings, OutputSettings, ResourceSettings, RetrySettings,
    SchedulerSettings, SchedulingMode, SearchSettings, SecuritySettings, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_or_default, load_config_with_hash};

pub(crate) use validation::validate_domain_pattern;
