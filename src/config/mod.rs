//! Configuration module for Scholar-Ripple
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] value is passed explicitly into every component
//! constructor; nothing reads configuration from global state.
//!
//! # Example
//!
//! ```no_run
//! use scholar_ripple::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Requests are spaced {}ms apart", config.transport.request_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_tool_user_agent, BlockDetectionConfig, Config, CrawlerConfig, DownloadConfig,
    OpenAccessConfig, OutputConfig, TransportConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
