//! # Configuration
//!
//! Client settings resolved from defaults, a YAML/JSON file, `CAREPORTAL_*`
//! environment variables, and command-line overrides.

pub mod client;
