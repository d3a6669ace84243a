//! Builders for test and development configurations.

pub mod config;

pub use config::{ConfigBuilder, DEV_PRIVATE_KEY};
