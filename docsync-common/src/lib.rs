//! # docsync Common Library
//!
//! Shared code for the docsync services:
//! - Error types
//! - Bootstrap configuration (TOML + root folder resolution)
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
