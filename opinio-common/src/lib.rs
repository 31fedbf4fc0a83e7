//! # Opinio Common Library
//!
//! Shared code for the Opinio feedback tools:
//! - Error type used at configuration boundaries
//! - TOML bootstrap configuration loading and resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
