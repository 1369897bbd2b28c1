//! Core infrastructure layer for the Galaxis engine.
//!
//! This crate provides the foundation the rendering and UI layers build on:
//! error types, logging initialization, engine configuration and a small set
//! of geometric and color primitives. It contains no GPU code.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{ConfigError, LoggingError};
