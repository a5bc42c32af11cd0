//! Shared types for the refill-spot reconciliation services
//!
//! Carries the error type, configuration loading, and the venue data models
//! used by the pipeline crate and by any future fetch/report members.

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
