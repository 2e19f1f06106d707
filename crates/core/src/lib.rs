//! Shared building blocks for the Goldstone workspace: configuration, the
//! common error type, request-parameter validation and time helpers.

pub mod config;
pub mod error;
pub mod params;
pub mod templates;
pub mod time;

pub use config::AppConfig;
pub use error::{GoldstoneError, GoldstoneResult};
pub use params::{Interval, Param, RawParams, ValidatedParams};
