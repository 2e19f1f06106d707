#![warn(clippy::unwrap_used)]

pub mod intelligence;
pub mod nova;
pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::{build_router, ApiServer};
