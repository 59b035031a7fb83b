pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pricing;
pub mod services;
pub mod stream;

pub use client::PolygonClient;
pub use error::{AppError, Result};
