//! HTTP service classifying uploaded skin images as acne or other.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod inferer;
pub mod loader;
pub mod nn;
pub mod router;

pub use error::TriageError;
