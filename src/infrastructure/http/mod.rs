//! HTTP transport adapter.

mod client;

pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpClient};
