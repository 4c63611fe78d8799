//! Sender avatars - avatar resolution for email correspondents.
//!
//! This crate resolves an image for a message author through an ordered chain
//! of sources (contact photos, persistent cache, BIMI, hashed-email services,
//! favicon APIs), with deduplication of concurrent lookups and a colored
//! initials fallback.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the resolution services and DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "sender-avatars";
