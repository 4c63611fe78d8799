//! Image handling infrastructure.
//!
//! This module provides:
//! - Content-type sniffing for downloaded payloads
//! - PNG canonicalization of raster and SVG avatars

pub mod content;
pub mod normalizer;

pub use content::{accepted_mime_type, looks_like_svg, sniff_mime_type};
pub use normalizer::{DEFAULT_TARGET_SIZE, ImageNormalizer, TargetSize};
