//! Image conversion error types.

use thiserror::Error;

/// Image conversion error variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConvertError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("invalid SVG document: {0}")]
    Svg(String),

    #[error("failed to render SVG: {0}")]
    Render(String),

    #[error("failed to encode PNG: {0}")]
    Encode(String),

    #[error("conversion task failed: {0}")]
    Task(String),
}
