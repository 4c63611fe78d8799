//! Canonicalizes avatar payloads to PNG.

use std::io::Cursor;
use std::sync::LazyLock;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbaImage, imageops::FilterType};
use regex::Regex;
use resvg::{tiny_skia, usvg};
use tracing::{debug, error};

use crate::domain::entities::AvatarImage;
use crate::domain::errors::ConvertError;

use super::content::looks_like_svg;

/// Longer side of an SVG rendered without explicit dimensions.
pub const DEFAULT_TARGET_SIZE: u32 = 1000;

static SVG_START_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<svg\b[^>]*>").expect("Invalid regex"));

static SIZE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s(width|height)\s*=\s*("[^"]*"|'[^']*')"#).expect("Invalid regex")
});

/// Requested output dimensions. Missing sides are derived from the aspect ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetSize {
    /// Output width in pixels.
    pub width: Option<u32>,
    /// Output height in pixels.
    pub height: Option<u32>,
}

impl TargetSize {
    /// Exact output dimensions.
    #[must_use]
    pub const fn exact(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }
}

/// Converts avatar images to PNG on the blocking thread pool.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    default_size: u32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SIZE)
    }
}

impl ImageNormalizer {
    /// Creates a normalizer rendering dimensionless SVGs at `default_size`.
    #[must_use]
    pub fn new(default_size: u32) -> Self {
        Self {
            default_size: default_size.max(1),
        }
    }

    /// Converts an avatar to PNG.
    ///
    /// # Errors
    /// Returns error if the image cannot be decoded, rendered or encoded.
    pub async fn to_png(&self, image: &AvatarImage, target: TargetSize) -> Result<Bytes, ConvertError> {
        let bytes = image.bytes().clone();
        let is_svg = image.is_svg() || (image.mime_type().is_empty() && looks_like_svg(&bytes));
        let default_size = self.default_size;

        let result = tokio::task::spawn_blocking(move || {
            if is_svg {
                svg_to_png(&bytes, target, default_size)
            } else {
                raster_to_png(&bytes, target)
            }
        })
        .await;

        match result {
            Ok(Ok(png)) => {
                debug!(svg = is_svg, size = png.len(), "Converted avatar to PNG");
                Ok(Bytes::from(png))
            }
            Ok(Err(e)) => Err(e),
            Err(e) => {
                error!(error = %e, "Conversion task panicked");
                Err(ConvertError::Task(e.to_string()))
            }
        }
    }
}

/// Rasterizes an SVG document to PNG.
///
/// # Errors
/// Returns error if the document is not valid SVG or cannot be rendered.
pub fn svg_to_png(bytes: &[u8], target: TargetSize, default_size: u32) -> Result<Vec<u8>, ConvertError> {
    let source = std::str::from_utf8(bytes).map_err(|e| ConvertError::Svg(e.to_string()))?;
    let document = roxmltree::Document::parse(source).map_err(|e| ConvertError::Svg(e.to_string()))?;
    let root = document.root_element();
    if !root.tag_name().name().eq_ignore_ascii_case("svg") {
        return Err(ConvertError::Svg(format!(
            "root element is <{}>",
            root.tag_name().name()
        )));
    }

    let view_box = root.attribute("viewBox").and_then(parse_view_box);
    let intrinsic = match (
        root.attribute("width").and_then(parse_length),
        root.attribute("height").and_then(parse_length),
    ) {
        (Some(width), Some(height)) => Some((width, height)),
        _ => None,
    };
    let aspect = view_box
        .map(|(_, _, width, height)| (width, height))
        .or(intrinsic)
        .map(|(width, height)| width / height);

    let (width, height) = svg_dimensions(target, aspect, default_size);
    let sized = resize_svg_root(source, width, height, view_box.is_none().then_some(intrinsic).flatten())?;

    let tree = usvg::Tree::from_str(&sized, &usvg::Options::default())
        .map_err(|e| ConvertError::Svg(e.to_string()))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ConvertError::Render(format!("invalid canvas {width}x{height}")))?;

    let size = tree.size();
    #[allow(clippy::cast_precision_loss)]
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let pixels: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect();

    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| ConvertError::Render("pixel buffer size mismatch".to_string()))?;

    encode_png(&DynamicImage::ImageRgba8(image))
}

/// Decodes a raster image and re-encodes it as PNG.
///
/// # Errors
/// Returns error if the image cannot be decoded or encoded.
pub fn raster_to_png(bytes: &[u8], target: TargetSize) -> Result<Vec<u8>, ConvertError> {
    let image = image::load_from_memory(bytes).map_err(|e| ConvertError::Decode(e.to_string()))?;

    let resized = match (target.width, target.height) {
        (Some(width), Some(height)) => image.resize_exact(width.max(1), height.max(1), FilterType::Lanczos3),
        (Some(width), None) => {
            let height = scaled(image.height(), width, image.width());
            image.resize_exact(width.max(1), height, FilterType::Lanczos3)
        }
        (None, Some(height)) => {
            let width = scaled(image.width(), height, image.height());
            image.resize_exact(width, height.max(1), FilterType::Lanczos3)
        }
        (None, None) => image,
    };

    encode_png(&resized)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ConvertError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// `value * numerator / denominator`, at least 1.
fn scaled(value: u32, numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return numerator.max(1);
    }
    let result = u64::from(value) * u64::from(numerator) / u64::from(denominator);
    u32::try_from(result).unwrap_or(u32::MAX).max(1)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn svg_dimensions(target: TargetSize, aspect: Option<f32>, default_size: u32) -> (u32, u32) {
    let round = |value: f32| (value.round() as u32).max(1);
    match (target.width, target.height, aspect) {
        (Some(width), Some(height), _) => (width.max(1), height.max(1)),
        (Some(width), None, Some(aspect)) => (width.max(1), round(width as f32 / aspect)),
        (None, Some(height), Some(aspect)) => (round(height as f32 * aspect), height.max(1)),
        (Some(side), None, None) | (None, Some(side), None) => (side.max(1), side.max(1)),
        (None, None, Some(aspect)) if aspect >= 1.0 => {
            (default_size, round(default_size as f32 / aspect))
        }
        (None, None, Some(aspect)) => (round(default_size as f32 * aspect), default_size),
        (None, None, None) => (default_size, default_size),
    }
}

fn parse_view_box(value: &str) -> Option<(f32, f32, f32, f32)> {
    let numbers: Vec<f32> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match numbers[..] {
        [x, y, width, height] if width > 0.0 && height > 0.0 => Some((x, y, width, height)),
        _ => None,
    }
}

/// Numeric part of a length such as `32`, `32px` or `32.5`; percentages are ignored.
fn parse_length(value: &str) -> Option<f32> {
    let value = value.trim();
    if value.ends_with('%') {
        return None;
    }
    let number = value.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    number.parse::<f32>().ok().filter(|n| *n > 0.0)
}

/// Rewrites the root `<svg>` tag with the given pixel size.
///
/// Without a `viewBox`, the original intrinsic size becomes the `viewBox` so
/// the drawing scales with the canvas.
fn resize_svg_root(
    source: &str,
    width: u32,
    height: u32,
    intrinsic: Option<(f32, f32)>,
) -> Result<String, ConvertError> {
    let tag = SVG_START_TAG
        .find(source)
        .ok_or_else(|| ConvertError::Svg("missing <svg> start tag".to_string()))?;

    let stripped = SIZE_ATTRIBUTE.replace_all(tag.as_str(), "");
    let attributes = stripped
        .get(4..)
        .ok_or_else(|| ConvertError::Svg("malformed <svg> start tag".to_string()))?;
    let view_box = intrinsic
        .map(|(w, h)| format!(r#" viewBox="0 0 {w} {h}""#))
        .unwrap_or_default();
    let new_tag = format!(r#"<svg width="{width}" height="{height}"{view_box}{attributes}"#);

    Ok(format!(
        "{}{new_tag}{}",
        &source[..tag.start()],
        &source[tag.end()..]
    ))
}
