//! Content-type checks for downloaded avatar payloads.

use crate::domain::entities::SVG_MIME_TYPE;
use crate::domain::errors::AvatarError;
use crate::domain::ports::HttpResponse;

/// Returns true if the payload contains SVG markup.
#[must_use]
pub fn looks_like_svg(body: &[u8]) -> bool {
    body.windows(4).any(|window| window.eq_ignore_ascii_case(b"<svg"))
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn looks_like_html(body: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&[][..], |idx| &body[idx..]);
    starts_with_ignore_case(start, b"<!doctype html") || starts_with_ignore_case(start, b"<html")
}

/// MIME type of a payload recognized by its content, SVG or raster.
#[must_use]
pub fn sniff_mime_type(body: &[u8]) -> Option<&'static str> {
    if looks_like_svg(body) {
        return Some(SVG_MIME_TYPE);
    }
    image::guess_format(body)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Decides the MIME type a downloaded payload is stored with.
///
/// A declared SVG must contain SVG markup. A declared raster type the `image`
/// crate knows must carry a recognizable raster body; other `image/*` types
/// are trusted unless the body is an HTML page. Any other declared type is
/// replaced by the sniffed type. Empty bodies are always rejected.
///
/// # Errors
/// Returns `InvalidContent` if the payload is not a usable image.
pub fn accepted_mime_type(response: &HttpResponse) -> Result<String, AvatarError> {
    let body = &response.body;
    if body.is_empty() {
        return Err(AvatarError::invalid_content("empty body"));
    }

    let declared = response.media_type().map(str::to_lowercase);
    match declared.as_deref() {
        Some(SVG_MIME_TYPE) => {
            if looks_like_svg(body) {
                Ok(SVG_MIME_TYPE.to_string())
            } else {
                Err(AvatarError::invalid_content("SVG without <svg> element"))
            }
        }
        Some(mime) if mime.starts_with("image/") => {
            if looks_like_html(body) {
                Err(AvatarError::invalid_content(format!("HTML served as {mime}")))
            } else if image::ImageFormat::from_mime_type(mime).is_some()
                && image::guess_format(body).is_err()
            {
                Err(AvatarError::invalid_content(format!("body is not {mime}")))
            } else {
                Ok(mime.to_string())
            }
        }
        declared => sniff_mime_type(body).map(str::to_string).ok_or_else(|| {
            AvatarError::invalid_content(format!(
                "unexpected content type {}",
                declared.unwrap_or("(none)")
            ))
        }),
    }
}
