//! Colored-initials fallback for correspondents without an avatar.

use std::fmt;

use serde::Serialize;

use super::Identity;

type InitialsRule = fn(&Identity) -> Option<String>;

/// Extraction rules, tried in order until one yields a letter.
const RULES: &[InitialsRule] = &[display_name_words, local_part_segments, single_letter];

pub(super) fn extract_initials(identity: &Identity) -> String {
    RULES
        .iter()
        .find_map(|rule| rule(identity))
        .map_or_else(|| "?".to_string(), |initials| initials.to_uppercase())
}

fn first_letter(text: &str) -> Option<char> {
    text.chars().find(|c| c.is_alphabetic())
}

fn display_name_words(identity: &Identity) -> Option<String> {
    if !identity.has_display_name() {
        return None;
    }
    let name = identity.display_name()?;
    let initials: String = name
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .filter_map(|word| word.chars().next())
        .take(2)
        .collect();
    (!initials.is_empty()).then_some(initials)
}

fn local_part_segments(identity: &Identity) -> Option<String> {
    let email = if identity.email().is_empty() {
        identity.author()
    } else {
        identity.email()
    };
    let (local, _) = email.split_once('@')?;
    let initials: String = local.split('.').filter_map(first_letter).take(2).collect();
    (!initials.is_empty()).then_some(initials)
}

fn single_letter(identity: &Identity) -> Option<String> {
    let letter = if identity.has_display_name() {
        first_letter(identity.author())
    } else if identity.is_public() {
        identity.author().chars().next()
    } else if !identity.domain().is_empty() {
        identity.domain().chars().next()
    } else {
        // ghost mail without a domain
        identity.author().trim().chars().next()
    };
    letter.map(String::from)
}

/// An OKLCH color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Oklch {
    /// Perceptual lightness, 0..1.
    pub lightness: f64,
    /// Chroma.
    pub chroma: f64,
    /// Hue angle in degrees.
    pub hue: f64,
}

impl fmt::Display for Oklch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "oklch({:.2} {:.3} {:.2})",
            self.lightness, self.chroma, self.hue
        )
    }
}

/// Pastel color pair (light and dark scheme) sharing one hue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvatarColor {
    /// Color for light color schemes.
    pub light: Oklch,
    /// Color for dark color schemes.
    pub dark: Oklch,
}

impl AvatarColor {
    /// Derives the color deterministically from an identifier.
    #[must_use]
    pub fn from_identifier(identifier: &str) -> Self {
        let hash = identifier
            .encode_utf16()
            .fold(0i32, |hash, unit| {
                hash.wrapping_shl(5)
                    .wrapping_sub(hash)
                    .wrapping_add(i32::from(unit))
            });
        let magnitude = i64::from(hash).unsigned_abs();

        #[allow(clippy::cast_precision_loss)]
        let hue = (magnitude % 36_000) as f64 / 100.0;
        #[allow(clippy::cast_precision_loss)]
        let step = (magnitude % 10) as f64 / 100.0;
        #[allow(clippy::cast_precision_loss)]
        let chroma = 0.050 + (magnitude % 5) as f64 / 1000.0;

        Self {
            light: Oklch {
                lightness: 0.80 + step,
                chroma,
                hue,
            },
            dark: Oklch {
                lightness: 0.40 + step,
                chroma,
                hue,
            },
        }
    }

    /// CSS `light-dark()` expression.
    #[must_use]
    pub fn css(&self) -> String {
        format!("light-dark({}, {})", self.light, self.dark)
    }
}

impl fmt::Display for AvatarColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.css())
    }
}

/// Initials text with its color.
#[derive(Debug, Clone, PartialEq)]
pub struct Initials {
    text: String,
    color: AvatarColor,
}

impl Initials {
    /// Creates initials.
    #[must_use]
    pub fn new(text: impl Into<String>, color: AvatarColor) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }

    /// The one or two letters.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The color pair.
    #[must_use]
    pub const fn color(&self) -> AvatarColor {
        self.color
    }
}
