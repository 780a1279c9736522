//! Resolution specifier parsing.
//!
//! Accepted forms, checked in order (case-insensitive, trimmed):
//! 1. presets such as `720p`, `4k` or `portrait`
//! 2. `WIDTHxHEIGHT` or `WIDTH:HEIGHT`
//! 3. a bare height, with the width derived from the source aspect ratio

use crate::error::{MediaError, MediaResult};

pub const MIN_DIMENSION: u32 = 2;
pub const MAX_WIDTH: u32 = 7680;
pub const MAX_HEIGHT: u32 = 4320;

const PRESETS: &[(&str, u32, u32)] = &[
    ("240p", 426, 240),
    ("360p", 640, 360),
    ("480p", 854, 480),
    ("720p", 1280, 720),
    ("1080p", 1920, 1080),
    ("1440p", 2560, 1440),
    ("2160p", 3840, 2160),
    ("4k", 3840, 2160),
    ("9:16", 1080, 1920),
    ("9x16", 1080, 1920),
    ("portrait", 1080, 1920),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// FFmpeg `scale` filter for these dimensions.
    pub fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.width, self.height)
    }
}

/// A parsed resolution plus the label reported back to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResolution {
    pub dimensions: Dimensions,
    /// The specifier as given by the caller
    pub label: String,
}

/// Whether resolving `spec` needs the source's dimensions.
pub fn needs_source_dimensions(spec: &str) -> bool {
    let spec = spec.trim();
    !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit())
}

/// Resolve an optional specifier. `None` means keep the source resolution.
pub fn resolve_resolution(
    spec: Option<&str>,
    source: Option<(u32, u32)>,
) -> MediaResult<Option<ResolvedResolution>> {
    let Some(raw) = spec.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let lower = raw.to_ascii_lowercase();
    let invalid = || MediaError::InvalidResolution(raw.to_string());

    let dimensions = if let Some(&(_, w, h)) = PRESETS.iter().find(|(name, _, _)| *name == lower) {
        Dimensions::new(w, h)
    } else if let Some((w, h)) = lower.split_once('x').or_else(|| lower.split_once(':')) {
        Dimensions::new(parse_digits(w).ok_or_else(invalid)?, parse_digits(h).ok_or_else(invalid)?)
    } else if needs_source_dimensions(&lower) {
        let height = parse_digits(&lower).ok_or_else(invalid)?;
        let (src_w, src_h) = source
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| MediaError::ResolutionRequiresProbe(raw.to_string()))?;
        Dimensions::new(even_width(height, src_w, src_h), height)
    } else {
        return Err(invalid());
    };

    if !(MIN_DIMENSION..=MAX_WIDTH).contains(&dimensions.width)
        || !(MIN_DIMENSION..=MAX_HEIGHT).contains(&dimensions.height)
    {
        return Err(invalid());
    }

    Ok(Some(ResolvedResolution {
        dimensions,
        label: raw.to_string(),
    }))
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Aspect-preserving width for `height`, rounded to the nearest even number.
fn even_width(height: u32, src_w: u32, src_h: u32) -> u32 {
    let exact = f64::from(height) * f64::from(src_w) / f64::from(src_h);
    let even = (exact / 2.0).round() * 2.0;
    if even > f64::from(u32::MAX) {
        u32::MAX
    } else {
        even as u32
    }
}
