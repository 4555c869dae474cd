use vello_cpu::peniko::color::{Srgb, parse_color};

use crate::foundation::{
    core::Rgba8,
    error::{OverlayError, OverlayResult},
};

/// Parse a CSS color string into straight RGBA8.
///
/// Anything CSS Color 4 accepts works: hex forms, `rgb()`/`rgba()`, `hsl()`/`hsla()` and every
/// named color. Matching is case-insensitive.
pub fn parse_css_color(s: &str) -> OverlayResult<Rgba8> {
    let s = s.trim();
    if s.is_empty() {
        return Err(OverlayError::validation("color must be non-empty"));
    }

    let parsed = parse_color(&s.to_ascii_lowercase())
        .map_err(|e| OverlayError::validation(format!("invalid color \"{s}\": {e}")))?;
    let c = parsed.to_alpha_color::<Srgb>().to_rgba8();
    Ok(Rgba8::new(c.r, c.g, c.b, c.a))
}
