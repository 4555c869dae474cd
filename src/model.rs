use crate::foundation::{
    color::parse_css_color,
    core::Rgba8,
    error::{OverlayError, OverlayResult},
};

/// Fixed conversion between GIF-native delay units (hundredths of a second) and milliseconds.
pub const DELAY_MS_PER_UNIT: u32 = 10;

pub const DEFAULT_FONT_SIZE_PX: f32 = 32.0;
pub const DEFAULT_X: f64 = 100.0;
pub const DEFAULT_Y: f64 = 100.0;
pub const DEFAULT_ANGLE_DEG: f64 = 0.0;
pub const DEFAULT_COLOR: &str = "#000000";

/// One decoded, fully composited frame of a source animation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Position in the playback sequence.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Display delay in hundredths of a second.
    pub delay_cs: u16,
    /// Straight RGBA8, row-major, tightly packed.
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn delay_ms(&self) -> u32 {
        u32::from(self.delay_cs) * DELAY_MS_PER_UNIT
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// A frame after the overlay has been drawn on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFrame {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub delay_cs: u16,
    /// Straight RGBA8, row-major, tightly packed.
    pub rgba: Vec<u8>,
}

impl RenderedFrame {
    pub fn delay_ms(&self) -> u32 {
        u32::from(self.delay_cs) * DELAY_MS_PER_UNIT
    }
}

/// Finished animated GIF.
#[derive(Clone, Debug)]
pub struct OutputImage {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub bytes: Vec<u8>,
}

/// Text overlay parameters, applied identically to every frame of one request.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlaySpec {
    pub text: String,
    pub font_size_px: f32,
    pub x: f64,
    pub y: f64,
    /// Degrees, positive is clockwise.
    pub angle_deg: f64,
    pub color: Rgba8,
}

impl OverlaySpec {
    /// Spec with every optional parameter at its default.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size_px: DEFAULT_FONT_SIZE_PX,
            x: DEFAULT_X,
            y: DEFAULT_Y,
            angle_deg: DEFAULT_ANGLE_DEG,
            color: Rgba8::BLACK,
        }
    }

    pub fn with_font_size(mut self, font_size_px: f32) -> Self {
        self.font_size_px = font_size_px;
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_angle(mut self, angle_deg: f64) -> Self {
        self.angle_deg = angle_deg;
        self
    }

    pub fn with_color(mut self, color: Rgba8) -> Self {
        self.color = color;
        self
    }

    pub fn validate(&self) -> OverlayResult<()> {
        if self.text.is_empty() {
            return Err(OverlayError::validation("overlay text must be non-empty"));
        }
        if !self.font_size_px.is_finite() || self.font_size_px <= 0.0 {
            return Err(OverlayError::validation(
                "overlay font size must be finite and > 0",
            ));
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(OverlayError::validation("overlay position must be finite"));
        }
        if !self.angle_deg.is_finite() {
            return Err(OverlayError::validation("overlay angle must be finite"));
        }
        Ok(())
    }

    /// Build a spec from loosely typed string parameters (form fields, CLI flags).
    ///
    /// Missing or empty text is an error. Every other field falls back to its documented default
    /// when absent, unparseable or non-finite (`fontSize` also when not positive), with a warning.
    /// An unparseable color falls back to black.
    pub fn from_params(params: &OverlayParams<'_>) -> OverlayResult<Self> {
        let text = match params.text {
            Some(t) if !t.is_empty() => t,
            _ => return Err(OverlayError::validation("overlay text is required")),
        };

        let font_size_px = lenient_number("fontSize", params.font_size, DEFAULT_FONT_SIZE_PX, |v| {
            v > 0.0
        });
        let x = lenient_number("x", params.x, DEFAULT_X, |_| true);
        let y = lenient_number("y", params.y, DEFAULT_Y, |_| true);
        let angle_deg = lenient_number("angle", params.angle, DEFAULT_ANGLE_DEG, |_| true);

        let color = match params.color.map(str::trim).filter(|c| !c.is_empty()) {
            None => Rgba8::BLACK,
            Some(raw) => parse_css_color(raw).unwrap_or_else(|err| {
                tracing::warn!(color = raw, %err, "ignoring unusable color");
                Rgba8::BLACK
            }),
        };

        let spec = Self {
            text: text.replace(['\r', '\n'], " "),
            font_size_px,
            x,
            y,
            angle_deg,
            color,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Raw overlay parameters as received from a form or the command line.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayParams<'a> {
    pub text: Option<&'a str>,
    pub font_size: Option<&'a str>,
    pub x: Option<&'a str>,
    pub y: Option<&'a str>,
    pub angle: Option<&'a str>,
    pub color: Option<&'a str>,
}

fn lenient_number<T>(field: &str, raw: Option<&str>, default: T, accept: impl Fn(T) -> bool) -> T
where
    T: std::str::FromStr + Copy + Into<f64>,
{
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(v) if v.into().is_finite() && accept(v) => v,
        _ => {
            tracing::warn!(field, value = raw, "ignoring unusable numeric parameter");
            default
        }
    }
}
