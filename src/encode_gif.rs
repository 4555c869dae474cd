use crate::{
    foundation::error::{OverlayError, OverlayResult},
    model::{DELAY_MS_PER_UNIT, OutputImage, RenderedFrame},
};

/// Quantizer speed on the encoder's 1 (best) ..= 30 (fastest) scale.
pub const DEFAULT_QUANTIZE_SPEED: i32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub quantize_speed: i32,
}

impl EncodeConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            quantize_speed: DEFAULT_QUANTIZE_SPEED,
        }
    }

    pub fn validate(&self) -> OverlayResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OverlayError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(OverlayError::validation(
                "encode width/height must fit in 16 bits (gif limit)",
            ));
        }
        if !(1..=30).contains(&self.quantize_speed) {
            return Err(OverlayError::validation(
                "encode quantize speed must be in 1..=30",
            ));
        }
        Ok(())
    }
}

/// Accumulates rendered frames into a looping animated GIF held in memory.
///
/// Usage mirrors a classic GIF encoder: set the delay, add the frame, repeat, then `finish`.
pub struct GifSequenceEncoder {
    cfg: EncodeConfig,
    encoder: gif::Encoder<Vec<u8>>,
    delay_ms: u32,
    frames: usize,
}

impl GifSequenceEncoder {
    pub fn new(cfg: EncodeConfig) -> OverlayResult<Self> {
        cfg.validate()?;

        let mut encoder = gif::Encoder::new(Vec::new(), cfg.width as u16, cfg.height as u16, &[])
            .map_err(|e| OverlayError::encode(format!("failed to start gif stream: {e}")))?;
        encoder
            .set_repeat(gif::Repeat::Infinite)
            .map_err(|e| OverlayError::encode(format!("failed to set gif repeat: {e}")))?;

        Ok(Self {
            cfg,
            encoder,
            delay_ms: 0,
            frames: 0,
        })
    }

    /// Delay applied to the next frame added.
    pub fn set_delay_ms(&mut self, delay_ms: u32) {
        self.delay_ms = delay_ms;
    }

    pub fn add_frame(&mut self, frame: &RenderedFrame) -> OverlayResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(OverlayError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }

        let expected = self.cfg.width as usize * self.cfg.height as usize * 4;
        if frame.rgba.len() != expected {
            return Err(OverlayError::encode(
                "frame.rgba size mismatch with width*height*4",
            ));
        }

        let mut pixels = frame.rgba.clone();
        let mut gif_frame = gif::Frame::from_rgba_speed(
            self.cfg.width as u16,
            self.cfg.height as u16,
            &mut pixels,
            self.cfg.quantize_speed,
        );
        gif_frame.delay = ms_to_units(self.delay_ms);
        // Every frame is a full raster: clear before the next one so transparent pixels never
        // reveal the previous frame.
        gif_frame.dispose = gif::DisposalMethod::Background;

        self.encoder
            .write_frame(&gif_frame)
            .map_err(|e| OverlayError::encode(format!("failed to write frame {}: {e}", frame.index)))?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(self) -> OverlayResult<OutputImage> {
        let bytes = self
            .encoder
            .into_inner()
            .map_err(|e| OverlayError::encode(format!("failed to finalize gif stream: {e}")))?;

        if bytes.is_empty() {
            return Err(OverlayError::encode("encoder produced no output"));
        }

        Ok(OutputImage {
            width: self.cfg.width,
            height: self.cfg.height,
            frame_count: self.frames,
            bytes,
        })
    }
}

fn ms_to_units(delay_ms: u32) -> u16 {
    (delay_ms / DELAY_MS_PER_UNIT).min(u32::from(u16::MAX)) as u16
}

/// Encode `frames` in order, carrying each frame's own delay.
pub fn encode_frames(
    cfg: EncodeConfig,
    frames: impl IntoIterator<Item = RenderedFrame>,
) -> OverlayResult<OutputImage> {
    let mut encoder = GifSequenceEncoder::new(cfg)?;
    for frame in frames {
        encoder.set_delay_ms(frame.delay_ms());
        encoder.add_frame(&frame)?;
    }
    encoder.finish()
}
