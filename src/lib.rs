//! gif-overlay draws rotated text onto every frame of an animated GIF.
//!
//! # Pipeline overview
//!
//! 1. **Extract**: `GIF bytes -> Vec<Frame>`, each frame a full standalone RGBA raster with its
//!    own display delay ([`decode_gif_bytes`], [`extract_frames`])
//! 2. **Render**: `Frame + OverlaySpec -> RenderedFrame` through an [`OverlayBackend`]; the CPU
//!    backend shapes text with Parley and rasterizes with `vello_cpu`
//! 3. **Encode**: `RenderedFrame`s -> looping GIF bytes, per-frame delays preserved
//!    ([`GifSequenceEncoder`])
//!
//! [`overlay_gif`] and [`overlay_gif_file`] run all three stages. The [`server`] module exposes
//! them over HTTP as `POST /overlay`.
#![forbid(unsafe_code)]

mod decode;
mod encode_gif;
mod foundation;
mod model;
mod pipeline;
mod render;
mod text;

pub mod server;

pub use decode::{decode_gif_bytes, extract_frames};
pub use encode_gif::{DEFAULT_QUANTIZE_SPEED, EncodeConfig, GifSequenceEncoder, encode_frames};
pub use foundation::color::parse_css_color;
pub use foundation::core::{Affine, Rgba8, Vec2, placement_affine};
pub use foundation::error::{OverlayError, OverlayResult};
pub use model::{
    DEFAULT_ANGLE_DEG, DEFAULT_COLOR, DEFAULT_FONT_SIZE_PX, DEFAULT_X, DEFAULT_Y,
    DELAY_MS_PER_UNIT, Frame, OutputImage, OverlayParams, OverlaySpec, RenderedFrame,
};
pub use pipeline::{overlay_frames, overlay_gif, overlay_gif_file, write_output};
pub use render::{BackendKind, OverlayBackend, create_backend, cpu::CpuBackend};
pub use text::{
    DEFAULT_FONT_FAMILY, FontBook, FontSettings, PreparedText, ResolvedFont, TextLayoutEngine,
};
