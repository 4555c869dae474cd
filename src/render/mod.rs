pub mod cpu;

use std::sync::Arc;

use crate::{
    foundation::error::OverlayResult,
    model::{Frame, OverlaySpec, RenderedFrame},
    text::ResolvedFont,
};

/// Draws an overlay onto decoded frames.
///
/// Implementations may cache per-spec state (shaped text, scratch surfaces) between calls, but the
/// output of each call depends only on the frame and the spec passed in.
pub trait OverlayBackend {
    fn render_overlay(
        &mut self,
        frame: &Frame,
        spec: &OverlaySpec,
    ) -> OverlayResult<RenderedFrame>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Cpu,
}

pub fn create_backend(
    kind: BackendKind,
    font: Arc<ResolvedFont>,
) -> OverlayResult<Box<dyn OverlayBackend>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(cpu::CpuBackend::new(font))),
    }
}
