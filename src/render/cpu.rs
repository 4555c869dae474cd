use std::{collections::HashMap, sync::Arc};

use crate::{
    foundation::{
        core::{Rgba8, placement_affine, premultiply_rgba8_in_place, unpremultiply_rgba8_in_place},
        error::{OverlayError, OverlayResult},
    },
    model::{Frame, OverlaySpec, RenderedFrame},
    render::OverlayBackend,
    text::{PreparedText, ResolvedFont, TextLayoutEngine},
};

/// CPU overlay renderer built on `vello_cpu`, with text shaped by Parley.
pub struct CpuBackend {
    font: Arc<ResolvedFont>,
    /// Glyph sources keyed by face index inside the font bytes.
    faces: HashMap<u32, vello_cpu::peniko::FontData>,
    engine: TextLayoutEngine,
    text_cache: Option<(TextKey, PreparedText)>,
    ctx: Option<vello_cpu::RenderContext>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TextKey {
    text: String,
    size_bits: u32,
    color: Rgba8,
}

impl TextKey {
    fn for_spec(spec: &OverlaySpec) -> Self {
        Self {
            text: spec.text.clone(),
            size_bits: spec.font_size_px.to_bits(),
            color: spec.color,
        }
    }
}

impl CpuBackend {
    pub fn new(font: Arc<ResolvedFont>) -> Self {
        Self {
            font,
            faces: HashMap::new(),
            engine: TextLayoutEngine::new(),
            text_cache: None,
            ctx: None,
        }
    }

    /// Face the shaper picked for a run; glyph ids are only valid against that face.
    fn face(&mut self, index: u32) -> vello_cpu::peniko::FontData {
        let bytes = &self.font.bytes;
        self.faces
            .entry(index)
            .or_insert_with(|| {
                vello_cpu::peniko::FontData::new(
                    vello_cpu::peniko::Blob::from(bytes.as_ref().clone()),
                    index,
                )
            })
            .clone()
    }

    fn text_for(&mut self, spec: &OverlaySpec) -> OverlayResult<PreparedText> {
        let key = TextKey::for_spec(spec);
        if let Some((cached_key, prepared)) = &self.text_cache
            && *cached_key == key
        {
            return Ok(prepared.clone());
        }

        let prepared = self.engine.layout_line(
            &spec.text,
            self.font.bytes.as_slice(),
            self.font.index,
            spec.font_size_px,
            spec.color,
        )?;
        tracing::debug!(
            family = self.engine.family_name().unwrap_or("unknown"),
            width = prepared.width,
            height = prepared.height,
            "shaped overlay text"
        );
        self.text_cache = Some((key, prepared.clone()));
        Ok(prepared)
    }

    fn with_ctx_mut<R>(
        &mut self,
        width: u16,
        height: u16,
        f: impl FnOnce(&mut Self, &mut vello_cpu::RenderContext) -> OverlayResult<R>,
    ) -> OverlayResult<R> {
        let mut ctx = match self.ctx.take() {
            None => vello_cpu::RenderContext::new(width, height),
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            Some(_) => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        let out = f(self, &mut ctx)?;
        self.ctx = Some(ctx);
        Ok(out)
    }
}

impl OverlayBackend for CpuBackend {
    fn render_overlay(
        &mut self,
        frame: &Frame,
        spec: &OverlaySpec,
    ) -> OverlayResult<RenderedFrame> {
        let (w, h) = surface_size(frame.width, frame.height)?;
        let base = pixmap_from_straight_rgba8(&frame.rgba, frame.width, frame.height)?;
        let text = self.text_for(spec)?;
        let placement = placement_affine(spec.x, spec.y, spec.angle_deg, text.center());

        let mut out = vello_cpu::Pixmap::new(w, h);
        self.with_ctx_mut(w, h, |backend, ctx| {
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

            // Base layer: the source frame, covering the whole surface.
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::Image {
                image: vello_cpu::ImageSource::Pixmap(Arc::new(base)),
                sampler: vello_cpu::peniko::ImageSampler::default(),
            });
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(w),
                f64::from(h),
            ));

            // Overlay: the transform only lives for this draw.
            ctx.set_transform(affine_to_cpu(placement));
            for line in text.layout.lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let brush = run.style().brush;
                    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        brush.r, brush.g, brush.b, brush.a,
                    ));
                    let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    let face = backend.face(run.run().font().index);
                    ctx.glyph_run(&face)
                        .font_size(run.run().font_size())
                        .fill_glyphs(glyphs);
                }
            }

            ctx.flush();
            ctx.render_to_pixmap(&mut out);
            Ok(())
        })?;

        let mut rgba = out.data_as_u8_slice().to_vec();
        unpremultiply_rgba8_in_place(&mut rgba);

        tracing::debug!(index = frame.index, "rendered overlay");
        Ok(RenderedFrame {
            index: frame.index,
            width: frame.width,
            height: frame.height,
            delay_cs: frame.delay_cs,
            rgba,
        })
    }
}

fn surface_size(width: u32, height: u32) -> OverlayResult<(u16, u16)> {
    if width == 0 || height == 0 {
        return Err(OverlayError::render("frame width/height must be non-zero"));
    }
    let w: u16 = width
        .try_into()
        .map_err(|_| OverlayError::render("frame width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| OverlayError::render("frame height exceeds u16"))?;
    Ok((w, h))
}

fn affine_to_cpu(a: crate::foundation::core::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn pixmap_from_straight_rgba8(
    rgba8: &[u8],
    width: u32,
    height: u32,
) -> OverlayResult<vello_cpu::Pixmap> {
    let (w, h) = surface_size(width, height)?;
    if rgba8.len() != width as usize * height as usize * 4 {
        return Err(OverlayError::render(format!(
            "frame buffer is {} bytes, expected {} for {width}x{height}",
            rgba8.len(),
            width as usize * height as usize * 4
        )));
    }

    let mut premul = rgba8.to_vec();
    premultiply_rgba8_in_place(&mut premul);

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
