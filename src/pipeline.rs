use std::path::Path;

use anyhow::Context as _;

use crate::{
    decode::{decode_gif_bytes, extract_frames},
    encode_gif::{EncodeConfig, GifSequenceEncoder},
    foundation::error::{OverlayError, OverlayResult},
    model::{Frame, OutputImage, OverlaySpec},
    render::OverlayBackend,
};

/// Decode `gif`, draw `spec` on every frame with `backend` and encode the result.
#[tracing::instrument(skip_all, fields(text_len = spec.text.len()))]
pub fn overlay_gif(
    gif: &[u8],
    spec: &OverlaySpec,
    backend: &mut dyn OverlayBackend,
) -> OverlayResult<OutputImage> {
    let frames = decode_gif_bytes(gif)?;
    overlay_frames(frames, spec, backend)
}

/// Same as [`overlay_gif`] for a file on disk; the result is written to `output`.
#[tracing::instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn overlay_gif_file(
    input: &Path,
    output: &Path,
    spec: &OverlaySpec,
    backend: &mut dyn OverlayBackend,
) -> OverlayResult<OutputImage> {
    let frames = extract_frames(input)?;
    let out = overlay_frames(frames, spec, backend)?;
    write_output(output, &out.bytes)?;
    Ok(out)
}

/// Render and encode already decoded frames, in order.
pub fn overlay_frames(
    frames: Vec<Frame>,
    spec: &OverlaySpec,
    backend: &mut dyn OverlayBackend,
) -> OverlayResult<OutputImage> {
    spec.validate()?;

    let Some(first) = frames.first() else {
        return Err(OverlayError::decode("gif contains no frames"));
    };
    let mut encoder = GifSequenceEncoder::new(EncodeConfig::new(first.width, first.height))?;

    for frame in &frames {
        let rendered = backend.render_overlay(frame, spec)?;
        encoder.set_delay_ms(rendered.delay_ms());
        encoder.add_frame(&rendered)?;
    }

    let out = encoder.finish()?;
    tracing::info!(
        frames = out.frame_count,
        width = out.width,
        height = out.height,
        bytes = out.bytes.len(),
        "encoded overlay gif"
    );
    Ok(out)
}

pub fn write_output(path: &Path, bytes: &[u8]) -> OverlayResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write gif '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RenderedFrame;

    /// Copies frames through untouched and records what it saw.
    #[derive(Default)]
    struct PassThrough {
        seen: Vec<(usize, String)>,
    }

    impl OverlayBackend for PassThrough {
        fn render_overlay(
            &mut self,
            frame: &Frame,
            spec: &OverlaySpec,
        ) -> OverlayResult<RenderedFrame> {
            self.seen.push((frame.index, spec.text.clone()));
            Ok(RenderedFrame {
                index: frame.index,
                width: frame.width,
                height: frame.height,
                delay_cs: frame.delay_cs,
                rgba: frame.rgba.clone(),
            })
        }
    }

    struct Failing;

    impl OverlayBackend for Failing {
        fn render_overlay(&mut self, _: &Frame, _: &OverlaySpec) -> OverlayResult<RenderedFrame> {
            Err(OverlayError::render("boom"))
        }
    }

    fn sample_gif(delays: &[u16]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = gif::Encoder::new(&mut out, 5, 4, &[]).unwrap();
            enc.set_repeat(gif::Repeat::Infinite).unwrap();
            for (i, delay) in delays.iter().enumerate() {
                let shade = (i as u8).wrapping_mul(40);
                let mut px = [shade, 255 - shade, 0, 255].repeat(20);
                let mut f = gif::Frame::from_rgba_speed(5, 4, &mut px, 10);
                f.delay = *delay;
                enc.write_frame(&f).unwrap();
            }
        }
        out
    }

    #[test]
    fn every_frame_is_rendered_once_in_order() {
        let mut backend = PassThrough::default();
        let spec = OverlaySpec::new("hello");
        let out = overlay_gif(&sample_gif(&[3, 6, 9, 12]), &spec, &mut backend).unwrap();

        assert_eq!(out.frame_count, 4);
        assert_eq!(
            backend.seen,
            (0..4).map(|i| (i, "hello".to_string())).collect::<Vec<_>>()
        );

        let frames = decode_gif_bytes(&out.bytes).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames.iter().map(|f| f.delay_cs).collect::<Vec<_>>(),
            vec![3, 6, 9, 12]
        );
        assert!(frames.iter().all(|f| (f.width, f.height) == (5, 4)));
    }

    #[test]
    fn uniform_delays_survive_the_round_trip() {
        let mut backend = PassThrough::default();
        let out = overlay_gif(&sample_gif(&[8; 5]), &OverlaySpec::new("x"), &mut backend).unwrap();
        let frames = decode_gif_bytes(&out.bytes).unwrap();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.delay_ms() == 80));
    }

    /// Two 2x1 frames: opaque red, then a cleared pixel next to green.
    fn transparent_source_gif() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = gif::Encoder::new(&mut out, 2, 1, &[]).unwrap();
            enc.set_repeat(gif::Repeat::Infinite).unwrap();

            let mut px = [255u8, 0, 0, 255, 255, 0, 0, 255];
            let mut first = gif::Frame::from_rgba_speed(2, 1, &mut px, 10);
            first.dispose = gif::DisposalMethod::Background;
            first.delay = 7;
            enc.write_frame(&first).unwrap();

            let mut px = [0u8, 0, 0, 0, 0, 255, 0, 255];
            let mut second = gif::Frame::from_rgba_speed(2, 1, &mut px, 10);
            second.dispose = gif::DisposalMethod::Background;
            second.delay = 9;
            enc.write_frame(&second).unwrap();
        }
        out
    }

    fn same_visible_pixels(a: &[u8], b: &[u8]) -> bool {
        a.len() == b.len()
            && a
                .chunks_exact(4)
                .zip(b.chunks_exact(4))
                .all(|(p, q)| (p[3] == 0 && q[3] == 0) || p == q)
    }

    #[test]
    fn transparent_sources_round_trip_frame_by_frame() {
        let source = transparent_source_gif();
        let input = decode_gif_bytes(&source).unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[1].rgba[3], 0);

        let mut backend = PassThrough::default();
        let out = overlay_gif(&source, &OverlaySpec::new("x"), &mut backend).unwrap();
        let output = decode_gif_bytes(&out.bytes).unwrap();

        assert_eq!(output.len(), input.len());
        for (got, want) in output.iter().zip(&input) {
            assert_eq!(got.delay_cs, want.delay_cs);
            assert!(
                same_visible_pixels(&got.rgba, &want.rgba),
                "frame {}: got {:?}, want {:?}",
                want.index,
                got.rgba,
                want.rgba
            );
        }
    }

    #[test]
    fn first_failure_aborts_without_output() {
        let err = overlay_gif(&sample_gif(&[1, 1]), &OverlaySpec::new("x"), &mut Failing)
            .unwrap_err();
        assert!(matches!(err, OverlayError::Render(_)));
    }

    #[test]
    fn invalid_input_is_a_decode_error() {
        let mut backend = PassThrough::default();
        let err = overlay_gif(b"GIF89a-but-broken", &OverlaySpec::new("x"), &mut backend)
            .unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
        assert!(backend.seen.is_empty());
    }

    #[test]
    fn file_variant_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.gif");
        let output = dir.path().join("nested/out.gif");
        std::fs::write(&input, sample_gif(&[4, 4])).unwrap();

        let mut backend = PassThrough::default();
        let out = overlay_gif_file(&input, &output, &OverlaySpec::new("x"), &mut backend).unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written, out.bytes);
        assert_eq!(extract_frames(&output).unwrap().len(), 2);
    }
}
