use std::{io::Cursor, path::Path};

use anyhow::Context as _;
use image::AnimationDecoder as _;

use crate::{
    foundation::error::{OverlayError, OverlayResult},
    model::{DELAY_MS_PER_UNIT, Frame},
};

/// Read and decode every frame of the GIF at `path`.
pub fn extract_frames(path: &Path) -> OverlayResult<Vec<Frame>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read gif '{}'", path.display()))
        .map_err(|e| OverlayError::decode(format!("{e:#}")))?;
    decode_gif_bytes(&bytes)
}

/// Decode an in-memory GIF into standalone frames in playback order.
///
/// Frames are composited onto the logical screen with each frame's disposal method applied, so
/// every returned frame is a full raster even when the file stores only changed sub-rectangles.
#[tracing::instrument(skip_all, fields(len = bytes.len()))]
pub fn decode_gif_bytes(bytes: &[u8]) -> OverlayResult<Vec<Frame>> {
    let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| OverlayError::decode(format!("not a readable gif: {e}")))?;

    let mut frames: Vec<Frame> = Vec::new();
    for (index, decoded) in decoder.into_frames().enumerate() {
        let decoded =
            decoded.map_err(|e| OverlayError::decode(format!("decode frame {index}: {e}")))?;
        let delay_cs = delay_to_units(decoded.delay());
        let buffer = decoded.into_buffer();
        let (width, height) = buffer.dimensions();

        if let Some(first) = frames.first()
            && (first.width != width || first.height != height)
        {
            return Err(OverlayError::decode(format!(
                "frame {index} is {width}x{height}, expected {}x{}",
                first.width, first.height
            )));
        }

        tracing::debug!(index, width, height, delay_cs, "decoded frame");
        frames.push(Frame {
            index,
            width,
            height,
            delay_cs,
            rgba: buffer.into_raw(),
        });
    }

    if frames.is_empty() {
        return Err(OverlayError::decode("gif contains no frames"));
    }

    Ok(frames)
}

fn delay_to_units(delay: image::Delay) -> u16 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0;
    }
    let ms = f64::from(numer) / f64::from(denom);
    (ms / f64::from(DELAY_MS_PER_UNIT))
        .round()
        .clamp(0.0, f64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u16, height: u16, rgba: [u8; 4]) -> Vec<u8> {
        rgba.repeat(width as usize * height as usize)
    }

    fn gif_bytes(width: u16, height: u16, frames: Vec<gif::Frame<'static>>) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = gif::Encoder::new(&mut out, width, height, &[]).unwrap();
            enc.set_repeat(gif::Repeat::Infinite).unwrap();
            for f in &frames {
                enc.write_frame(f).unwrap();
            }
        }
        out
    }

    fn frame(width: u16, height: u16, rgba: [u8; 4], delay_cs: u16) -> gif::Frame<'static> {
        let mut px = solid(width, height, rgba);
        let mut f = gif::Frame::from_rgba_speed(width, height, &mut px, 10);
        f.delay = delay_cs;
        f
    }

    #[test]
    fn decodes_all_frames_in_order_with_delays() {
        let bytes = gif_bytes(
            4,
            3,
            vec![
                frame(4, 3, [255, 0, 0, 255], 5),
                frame(4, 3, [0, 255, 0, 255], 12),
                frame(4, 3, [0, 0, 255, 255], 30),
            ],
        );

        let frames = decode_gif_bytes(&bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            frames.iter().map(|f| f.delay_cs).collect::<Vec<_>>(),
            vec![5, 12, 30]
        );
        for f in &frames {
            assert_eq!((f.width, f.height), (4, 3));
            assert_eq!(f.rgba.len(), f.expected_len());
        }
        assert_eq!(&frames[1].rgba[0..4], &[0, 255, 0, 255]);
    }

    #[test]
    fn partial_frames_are_composited_into_full_rasters() {
        let base = frame(4, 4, [255, 0, 0, 255], 10);
        let mut patch = frame(2, 2, [0, 0, 255, 255], 10);
        patch.left = 2;
        patch.top = 2;
        patch.dispose = gif::DisposalMethod::Keep;

        let bytes = gif_bytes(4, 4, vec![base, patch]);
        let frames = decode_gif_bytes(&bytes).unwrap();
        assert_eq!(frames.len(), 2);

        let second = &frames[1];
        assert_eq!((second.width, second.height), (4, 4));
        // Top-left pixel still shows the first frame, bottom-right shows the patch.
        assert_eq!(&second.rgba[0..4], &[255, 0, 0, 255]);
        let last = second.rgba.len() - 4;
        assert_eq!(&second.rgba[last..], &[0, 0, 255, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_gif_bytes(b"definitely not a gif").unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = extract_frames(Path::new("does/not/exist.gif")).unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
    }

    #[test]
    fn delay_units_round_trip() {
        assert_eq!(delay_to_units(image::Delay::from_numer_denom_ms(70, 1)), 7);
        assert_eq!(delay_to_units(image::Delay::from_numer_denom_ms(0, 1)), 0);
    }
}
