use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};

/// A frame as delivered by the camera, before decoding.
#[derive(Debug, Clone)]
pub enum RawFrame {
    /// YUV 4:2:0 semi-planar: full Y plane followed by interleaved V/U samples.
    Nv21 {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// A compressed still in any format the `image` crate can sniff.
    Encoded(Vec<u8>),
    /// Pixels that are already decoded.
    Rgb(RgbImage),
}

/// Borrows the frame so a pending slot can keep sharing it while it decodes.
pub fn decode_frame(raw: &RawFrame) -> Result<RgbImage> {
    match raw {
        RawFrame::Nv21 {
            width,
            height,
            data,
        } => nv21_to_rgb(*width, *height, data),
        RawFrame::Encoded(bytes) => {
            let img = image::load_from_memory(bytes).context("failed to decode frame bytes")?;
            let rgb = img.to_rgb8();
            if rgb.width() == 0 || rgb.height() == 0 {
                bail!("decoded frame is empty");
            }
            Ok(rgb)
        }
        RawFrame::Rgb(img) => {
            if img.width() == 0 || img.height() == 0 {
                bail!("frame is empty");
            }
            Ok(img.clone())
        }
    }
}

fn nv21_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        bail!("invalid NV21 dimensions {width}x{height}");
    }

    let w = width as usize;
    let h = height as usize;
    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(2);
    let y_len = w * h;
    let expected = y_len + 2 * chroma_w * chroma_h;
    if data.len() < expected {
        bail!(
            "NV21 buffer too short for {width}x{height}: {} bytes, expected {expected}",
            data.len()
        );
    }

    let (y_plane, vu_plane) = data.split_at(y_len);
    let mut out = RgbImage::new(width, height);

    for row in 0..h {
        let vu_row = (row / 2) * chroma_w * 2;
        for col in 0..w {
            let y = y_plane[row * w + col] as f32;
            let vu_idx = vu_row + (col / 2) * 2;
            let v = vu_plane[vu_idx] as f32 - 128.0;
            let u = vu_plane[vu_idx + 1] as f32 - 128.0;

            // BT.601 full range
            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;

            out.put_pixel(col as u32, row as u32, Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)]));
        }
    }

    Ok(out)
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
