use image::{Rgba, Rgba32FImage, imageops};

use crate::buffer::PixelBuffer;
use crate::error::{ReelError, ReelResult};

/// Resample to the target geometry with a Lanczos3 filter. Returns the input
/// unchanged when the geometry already matches.
pub fn resample(buffer: PixelBuffer, width: u32, height: u32) -> ReelResult<PixelBuffer> {
    if width == 0 || height == 0 {
        return Err(ReelError::config("resample target must be non-zero"));
    }
    if buffer.width == width && buffer.height == height {
        return Ok(buffer);
    }

    let channels = buffer.channels;
    let rgba = to_rgba_image(&buffer)?;
    let resized = imageops::resize(&rgba, width, height, imageops::FilterType::Lanczos3);
    Ok(from_rgba_image(resized, channels))
}

fn to_rgba_image(buffer: &PixelBuffer) -> ReelResult<Rgba32FImage> {
    let c = buffer.channels as usize;
    let mut img = Rgba32FImage::new(buffer.width, buffer.height);
    for (px, src) in img.pixels_mut().zip(buffer.data.chunks_exact(c)) {
        let mut v = [0.0f32, 0.0, 0.0, 1.0];
        match c {
            1 => {
                v[0] = src[0];
                v[1] = src[0];
                v[2] = src[0];
            }
            2 => {
                v[0] = src[0];
                v[1] = src[1];
            }
            _ => {
                v[..c].copy_from_slice(src);
            }
        }
        *px = Rgba(v);
    }
    Ok(img)
}

fn from_rgba_image(img: Rgba32FImage, channels: u32) -> PixelBuffer {
    let (width, height) = (img.width(), img.height());
    let c = channels as usize;
    let mut data = Vec::with_capacity((width * height) as usize * c);
    for px in img.pixels() {
        data.extend_from_slice(&px.0[..c]);
    }
    PixelBuffer {
        width,
        height,
        channels,
        data,
    }
}
