use crate::error::{ReelError, ReelResult};

/// Interleaved float pixel storage, `channels` in 1..=4, row-major.
///
/// All pipeline stages operate on this type; values are linear or display
/// referred depending on where in the pipeline the buffer sits.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<f32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u32) -> ReelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::config("pixel buffer dimensions must be non-zero"));
        }
        if channels == 0 || channels > 4 {
            return Err(ReelError::config("pixel buffer channels must be in 1..=4"));
        }
        Ok(Self {
            width,
            height,
            channels,
            data: vec![0.0; (width * height * channels) as usize],
        })
    }

    pub fn filled(width: u32, height: u32, channels: u32, value: [f32; 4]) -> ReelResult<Self> {
        let mut buf = Self::new(width, height, channels)?;
        let c = channels as usize;
        for px in buf.data.chunks_exact_mut(c) {
            for (dst, src) in px.iter_mut().zip(value.iter()) {
                *dst = *src;
            }
        }
        Ok(buf)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Copy `src` into this buffer with its top-left corner at (x, y).
    /// Pixels falling outside the destination are clipped. Channel counts may
    /// differ; missing channels are left untouched, extra channels ignored.
    pub fn paste(&mut self, src: &PixelBuffer, x: u32, y: u32) {
        let dc = self.channels as usize;
        let sc = src.channels as usize;
        let copy_c = dc.min(sc);

        for sy in 0..src.height {
            let dy = y + sy;
            if dy >= self.height {
                break;
            }
            for sx in 0..src.width {
                let dx = x + sx;
                if dx >= self.width {
                    break;
                }
                let di = ((dy * self.width + dx) as usize) * dc;
                let si = ((sy * src.width + sx) as usize) * sc;
                self.data[di..di + copy_c].copy_from_slice(&src.data[si..si + copy_c]);
            }
        }
    }

    /// Multiply the color channels of rows `[0, rows)` by `factor`, leaving
    /// alpha untouched. Used for translucent overlay background bars.
    pub fn darken_top_rows(&mut self, rows: u32, factor: f32) {
        let rows = rows.min(self.height);
        let c = self.channels as usize;
        let color_c = c.min(3);
        let row_len = self.width as usize * c;
        for row in self.data[..rows as usize * row_len].chunks_exact_mut(c) {
            for v in &mut row[..color_c] {
                *v *= factor;
            }
        }
    }

    /// Flatten to packed RGB8 for the video sink; single-channel buffers are
    /// broadcast to gray, alpha is dropped, values clamped to [0, 1].
    pub fn to_rgb8(&self) -> Vec<u8> {
        let c = self.channels as usize;
        let mut out = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.data.chunks_exact(c) {
            if c == 1 {
                let v = quantize(px[0]);
                out.extend_from_slice(&[v, v, v]);
            } else if c == 2 {
                out.extend_from_slice(&[quantize(px[0]), quantize(px[1]), 0]);
            } else {
                out.extend_from_slice(&[quantize(px[0]), quantize(px[1]), quantize(px[2])]);
            }
        }
        out
    }
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// A fully transformed frame, ready for the sink. Ownership passes pipeline →
/// orchestrator → sink; the orchestrator keeps the most recently written one
/// as the freeze-frame candidate.
#[derive(Clone, Debug)]
pub struct PreparedFrame {
    pub frame_number: i64,
    pub buffer: PixelBuffer,
}

impl PreparedFrame {
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    pub fn height(&self) -> u32 {
        self.buffer.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_bad_shapes() {
        assert!(PixelBuffer::new(0, 4, 3).is_err());
        assert!(PixelBuffer::new(4, 4, 0).is_err());
        assert!(PixelBuffer::new(4, 4, 5).is_err());
    }

    #[test]
    fn paste_clips_at_edges() {
        let mut dst = PixelBuffer::new(4, 4, 3).unwrap();
        let src = PixelBuffer::filled(3, 3, 3, [1.0, 0.5, 0.25, 0.0]).unwrap();
        dst.paste(&src, 2, 2);

        // (2,2) and (3,3) written, (1,1) untouched.
        let idx = |x: u32, y: u32| ((y * 4 + x) * 3) as usize;
        assert_eq!(dst.data[idx(2, 2)], 1.0);
        assert_eq!(dst.data[idx(3, 3)], 1.0);
        assert_eq!(dst.data[idx(1, 1)], 0.0);
    }

    #[test]
    fn darken_leaves_alpha_and_lower_rows() {
        let mut buf = PixelBuffer::filled(2, 2, 4, [1.0, 1.0, 1.0, 1.0]).unwrap();
        buf.darken_top_rows(1, 0.5);
        // First row color halved, alpha intact.
        assert_eq!(&buf.data[0..4], &[0.5, 0.5, 0.5, 1.0]);
        // Second row untouched.
        assert_eq!(&buf.data[8..12], &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn rgb8_broadcasts_gray_and_clamps() {
        let mut buf = PixelBuffer::new(1, 1, 1).unwrap();
        buf.data[0] = 2.0;
        assert_eq!(buf.to_rgb8(), vec![255, 255, 255]);
    }
}
