use tracing::warn;

use crate::buffer::PixelBuffer;
use crate::error::ReelResult;
use crate::job::{OverlayAlignment, OverlaySpec};
use crate::text::TextRasterizer;

/// Per-frame values substituted into overlay templates.
#[derive(Clone, Debug, Default)]
pub struct FrameTokens {
    pub frame: i64,
    pub file: String,
    pub fps: f64,
    pub layer: String,
    pub colorspace: String,
}

/// Replace `{frame}`, `{file}`, `{fps}`, `{layer}` and `{colorspace}` in a
/// template. Unknown tokens are left in place.
pub fn substitute_tokens(template: &str, tokens: &FrameTokens) -> String {
    template
        .replace("{frame}", &tokens.frame.to_string())
        .replace("{file}", &tokens.file)
        .replace("{fps}", &format!("{:.2}", tokens.fps))
        .replace("{layer}", &tokens.layer)
        .replace("{colorspace}", &tokens.colorspace)
}

const EDGE_MARGIN: u32 = 20;
const TEXT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// Draws configured burn-in elements onto prepared frames. One instance per
/// worker thread; the rasterizer inside is not shareable.
pub struct OverlayRenderer {
    spec: OverlaySpec,
    rasterizer: Option<TextRasterizer>,
}

impl OverlayRenderer {
    /// A missing or unreadable font disables text drawing with a warning;
    /// burn-ins are cosmetic and never fail a job on their own.
    pub fn new(spec: OverlaySpec) -> Self {
        let rasterizer = match &spec.font_path {
            Some(path) => match TextRasterizer::from_font_file(path) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("overlay font unavailable, text drawing disabled: {e}");
                    None
                }
            },
            None => {
                if !spec.elements.is_empty() {
                    warn!("overlay configured without a font; text drawing disabled");
                }
                None
            }
        };
        Self { spec, rasterizer }
    }

    /// Height of the background bar: scaled from the tallest element.
    fn bar_height(&self) -> u32 {
        let max_size = self
            .spec
            .elements
            .iter()
            .map(|e| e.font_size)
            .fold(0.0f32, f32::max);
        (max_size * 2.0) as u32
    }

    pub fn apply(&mut self, buffer: &mut PixelBuffer, tokens: &FrameTokens) -> ReelResult<()> {
        if self.spec.elements.is_empty() {
            return Ok(());
        }

        let bar_height = self.bar_height();
        if self.spec.use_background && bar_height > 0 {
            let opacity = self.spec.background_opacity.min(100);
            let factor = 1.0 - opacity as f32 / 100.0;
            buffer.darken_top_rows(bar_height, factor);
        }

        let Some(rasterizer) = self.rasterizer.as_mut() else {
            return Ok(());
        };

        let width = buffer.width;
        for element in self.spec.elements.clone() {
            let text = substitute_tokens(&element.text_template, tokens);
            let (text_w, text_h) = match rasterizer.measure(&text, element.font_size) {
                Ok(dims) => dims,
                Err(e) => {
                    warn!(frame = tokens.frame, "overlay measure failed: {e}");
                    continue;
                }
            };

            // An x of 0 means "auto": anchor by alignment. An intentional
            // x == 0 cannot be distinguished from the sentinel.
            let anchor_x = if element.x == 0 {
                match element.alignment {
                    OverlayAlignment::Left => EDGE_MARGIN,
                    OverlayAlignment::Center => width / 2,
                    OverlayAlignment::Right => width.saturating_sub(EDGE_MARGIN),
                }
            } else {
                element.x
            };
            let draw_x = match element.alignment {
                OverlayAlignment::Left => i64::from(anchor_x),
                OverlayAlignment::Center => i64::from(anchor_x) - i64::from(text_w) / 2,
                OverlayAlignment::Right => i64::from(anchor_x) - i64::from(text_w),
            };

            // Inside the background bar, center the text vertically.
            let draw_y = if self.spec.use_background && element.y < bar_height {
                i64::from(bar_height.saturating_sub(text_h)) / 2
            } else {
                i64::from(element.y)
            };

            if let Err(e) = rasterizer.draw(
                buffer,
                &text,
                element.font_size,
                draw_x,
                draw_y,
                TEXT_COLOR,
            ) {
                warn!(frame = tokens.frame, "overlay draw failed: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::OverlayElement;

    fn tokens() -> FrameTokens {
        FrameTokens {
            frame: 101,
            file: "render.0101.exr".into(),
            fps: 23.976,
            layer: "diffuse".into(),
            colorspace: "ACES - ACEScg".into(),
        }
    }

    #[test]
    fn all_tokens_substitute() {
        let out = substitute_tokens(
            "f={frame} file={file} fps={fps} layer={layer} cs={colorspace}",
            &tokens(),
        );
        assert_eq!(
            out,
            "f=101 file=render.0101.exr fps=23.98 layer=diffuse cs=ACES - ACEScg"
        );
    }

    #[test]
    fn unknown_tokens_survive() {
        assert_eq!(substitute_tokens("{shot}", &tokens()), "{shot}");
    }

    #[test]
    fn background_bar_darkens_even_without_font() {
        let spec = OverlaySpec {
            elements: vec![OverlayElement {
                text_template: "Frame: {frame}".into(),
                x: 0,
                y: 10,
                alignment: OverlayAlignment::Left,
                font_size: 20.0,
            }],
            use_background: true,
            background_opacity: 30,
            font_path: None,
        };
        let mut renderer = OverlayRenderer::new(spec);
        let mut buf = PixelBuffer::filled(4, 64, 3, [1.0, 1.0, 1.0, 0.0]).unwrap();
        renderer.apply(&mut buf, &tokens()).unwrap();

        // Bar rows (font 20 -> 40 rows) darkened to 70%, rest untouched.
        assert!((buf.data[0] - 0.7).abs() < 1e-5);
        let below_bar = (41 * 4 * 3) as usize;
        assert_eq!(buf.data[below_bar], 1.0);
    }

    #[test]
    fn no_elements_is_a_no_op() {
        let mut renderer = OverlayRenderer::new(OverlaySpec::default());
        let mut buf = PixelBuffer::filled(4, 4, 3, [0.5, 0.5, 0.5, 0.0]).unwrap();
        let before = buf.clone();
        renderer.apply(&mut buf, &tokens()).unwrap();
        assert_eq!(buf, before);
    }
}
