use std::path::Path;

use crate::buffer::PixelBuffer;
use crate::error::{ReelError, ReelResult};

/// Brush carried through Parley layouts; we only ever rasterize coverage and
/// tint during compositing, so a plain RGBA8 value suffices.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Stateful text rasterizer: Parley shaping + vello_cpu glyph rendering from
/// one set of font bytes. Expensive to build, not shareable across threads;
/// each worker owns its own instance.
pub struct TextRasterizer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    family_name: String,
    font: vello_cpu::peniko::FontData,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("family_name", &self.family_name)
            .finish_non_exhaustive()
    }
}

impl TextRasterizer {
    pub fn from_font_bytes(font_bytes: Vec<u8>) -> ReelResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| ReelError::config("no font families registered from font bytes"))?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReelError::config("registered font family has no name"))?
            .to_string();

        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font,
        })
    }

    pub fn from_font_file(path: &Path) -> ReelResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ReelError::config(format!("cannot read font file {}: {e}", path.display()))
        })?;
        Self::from_font_bytes(bytes)
    }

    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    fn layout(&mut self, text: &str, size_px: f32) -> ReelResult<parley::Layout<TextBrush>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ReelError::config("text size_px must be finite and > 0"));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrush {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        }));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Width and height the text would occupy, in pixels.
    pub fn measure(&mut self, text: &str, size_px: f32) -> ReelResult<(u32, u32)> {
        let layout = self.layout(text, size_px)?;
        Ok((layout.width().ceil() as u32, layout.height().ceil() as u32))
    }

    /// Render `text` as a premultiplied-coverage RGBA8 bitmap (white on
    /// transparent).
    fn rasterize(&mut self, text: &str, size_px: f32) -> ReelResult<(u32, u32, Vec<u8>)> {
        let layout = self.layout(text, size_px)?;
        let width = (layout.width().ceil() as u32).max(1);
        let height = (layout.height().ceil() as u32).max(1);
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(ReelError::config("text raster exceeds maximum surface size"));
        }

        let mut ctx = vello_cpu::RenderContext::new(width as u16, height as u16);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));

        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&self.font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }

        let mut pixmap = vello_cpu::Pixmap::new(width as u16, height as u16);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        Ok((width, height, pixmap.data_as_u8_slice().to_vec()))
    }

    /// Draw `text` onto `target` with its top-left corner at (x, y), tinted
    /// `color`, alpha-blended over the existing pixels. Off-target portions
    /// are clipped.
    pub fn draw(
        &mut self,
        target: &mut PixelBuffer,
        text: &str,
        size_px: f32,
        x: i64,
        y: i64,
        color: [f32; 3],
    ) -> ReelResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let (width, height, rgba) = self.rasterize(text, size_px)?;

        let c = target.channels as usize;
        let color_c = c.min(3);
        for sy in 0..height {
            let dy = y + i64::from(sy);
            if dy < 0 || dy >= i64::from(target.height) {
                continue;
            }
            for sx in 0..width {
                let dx = x + i64::from(sx);
                if dx < 0 || dx >= i64::from(target.width) {
                    continue;
                }
                // Premultiplied white: the alpha byte is the coverage.
                let coverage =
                    f32::from(rgba[((sy * width + sx) * 4 + 3) as usize]) / 255.0;
                if coverage <= 0.0 {
                    continue;
                }
                let di = ((dy as u32 * target.width + dx as u32) as usize) * c;
                for ch in 0..color_c {
                    let dst = target.data[di + ch];
                    target.data[di + ch] = dst * (1.0 - coverage) + color[ch] * coverage;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal valid font is too large to inline; rasterization is covered
    // by the overlay integration tests when a font file is provided. Here we
    // only pin down the failure modes that need no font.

    #[test]
    fn bad_font_bytes_are_rejected() {
        assert!(TextRasterizer::from_font_bytes(vec![0u8; 16]).is_err());
    }

    #[test]
    fn missing_font_file_is_a_config_error() {
        let err = TextRasterizer::from_font_file(Path::new("/no/such/font.ttf")).unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
    }
}
