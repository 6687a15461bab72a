use std::path::Path;

use tracing::warn;

use crate::buffer::PixelBuffer;
use crate::error::ReelResult;
use crate::job::CompositeSpec;
use crate::reader::FrameReader;
use crate::resample::resample;
use crate::text::TextRasterizer;

/// Grid geometry for one contact sheet, derived from the layer count and the
/// first layer's aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SheetLayout {
    pub columns: u32,
    pub rows: u32,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub label_height: u32,
    pub padding: u32,
}

impl SheetLayout {
    pub fn cell_width(&self) -> u32 {
        self.thumb_width + 2 * self.padding
    }

    pub fn cell_height(&self) -> u32 {
        self.thumb_height + 2 * self.padding + self.label_height
    }

    pub fn canvas_width(&self) -> u32 {
        self.cell_width() * self.columns
    }

    pub fn canvas_height(&self) -> u32 {
        self.cell_height() * self.rows
    }

    pub fn cell_origin(&self, index: u32) -> (u32, u32) {
        let row = index / self.columns;
        let col = index % self.columns;
        (
            col * self.cell_width() + self.padding,
            row * self.cell_height() + self.padding,
        )
    }
}

/// Compute the sheet layout. Thumbnail height is aspect-locked to the first
/// layer's geometry.
pub fn sheet_layout(spec: &CompositeSpec, layer_count: u32, first_w: u32, first_h: u32) -> SheetLayout {
    let rows = layer_count.div_ceil(spec.columns).max(1);
    let thumb_width = spec.thumbnail_width.max(1);
    let thumb_height = if first_w == 0 {
        thumb_width
    } else {
        ((thumb_width as u64 * first_h as u64) / first_w as u64).max(1) as u32
    };
    SheetLayout {
        columns: spec.columns,
        rows,
        thumb_width,
        thumb_height,
        label_height: spec.label_height(),
        padding: spec.padding,
    }
}

/// Builds one labeled grid frame out of every layer of a single time sample.
/// One instance per worker thread.
pub struct ContactSheetRenderer {
    spec: CompositeSpec,
    rasterizer: Option<TextRasterizer>,
}

impl ContactSheetRenderer {
    pub fn new(spec: CompositeSpec) -> Self {
        let rasterizer = if spec.show_labels {
            match &spec.font_path {
                Some(path) => match TextRasterizer::from_font_file(path) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!("contact sheet label font unavailable, labels disabled: {e}");
                        None
                    }
                },
                None => {
                    warn!("contact sheet labels enabled without a font; labels disabled");
                    None
                }
            }
        } else {
            None
        };
        Self { spec, rasterizer }
    }

    /// Render the sheet for one frame file. A per-layer read failure logs and
    /// leaves that cell at background color; it never aborts the grid.
    pub fn render(
        &mut self,
        reader: &mut dyn FrameReader,
        path: &Path,
        layers: &[String],
    ) -> ReelResult<PixelBuffer> {
        if layers.is_empty() {
            // No named layers: the sheet degenerates to the default image.
            return reader.read(path, None);
        }

        let first = reader.read(path, Some(&layers[0]))?;
        let layout = sheet_layout(&self.spec, layers.len() as u32, first.width, first.height);

        let bg = self.spec.background;
        let mut canvas = PixelBuffer::filled(
            layout.canvas_width(),
            layout.canvas_height(),
            3,
            [bg[0], bg[1], bg[2], 0.0],
        )?;

        for (i, layer_name) in layers.iter().enumerate() {
            let (x, y) = layout.cell_origin(i as u32);
            let pixels = if i == 0 {
                Ok(first.clone())
            } else {
                reader.read(path, Some(layer_name))
            };
            match pixels.and_then(|p| resample(p, layout.thumb_width, layout.thumb_height)) {
                Ok(thumb) => canvas.paste(&thumb, x, y),
                Err(e) => {
                    warn!(layer = %layer_name, path = %path.display(), "contact sheet cell failed: {e}");
                    continue;
                }
            }

            if let Some(rasterizer) = self.rasterizer.as_mut()
                && let Err(e) = rasterizer.draw(
                    &mut canvas,
                    layer_name,
                    self.spec.label_font_size,
                    i64::from(x),
                    i64::from(y + layout.thumb_height + 5),
                    [1.0, 1.0, 1.0],
                )
            {
                warn!(layer = %layer_name, "contact sheet label failed: {e}");
            }
        }

        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CompositeSpec {
        CompositeSpec {
            columns: 2,
            thumbnail_width: 320,
            padding: 4,
            show_labels: true,
            label_font_size: 16.0,
            ..CompositeSpec::default()
        }
    }

    #[test]
    fn five_layers_two_columns_is_three_rows() {
        let layout = sheet_layout(&spec(), 5, 1920, 1080);
        assert_eq!(layout.rows, 3);
        assert_eq!(layout.columns, 2);
    }

    #[test]
    fn canvas_dimensions_follow_the_grid_law() {
        let layout = sheet_layout(&spec(), 5, 1920, 1080);
        // thumb 320x180 (aspect locked), label strip 16*2.5 = 40.
        assert_eq!(layout.thumb_height, 180);
        assert_eq!(layout.canvas_width(), 2 * (320 + 2 * 4));
        assert_eq!(layout.canvas_height(), 3 * (180 + 2 * 4 + 40));
    }

    #[test]
    fn labels_off_removes_the_strip() {
        let layout = sheet_layout(
            &CompositeSpec {
                show_labels: false,
                ..spec()
            },
            4,
            1920,
            1080,
        );
        assert_eq!(layout.label_height, 0);
        assert_eq!(layout.canvas_height(), 2 * (180 + 2 * 4));
    }

    #[test]
    fn cell_origins_walk_row_major() {
        let layout = sheet_layout(&spec(), 4, 100, 100);
        let cw = layout.cell_width();
        let ch = layout.cell_height();
        assert_eq!(layout.cell_origin(0), (4, 4));
        assert_eq!(layout.cell_origin(1), (cw + 4, 4));
        assert_eq!(layout.cell_origin(2), (4, ch + 4));
    }
}
