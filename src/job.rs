use std::path::{Path, PathBuf};

use crate::error::{ReelError, ReelResult};

pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi"];

/// Color transform applied to every frame. A closed set with exhaustive
/// dispatch; `Managed` resolves named spaces through a [`crate::color::ColorEngine`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ColorPreset {
    #[default]
    LinearToSrgb,
    LinearToRec709,
    SrgbToLinear,
    Passthrough,
    Managed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// One burn-in element. Templates may use the tokens `{frame}`, `{file}`,
/// `{fps}`, `{layer}` and `{colorspace}`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OverlayElement {
    pub text_template: String,
    /// An x of 0 is a sentinel for "auto": the element anchors near the left
    /// edge, at half image width, or near the right edge depending on
    /// `alignment`. An intentional x of exactly 0 is indistinguishable.
    pub x: u32,
    pub y: u32,
    pub alignment: OverlayAlignment,
    pub font_size: f32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlaySpec {
    pub elements: Vec<OverlayElement>,
    /// Darken a bar across the top of the frame before drawing text.
    pub use_background: bool,
    /// Bar opacity in percent; 30 darkens the region to 70% brightness.
    pub background_opacity: u32,
    /// Font file used to rasterize the elements. Without one, text drawing is
    /// skipped with a warning.
    pub font_path: Option<PathBuf>,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            use_background: false,
            background_opacity: 30,
            font_path: None,
        }
    }
}

/// Layout for the per-frame multi-layer contact sheet.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompositeSpec {
    pub columns: u32,
    pub thumbnail_width: u32,
    pub padding: u32,
    pub show_labels: bool,
    pub label_font_size: f32,
    pub background: [f32; 3],
    pub font_path: Option<PathBuf>,
}

impl Default for CompositeSpec {
    fn default() -> Self {
        Self {
            columns: 4,
            thumbnail_width: 480,
            padding: 4,
            show_labels: true,
            label_font_size: 16.0,
            background: [0.05, 0.05, 0.05],
            font_path: None,
        }
    }
}

impl CompositeSpec {
    /// Height of the label strip under each thumbnail.
    pub fn label_height(&self) -> u32 {
        if self.show_labels {
            (self.label_font_size * 2.5) as u32
        } else {
            0
        }
    }
}

/// Immutable, validated description of one conversion run.
///
/// Built through [`ConversionJobBuilder`]; construction fails immediately on
/// out-of-range values rather than coercing them.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ConversionJob {
    pub input_pattern: String,
    pub output_path: PathBuf,
    pub fps: Option<f64>,
    pub color_preset: ColorPreset,
    /// Force a specific named input space (e.g. "ACES - ACEScg") instead of
    /// the one detected from frame metadata.
    pub input_color_space: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: String,
    /// 0..=10, 10 is best; maps onto codec-specific rate control.
    pub quality: u32,
    pub layer: Option<String>,
    pub start_frame: Option<i64>,
    pub end_frame: Option<i64>,
    pub prefetch_workers: usize,
    pub overlay: Option<OverlaySpec>,
    pub composite: Option<CompositeSpec>,
    /// Replace an existing output file instead of refusing to start.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

impl ConversionJob {
    pub fn builder() -> ConversionJobBuilder {
        ConversionJobBuilder::default()
    }

    fn validate(&self) -> ReelResult<()> {
        if self.input_pattern.trim().is_empty() {
            return Err(ReelError::config("input pattern must not be empty"));
        }
        validate_output_path(&self.output_path)?;
        if let Some(fps) = self.fps
            && fps <= 0.0
        {
            return Err(ReelError::config("fps must be greater than 0"));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ReelError::config("output width/height must be greater than 0"));
        }
        if let (Some(start), Some(end)) = (self.start_frame, self.end_frame)
            && start > end
        {
            return Err(ReelError::config("start frame must be <= end frame"));
        }
        if self.prefetch_workers == 0 {
            return Err(ReelError::config("prefetch workers must be >= 1"));
        }
        if self.quality > 10 {
            return Err(ReelError::config("quality must be in 0..=10"));
        }
        if let Some(cs) = &self.composite
            && cs.columns == 0
        {
            return Err(ReelError::config("composite columns must be >= 1"));
        }
        Ok(())
    }
}

fn default_overwrite() -> bool {
    true
}

fn validate_output_path(path: &Path) -> ReelResult<()> {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Err(ReelError::config(
            "output path must have a video file extension (e.g. .mp4)",
        ));
    };
    let ext = ext.to_ascii_lowercase();
    if !SUPPORTED_VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ReelError::config(format!(
            "unsupported video extension '.{ext}' (supported: {})",
            SUPPORTED_VIDEO_EXTENSIONS.join(", ")
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct ConversionJobBuilder {
    input_pattern: Option<String>,
    output_path: Option<PathBuf>,
    fps: Option<f64>,
    color_preset: ColorPreset,
    input_color_space: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    codec: Option<String>,
    quality: Option<u32>,
    layer: Option<String>,
    start_frame: Option<i64>,
    end_frame: Option<i64>,
    prefetch_workers: Option<usize>,
    overlay: Option<OverlaySpec>,
    composite: Option<CompositeSpec>,
    overwrite: Option<bool>,
}

impl ConversionJobBuilder {
    pub fn input_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.input_pattern = Some(pattern.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn color_preset(mut self, preset: ColorPreset) -> Self {
        self.color_preset = preset;
        self
    }

    pub fn input_color_space(mut self, space: impl Into<String>) -> Self {
        self.input_color_space = Some(space.into());
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn frame_range(mut self, start: i64, end: i64) -> Self {
        self.start_frame = Some(start);
        self.end_frame = Some(end);
        self
    }

    pub fn start_frame(mut self, start: i64) -> Self {
        self.start_frame = Some(start);
        self
    }

    pub fn end_frame(mut self, end: i64) -> Self {
        self.end_frame = Some(end);
        self
    }

    pub fn prefetch_workers(mut self, workers: usize) -> Self {
        self.prefetch_workers = Some(workers);
        self
    }

    pub fn overlay(mut self, overlay: OverlaySpec) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn composite(mut self, composite: CompositeSpec) -> Self {
        self.composite = Some(composite);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn build(self) -> ReelResult<ConversionJob> {
        let job = ConversionJob {
            input_pattern: self
                .input_pattern
                .ok_or_else(|| ReelError::config("input pattern is required"))?,
            output_path: self
                .output_path
                .ok_or_else(|| ReelError::config("output path is required"))?,
            fps: self.fps,
            color_preset: self.color_preset,
            input_color_space: self.input_color_space,
            width: self.width,
            height: self.height,
            codec: self.codec.unwrap_or_else(|| "libx264".to_string()),
            quality: self.quality.unwrap_or(10),
            layer: self.layer,
            start_frame: self.start_frame,
            end_frame: self.end_frame,
            prefetch_workers: self.prefetch_workers.unwrap_or(1),
            overlay: self.overlay,
            composite: self.composite,
            overwrite: self.overwrite.unwrap_or(true),
        };
        job.validate()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConversionJobBuilder {
        ConversionJob::builder()
            .input_pattern("render.%04d.exr")
            .output_path("out.mp4")
    }

    #[test]
    fn builder_applies_defaults() {
        let job = base().build().unwrap();
        assert_eq!(job.codec, "libx264");
        assert_eq!(job.quality, 10);
        assert_eq!(job.prefetch_workers, 1);
        assert_eq!(job.color_preset, ColorPreset::LinearToSrgb);
    }

    #[test]
    fn invalid_values_fail_construction() {
        assert!(base().fps(0.0).build().is_err());
        assert!(base().fps(-24.0).build().is_err());
        assert!(base().resolution(0, 1080).build().is_err());
        assert!(base().frame_range(10, 5).build().is_err());
        assert!(base().prefetch_workers(0).build().is_err());
        assert!(base().quality(11).build().is_err());
    }

    #[test]
    fn output_extension_is_checked_before_io() {
        assert!(base().output_path("out.txt").build().is_err());
        assert!(base().output_path("out").build().is_err());
        assert!(base().output_path("out.MKV").build().is_ok());
    }

    #[test]
    fn composite_label_height_tracks_font_size() {
        let spec = CompositeSpec {
            label_font_size: 16.0,
            show_labels: true,
            ..CompositeSpec::default()
        };
        assert_eq!(spec.label_height(), 40);
        let spec = CompositeSpec {
            show_labels: false,
            ..spec
        };
        assert_eq!(spec.label_height(), 0);
    }
}
