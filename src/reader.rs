use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::error::{ReelError, ReelResult};

/// Vendor metadata keys probed for a frame rate, in order; first hit wins.
pub const FPS_METADATA_KEYS: &[&str] = &[
    "framesPerSecond",
    "exr/FramesPerSecond", // Nuke
    "fps",
    "arnold/fps",  // Arnold
    "rs/fps",      // Redshift
    "vray/fps",    // V-Ray
    "mantra/fps",  // Mantra (Houdini)
    "karma/fps",   // Karma (Houdini)
    "cap_fps",     // Blender
];

/// Vendor metadata keys probed for a color space name, in order.
pub const COLOR_SPACE_METADATA_KEYS: &[&str] = &[
    "exr/oiio:ColorSpace",
    "oiio:ColorSpace",
    "colorSpace",
    "interchange/color_space",
    "acesImageContainerFlag",
];

/// Everything worth knowing about a frame file, extracted in a single open so
/// network-hosted sources are not re-read for each question.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    /// Named layers/AOVs; empty means only the default full-channel layer.
    pub layers: Vec<String>,
    pub fps: Option<f64>,
    pub color_space: Option<String>,
    pub subimages: u32,
}

impl FileInfo {
    /// Build a `FileInfo` from raw container attributes, probing the ordered
    /// vendor key lists for fps and color space.
    pub fn from_attributes(
        width: u32,
        height: u32,
        channels: u32,
        layers: Vec<String>,
        subimages: u32,
        attributes: &HashMap<String, String>,
    ) -> Self {
        Self {
            width,
            height,
            channels,
            layers,
            subimages,
            fps: probe_fps(attributes),
            color_space: probe_color_space(attributes),
        }
    }
}

fn probe_fps(attributes: &HashMap<String, String>) -> Option<f64> {
    for key in FPS_METADATA_KEYS {
        if let Some(raw) = attributes.get(*key)
            && let Some(fps) = parse_fps(raw)
        {
            return Some(fps);
        }
    }
    None
}

/// Accepts plain floats and `num/den` rationals as some renderers write them.
fn parse_fps(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    let fps: f64 = raw.parse().ok()?;
    (fps > 0.0).then_some(fps)
}

fn probe_color_space(attributes: &HashMap<String, String>) -> Option<String> {
    for key in COLOR_SPACE_METADATA_KEYS {
        if let Some(raw) = attributes.get(*key) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Narrow interface over the pixel codec. Implementations must tolerate
/// multi-layer/multi-part HDR sources; a `None` layer reads the default
/// full-channel image.
pub trait FrameReader: Send {
    fn file_info(&mut self, path: &Path) -> ReelResult<FileInfo>;
    fn read(&mut self, path: &Path, layer: Option<&str>) -> ReelResult<PixelBuffer>;
}

/// Readers are expensive to construct and not shareable across threads; each
/// prefetch worker builds its own through this factory.
pub trait ReaderFactory: Send + Sync {
    fn create(&self) -> Box<dyn FrameReader>;
}

/// Default reader backed by the `image` crate: LDR formats plus single-part
/// EXR. Exposes no named layers and no container attributes; renders that
/// need vendor metadata plug in their own [`FrameReader`].
#[derive(Clone, Debug, Default)]
pub struct ImageCrateReader;

impl FrameReader for ImageCrateReader {
    fn file_info(&mut self, path: &Path) -> ReelResult<FileInfo> {
        let img = image::open(path)
            .map_err(|e| ReelError::read(format!("cannot open {}: {e}", path.display())))?;
        let channels = u32::from(img.color().channel_count());
        debug!(path = %path.display(), width = img.width(), height = img.height(), "probed file info");
        Ok(FileInfo {
            width: img.width(),
            height: img.height(),
            channels,
            layers: Vec::new(),
            fps: None,
            color_space: None,
            subimages: 1,
        })
    }

    fn read(&mut self, path: &Path, layer: Option<&str>) -> ReelResult<PixelBuffer> {
        if let Some(layer) = layer {
            return Err(ReelError::read(format!(
                "layer '{layer}' not available in {} (default reader is single-layer)",
                path.display()
            )));
        }
        let img = image::open(path)
            .map_err(|e| ReelError::read(format!("cannot read {}: {e}", path.display())))?;
        let (width, height) = (img.width(), img.height());
        let has_alpha = img.color().has_alpha();
        let (channels, data) = if has_alpha {
            (4, img.into_rgba32f().into_raw())
        } else {
            (3, img.into_rgb32f().into_raw())
        };
        Ok(PixelBuffer {
            width,
            height,
            channels,
            data,
        })
    }
}

/// Factory for the default reader.
#[derive(Clone, Debug, Default)]
pub struct ImageCrateReaderFactory;

impl ReaderFactory for ImageCrateReaderFactory {
    fn create(&self) -> Box<dyn FrameReader> {
        Box::new(ImageCrateReader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fps_probe_respects_key_order() {
        let a = attrs(&[("rs/fps", "30"), ("framesPerSecond", "24")]);
        let info = FileInfo::from_attributes(1, 1, 3, vec![], 1, &a);
        assert_eq!(info.fps, Some(24.0));
    }

    #[test]
    fn fps_probe_parses_rationals_and_skips_garbage() {
        let a = attrs(&[("framesPerSecond", "not-a-number"), ("fps", "24000/1001")]);
        let info = FileInfo::from_attributes(1, 1, 3, vec![], 1, &a);
        let fps = info.fps.unwrap();
        assert!((fps - 23.976).abs() < 0.001);
    }

    #[test]
    fn color_space_probe_first_hit_wins() {
        let a = attrs(&[("colorSpace", "Rec.709"), ("oiio:ColorSpace", "ACES - ACEScg")]);
        let info = FileInfo::from_attributes(1, 1, 3, vec![], 1, &a);
        assert_eq!(info.color_space.as_deref(), Some("ACES - ACEScg"));
    }

    #[test]
    fn empty_attributes_detect_nothing() {
        let info = FileInfo::from_attributes(8, 4, 4, vec!["diffuse".into()], 2, &HashMap::new());
        assert_eq!(info.fps, None);
        assert_eq!(info.color_space, None);
        assert_eq!(info.subimages, 2);
    }
}
