use std::sync::Arc;

use tracing::warn;

use crate::buffer::{PixelBuffer, PreparedFrame};
use crate::cache::FileInfoCache;
use crate::color::ColorTransform;
use crate::composite::ContactSheetRenderer;
use crate::error::ReelResult;
use crate::job::ConversionJob;
use crate::overlay::{FrameTokens, OverlayRenderer};
use crate::reader::{FrameReader, ReaderFactory};
use crate::resample::resample;
use crate::sequence::FrameSequence;

/// Everything a worker needs to build its own [`FramePipeline`]: shared,
/// immutable job state plus the factory for the per-thread reader. Cheap to
/// clone and safe to send across the pool.
#[derive(Clone)]
pub struct PipelineContext {
    pub sequence: Arc<FrameSequence>,
    pub job: Arc<ConversionJob>,
    pub transform: ColorTransform,
    pub cache: Arc<FileInfoCache>,
    pub readers: Arc<dyn ReaderFactory>,
    /// Final output geometry the sink was initialized with.
    pub out_width: u32,
    pub out_height: u32,
    pub fps: f64,
}

/// Single-frame transform: read/composite → color-convert → resample →
/// overlay. Owns its collaborators; one instance per thread, built once and
/// reused for every frame that thread prepares.
pub struct FramePipeline {
    ctx: PipelineContext,
    reader: Box<dyn FrameReader>,
    overlay: Option<OverlayRenderer>,
    composite: Option<ContactSheetRenderer>,
}

impl FramePipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        let reader = ctx.readers.create();
        let overlay = ctx.job.overlay.clone().map(OverlayRenderer::new);
        let composite = ctx.job.composite.clone().map(ContactSheetRenderer::new);
        Self {
            ctx,
            reader,
            overlay,
            composite,
        }
    }

    /// Prepare one existing frame. Any step failure logs with frame context
    /// and yields `None` — the frame is then treated as missing
    /// (freeze-frame), never aborting the run.
    pub fn prepare(&mut self, frame: i64) -> Option<PreparedFrame> {
        match self.try_prepare(frame) {
            Ok(prepared) => Some(prepared),
            Err(e) => {
                if e.is_frame_recoverable() {
                    warn!(frame, "frame preparation failed: {e}");
                } else {
                    tracing::error!(frame, "frame preparation failed: {e}");
                }
                None
            }
        }
    }

    fn try_prepare(&mut self, frame: i64) -> ReelResult<PreparedFrame> {
        let path = self.ctx.sequence.file_path(frame);
        let info = self.ctx.cache.get(&path, self.reader.as_mut())?;

        let (mut buffer, layer_label) = if let Some(composite) = self.composite.as_mut() {
            let buffer = composite.render(self.reader.as_mut(), &path, &info.layers)?;
            (buffer, "contact sheet".to_string())
        } else {
            self.read_layer(&path, &info.layers)?
        };

        self.ctx.transform.apply(&mut buffer)?;
        buffer = resample(buffer, self.ctx.out_width, self.ctx.out_height)?;

        if let Some(overlay) = self.overlay.as_mut() {
            let tokens = FrameTokens {
                frame,
                file: self.ctx.sequence.file_name(frame),
                fps: self.ctx.fps,
                layer: layer_label,
                colorspace: self
                    .ctx
                    .job
                    .input_color_space
                    .clone()
                    .or_else(|| info.color_space.clone())
                    .unwrap_or_default(),
            };
            overlay.apply(&mut buffer, &tokens)?;
        }

        Ok(PreparedFrame {
            frame_number: frame,
            buffer,
        })
    }

    /// Read the requested layer, falling back to the default full-channel
    /// layer when a named layer does not resolve. Missing a cosmetic layer is
    /// never a hard failure on its own.
    fn read_layer(&mut self, path: &std::path::Path, available: &[String]) -> ReelResult<(PixelBuffer, String)> {
        if let Some(wanted) = self.ctx.job.layer.as_deref() {
            if available.iter().any(|l| l == wanted) {
                let buffer = self.reader.read(path, Some(wanted))?;
                return Ok((buffer, wanted.to_string()));
            }
            warn!(
                layer = wanted,
                path = %path.display(),
                "layer not found, falling back to default layer"
            );
        }
        let buffer = self.reader.read(path, None)?;
        Ok((buffer, "rgba".to_string()))
    }
}
