use std::sync::Arc;

use tracing::{info, warn};

use crate::buffer::{PixelBuffer, PreparedFrame};
use crate::cache::FileInfoCache;
use crate::color::{ColorEngine, ColorTransform};
use crate::composite::sheet_layout;
use crate::encode::{FfmpegSink, FfmpegSinkOpts, VideoSink};
use crate::error::{ReelError, ReelResult};
use crate::job::ConversionJob;
use crate::pipeline::{FramePipeline, PipelineContext};
use crate::prefetch::BoundedPrefetcher;
use crate::reader::{FileInfo, ImageCrateReaderFactory, ReaderFactory};
use crate::sequence::{detect_sequence, resolve_range, FrameSequence, ResolvedRange};

/// Where a run currently is. Transitions are strictly forward; the three
/// terminal states are `Completed`, `Failed` and `Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvertState {
    Idle,
    SequenceDetected,
    MetadataResolved,
    Encoding,
    Completed,
    Failed,
    Cancelled,
}

/// What happened to one scheduled frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Freshly prepared pixels went to the sink.
    Written,
    /// The frame was missing or unreadable; the previous good frame was
    /// repeated to keep timing intact.
    Frozen,
    /// Nothing to write yet: the frame failed before any good frame existed.
    Skipped,
}

/// One progress tick, reported once per scheduled frame before that frame
/// is fetched. Returning `false` from the callback cancels the run without
/// writing the reported frame.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub frame: i64,
    /// 1-based position in the schedule.
    pub index: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn percent(&self) -> f64 {
        self.index as f64 / self.total as f64 * 100.0
    }
}

/// Final accounting for a run.
#[derive(Clone, Debug)]
pub struct ConversionSummary {
    pub state: ConvertState,
    /// Frames delivered to the sink, frozen repeats included.
    pub frames_written: u64,
    pub frames_frozen: u64,
    pub frames_skipped: u64,
    pub output_path: std::path::PathBuf,
}

/// Drives a whole conversion: detect the sequence, resolve metadata, then
/// walk the contiguous range in order, preparing existing frames directly or
/// through the prefetch pool and feeding the sink.
pub struct SequenceConverter {
    job: Arc<ConversionJob>,
    readers: Arc<dyn ReaderFactory>,
    color_engine: Option<Arc<dyn ColorEngine>>,
    state: ConvertState,
}

impl SequenceConverter {
    pub fn new(job: ConversionJob) -> Self {
        Self {
            job: Arc::new(job),
            readers: Arc::new(ImageCrateReaderFactory),
            color_engine: None,
            state: ConvertState::Idle,
        }
    }

    /// Swap in a different frame decoder, e.g. one with EXR layer support.
    pub fn with_reader_factory(mut self, readers: Arc<dyn ReaderFactory>) -> Self {
        self.readers = readers;
        self
    }

    /// Provide the engine backing [`crate::job::ColorPreset::Managed`].
    pub fn with_color_engine(mut self, engine: Arc<dyn ColorEngine>) -> Self {
        self.color_engine = Some(engine);
        self
    }

    pub fn state(&self) -> ConvertState {
        self.state
    }

    /// Convert with the ffmpeg sink configured from the job, reporting no
    /// progress.
    pub fn convert(&mut self) -> ReelResult<ConversionSummary> {
        let mut sink = FfmpegSink::new(FfmpegSinkOpts {
            out_path: self.job.output_path.clone(),
            codec: self.job.codec.clone(),
            quality: self.job.quality,
            overwrite: self.job.overwrite,
        });
        self.run(&mut sink, |_| true)
    }

    /// Convert into `sink`, calling `progress` once per scheduled frame
    /// before it is fetched. Returning `false` from the callback cancels the
    /// run without writing that frame; the sink is still finalized so the
    /// partial file is playable.
    pub fn run<F>(&mut self, sink: &mut dyn VideoSink, progress: F) -> ReelResult<ConversionSummary>
    where
        F: FnMut(&ProgressEvent) -> bool,
    {
        let encoded = self.encode(sink, progress);
        let closed = sink.close();

        let mut summary = match encoded {
            Ok(summary) => summary,
            Err(e) => {
                self.state = ConvertState::Failed;
                if let Err(close_err) = closed {
                    warn!("sink finalize failed after error: {close_err}");
                }
                return Err(e);
            }
        };
        if let Err(e) = closed {
            self.state = ConvertState::Failed;
            return Err(e);
        }

        if self.state != ConvertState::Cancelled {
            if summary.frames_written == 0 {
                self.state = ConvertState::Failed;
                return Err(ReelError::encode(
                    "no frames could be prepared; nothing was written",
                ));
            }
            self.state = ConvertState::Completed;
        }
        summary.state = self.state;
        info!(
            state = ?summary.state,
            written = summary.frames_written,
            frozen = summary.frames_frozen,
            skipped = summary.frames_skipped,
            "conversion finished"
        );
        Ok(summary)
    }

    fn encode<F>(
        &mut self,
        sink: &mut dyn VideoSink,
        mut progress: F,
    ) -> ReelResult<ConversionSummary>
    where
        F: FnMut(&ProgressEvent) -> bool,
    {
        let sequence = Arc::new(detect_sequence(&self.job.input_pattern)?);
        self.state = ConvertState::SequenceDetected;
        let range = resolve_range(&sequence, self.job.start_frame, self.job.end_frame)?;
        info!(
            frames = range.len(),
            gaps = range.gap_count,
            start = range.start,
            end = range.end,
            "sequence detected"
        );

        let cache = Arc::new(FileInfoCache::new());
        let info = self.probe_first_frame(&sequence, &range, &cache)?;

        let fps = self.job.fps.or(info.fps).ok_or_else(|| {
            ReelError::config(
                "fps is not configured and none was found in frame metadata; pass an explicit fps",
            )
        })?;
        let (out_width, out_height) = self.output_geometry(&info);
        let transform = ColorTransform::resolve(
            self.job.color_preset,
            self.job.input_color_space.as_deref(),
            info.color_space.as_deref(),
            self.color_engine.clone(),
        )?;
        self.state = ConvertState::MetadataResolved;
        info!(fps, out_width, out_height, transform = ?transform, "metadata resolved");

        sink.initialize(out_width, out_height, fps)?;
        self.state = ConvertState::Encoding;

        let ctx = PipelineContext {
            sequence: Arc::clone(&sequence),
            job: Arc::clone(&self.job),
            transform,
            cache,
            readers: Arc::clone(&self.readers),
            out_width,
            out_height,
            fps,
        };
        // The pool only exists when real read-ahead was asked for; a
        // single-worker job prepares frames on the orchestrator thread.
        let mut source = if self.job.prefetch_workers > 1 {
            FrameSource::Pool(BoundedPrefetcher::start(ctx, range.existing.clone())?)
        } else {
            FrameSource::Direct(FramePipeline::new(ctx))
        };

        let total = range.len();
        let mut held: Option<PixelBuffer> = None;
        let mut written = 0u64;
        let mut frozen = 0u64;
        let mut skipped = 0u64;
        let mut index = 0u64;

        for frame in range.iter() {
            index += 1;
            let event = ProgressEvent {
                frame,
                index,
                total,
            };
            if !progress(&event) {
                info!(frame, "cancellation requested");
                source.shutdown();
                self.state = ConvertState::Cancelled;
                break;
            }

            let prepared = if sequence.contains(frame) {
                source.fetch(frame)
            } else {
                tracing::debug!(frame, "frame missing on disk");
                None
            };
            let outcome = match prepared {
                Some(p) => {
                    held = Some(p.buffer);
                    FrameOutcome::Written
                }
                None if held.is_some() => FrameOutcome::Frozen,
                None => FrameOutcome::Skipped,
            };
            if let Some(buffer) = held.as_ref() {
                sink.write_frame(buffer)?;
                written += 1;
            }
            match outcome {
                FrameOutcome::Frozen => frozen += 1,
                FrameOutcome::Skipped => {
                    skipped += 1;
                    warn!(frame, "no previous frame to freeze, skipping");
                }
                FrameOutcome::Written => {}
            }
        }

        Ok(ConversionSummary {
            state: self.state,
            frames_written: written,
            frames_frozen: frozen,
            frames_skipped: skipped,
            output_path: self.job.output_path.clone(),
        })
    }

    /// Open the first existing frame once to learn geometry, fps and color
    /// space before the pool starts.
    fn probe_first_frame(
        &self,
        sequence: &FrameSequence,
        range: &ResolvedRange,
        cache: &FileInfoCache,
    ) -> ReelResult<FileInfo> {
        let first = range.existing[0];
        let mut reader = self.readers.create();
        cache.get(&sequence.file_path(first), reader.as_mut())
    }

    /// Target output geometry: explicit, else native (contact-sheet canvas in
    /// composite mode), always floored to even for yuv420p.
    fn output_geometry(&self, info: &FileInfo) -> (u32, u32) {
        let (native_w, native_h) = match &self.job.composite {
            Some(spec) => {
                let layers = (info.layers.len() as u32).max(1);
                let layout = sheet_layout(spec, layers, info.width, info.height);
                (layout.canvas_width(), layout.canvas_height())
            }
            None => (info.width, info.height),
        };
        let w = self.job.width.unwrap_or(native_w);
        let h = self.job.height.unwrap_or(native_h);
        ((w & !1).max(2), (h & !1).max(2))
    }
}

/// Where prepared frames come from: the orchestrator's own pipeline when no
/// read-ahead was requested, or the worker pool.
enum FrameSource {
    Direct(FramePipeline),
    Pool(BoundedPrefetcher),
}

impl FrameSource {
    /// Fetch the prepared result for one existing frame. The pool and the
    /// orchestrator both walk the existing-frame list in ascending order, so
    /// the next pooled result always belongs to the requested frame.
    fn fetch(&mut self, frame: i64) -> Option<PreparedFrame> {
        match self {
            FrameSource::Direct(pipeline) => pipeline.prepare(frame),
            FrameSource::Pool(pool) => pool.take_next().and_then(|(_, prepared)| prepared),
        }
    }

    fn shutdown(self) {
        if let FrameSource::Pool(pool) = self {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_floored_to_even() {
        let job = ConversionJob::builder()
            .input_pattern("render.%04d.exr")
            .output_path("out.mp4")
            .resolution(1921, 1081)
            .build()
            .unwrap();
        let converter = SequenceConverter::new(job);
        let info = FileInfo {
            width: 640,
            height: 480,
            ..FileInfo::default()
        };
        assert_eq!(converter.output_geometry(&info), (1920, 1080));
    }

    #[test]
    fn geometry_defaults_to_source() {
        let job = ConversionJob::builder()
            .input_pattern("render.%04d.exr")
            .output_path("out.mp4")
            .build()
            .unwrap();
        let converter = SequenceConverter::new(job);
        let info = FileInfo {
            width: 640,
            height: 481,
            ..FileInfo::default()
        };
        assert_eq!(converter.output_geometry(&info), (640, 480));
    }
}
