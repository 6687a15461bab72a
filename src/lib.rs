//! Image-sequence to video conversion for render review.
//!
//! `reelforge` turns numbered frame sequences (EXR renders, plate scans,
//! playblasts) into encoded videos: it detects the sequence from a single
//! pattern, resolves fps/geometry/color space from frame metadata, prepares
//! frames on a bounded worker pool (color transform, resampling, burn-in
//! overlays, optional layer contact sheets) and streams them in order to an
//! `ffmpeg` subprocess.
//!
//! The entry point is [`SequenceConverter`]; a run is described by a
//! [`ConversionJob`] built through its builder:
//!
//! ```no_run
//! use reelforge::{ConversionJob, SequenceConverter};
//!
//! # fn main() -> reelforge::ReelResult<()> {
//! let job = ConversionJob::builder()
//!     .input_pattern("/shots/sq10/render.%04d.exr")
//!     .output_path("/shots/sq10/review.mp4")
//!     .fps(24.0)
//!     .prefetch_workers(4)
//!     .build()?;
//! let summary = SequenceConverter::new(job).convert()?;
//! println!("wrote {} frames", summary.frames_written);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod buffer;
pub mod cache;
pub mod color;
pub mod composite;
pub mod convert;
pub mod encode;
pub mod error;
pub mod job;
pub mod overlay;
pub mod pipeline;
pub mod prefetch;
pub mod reader;
pub mod resample;
pub mod sequence;
pub mod text;

pub use buffer::{PixelBuffer, PreparedFrame};
pub use cache::FileInfoCache;
pub use color::{ColorEngine, ColorTransform};
pub use convert::{ConversionSummary, ConvertState, FrameOutcome, ProgressEvent, SequenceConverter};
pub use encode::{FfmpegSink, FfmpegSinkOpts, VideoSink};
pub use error::{ReelError, ReelResult};
pub use job::{
    ColorPreset, CompositeSpec, ConversionJob, ConversionJobBuilder, OverlayAlignment,
    OverlayElement, OverlaySpec,
};
pub use prefetch::BoundedPrefetcher;
pub use reader::{FileInfo, FrameReader, ReaderFactory};
pub use sequence::{detect_sequence, resolve_range, FrameSequence, ResolvedRange};
