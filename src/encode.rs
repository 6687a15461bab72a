use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info};

use crate::buffer::PixelBuffer;
use crate::error::{ReelError, ReelResult};

/// Destination for prepared frames. Implementations receive frames strictly
/// in presentation order and must be safe to `close` after any number of
/// writes, including zero.
pub trait VideoSink: Send {
    fn initialize(&mut self, width: u32, height: u32, fps: f64) -> ReelResult<()>;
    fn write_frame(&mut self, frame: &PixelBuffer) -> ReelResult<()>;
    fn close(&mut self) -> ReelResult<()>;
    fn frames_written(&self) -> u64;
}

/// Map container-style codec tags to ffmpeg encoder names. Already-valid
/// encoder names pass through unchanged.
pub fn ffmpeg_encoder_name(codec: &str) -> &str {
    match codec {
        "avc1" | "h264" => "libx264",
        "hevc" | "h265" => "libx265",
        "av1" => "libaom-av1",
        "mp4v" | "XVID" | "xvid" => "mpeg4",
        other => other,
    }
}

/// Translate the 0..=10 quality scale into encoder-native rate arguments.
/// 10 is visually lossless, 0 is smallest file.
fn quality_args(encoder: &str, quality: u32) -> Vec<String> {
    let q = quality.min(10) as f64;
    match encoder {
        "libx264" | "libx265" => {
            let crf = (18.0 + (10.0 - q) * 1.7).round() as u32;
            vec!["-crf".into(), crf.to_string()]
        }
        "libaom-av1" => {
            let crf = (20.0 + (10.0 - q) * 3.0).round() as u32;
            vec![
                "-crf".into(),
                crf.to_string(),
                "-b:v".into(),
                "0".into(),
                "-cpu-used".into(),
                "6".into(),
            ]
        }
        "mpeg4" => {
            let qv = (2.0 + (10.0 - q) * 2.9).round() as u32;
            vec!["-q:v".into(), qv.to_string()]
        }
        _ => Vec::new(),
    }
}

#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    pub codec: String,
    pub quality: u32,
    pub overwrite: bool,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            codec: "libx264".to_string(),
            quality: 10,
            overwrite: true,
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw rgb24 frames to its
/// stdin. Output is tagged bt709 and flagged `+faststart` for streaming.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    width: u32,
    height: u32,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            width: 0,
            height: 0,
            frames_written: 0,
        }
    }
}

impl VideoSink for FfmpegSink {
    fn initialize(&mut self, width: u32, height: u32, fps: f64) -> ReelResult<()> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ReelError::config("fps must be positive"));
        }
        if width == 0 || height == 0 {
            return Err(ReelError::config("output width/height must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(ReelError::config(
                "output width/height must be even (required for yuv420p output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelError::config(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(ReelError::encode(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let encoder = ffmpeg_encoder_name(&self.opts.codec).to_string();

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.opts.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &format!("{fps}"),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            &encoder,
        ]);
        cmd.args(quality_args(&encoder, self.opts.quality));
        cmd.args([
            "-pix_fmt",
            "yuv420p",
            "-color_primaries",
            "bt709",
            "-color_trc",
            "bt709",
            "-colorspace",
            "bt709",
            "-movflags",
            "+faststart",
        ]);
        cmd.arg(&self.opts.out_path);

        debug!(?cmd, "spawning ffmpeg");
        let mut child = cmd.spawn().map_err(|e| {
            ReelError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.width = width;
        self.height = height;
        self.frames_written = 0;
        info!(
            out = %self.opts.out_path.display(),
            encoder, width, height, fps, "encoder started"
        );
        Ok(())
    }

    fn write_frame(&mut self, frame: &PixelBuffer) -> ReelResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(ReelError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encode("ffmpeg sink not started"));
        };

        let rgb = frame.to_rgb8();
        use std::io::Write as _;
        stdin
            .write_all(&rgb)
            .map_err(|e| ReelError::encode(format!("failed to write frame to ffmpeg stdin: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            // Never initialized, nothing to finalize.
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|e| ReelError::encode(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::encode("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::encode(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::encode(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_tags_map_to_encoders() {
        assert_eq!(ffmpeg_encoder_name("avc1"), "libx264");
        assert_eq!(ffmpeg_encoder_name("hevc"), "libx265");
        assert_eq!(ffmpeg_encoder_name("mp4v"), "mpeg4");
        assert_eq!(ffmpeg_encoder_name("XVID"), "mpeg4");
        assert_eq!(ffmpeg_encoder_name("libx264"), "libx264");
    }

    #[test]
    fn quality_scale_maps_to_crf() {
        // quality 10 is the low end of the CRF range, 0 the high end
        assert_eq!(quality_args("libx264", 10), ["-crf", "18"]);
        assert_eq!(quality_args("libx264", 0), ["-crf", "35"]);
        assert_eq!(quality_args("mpeg4", 10), ["-q:v", "2"]);
        assert!(quality_args("libaom-av1", 5).contains(&"-cpu-used".to_string()));
    }

    #[test]
    fn write_before_initialize_is_an_error() {
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new("out.mp4"));
        let buffer = PixelBuffer::new(2, 2, 3).unwrap();
        assert!(sink.write_frame(&buffer).is_err());
    }
}
