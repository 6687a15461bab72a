use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use reelforge::{
    detect_sequence, resolve_range, ColorPreset, CompositeSpec, ConversionJob, OverlaySpec,
    SequenceConverter,
};

#[derive(Parser, Debug)]
#[command(name = "reelforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a frame sequence to a video (requires `ffmpeg` on PATH).
    Convert(ConvertArgs),
    /// Detect a sequence and print what would be converted, as JSON.
    Detect(DetectArgs),
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Sequence pattern: printf (`render.%04d.exr`), `$F4`, `####`, or any
    /// one existing frame file.
    #[arg(long = "in")]
    in_pattern: String,

    /// Output video path (.mp4, .mkv, .mov or .avi).
    #[arg(long)]
    out: PathBuf,

    /// Frame rate; detected from metadata when omitted (error if neither).
    #[arg(long)]
    fps: Option<f64>,

    /// Color preset: linear_to_srgb, linear_to_rec709, srgb_to_linear,
    /// passthrough or managed.
    #[arg(long, default_value = "linear_to_srgb")]
    color: String,

    /// Input color space for managed conversion (overrides metadata).
    #[arg(long)]
    input_colorspace: Option<String>,

    /// Output width; source width when omitted.
    #[arg(long)]
    width: Option<u32>,

    /// Output height; source height when omitted.
    #[arg(long)]
    height: Option<u32>,

    /// Codec name or container tag (libx264, hevc, avc1, mp4v, ...).
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// Quality 0..=10, 10 is best.
    #[arg(long, default_value_t = 10)]
    quality: u32,

    /// Read a specific EXR layer/AOV instead of the default layer.
    #[arg(long)]
    layer: Option<String>,

    /// First frame to encode (defaults to first detected).
    #[arg(long)]
    start: Option<i64>,

    /// Last frame to encode, inclusive (defaults to last detected).
    #[arg(long)]
    end: Option<i64>,

    /// Prefetch worker threads.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Overwrite the output file if it already exists.
    #[arg(long, default_value_t = true)]
    overwrite: bool,

    /// JSON file describing burn-in overlay elements.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Lay every layer out on a contact sheet instead of reading one layer.
    #[arg(long, default_value_t = false)]
    contact_sheet: bool,

    /// Contact sheet columns.
    #[arg(long, default_value_t = 4)]
    columns: u32,

    /// Contact sheet thumbnail width in pixels.
    #[arg(long, default_value_t = 480)]
    thumbnail_width: u32,
}

#[derive(Parser, Debug)]
struct DetectArgs {
    /// Sequence pattern, same forms as `convert --in`.
    #[arg(long = "in")]
    in_pattern: String,

    /// Restrict to [start, end] before reporting.
    #[arg(long)]
    start: Option<i64>,
    #[arg(long)]
    end: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Convert(args) => cmd_convert(args),
        Command::Detect(args) => cmd_detect(args),
    }
}

fn parse_color_preset(name: &str) -> anyhow::Result<ColorPreset> {
    match name {
        "linear_to_srgb" => Ok(ColorPreset::LinearToSrgb),
        "linear_to_rec709" => Ok(ColorPreset::LinearToRec709),
        "srgb_to_linear" => Ok(ColorPreset::SrgbToLinear),
        "passthrough" => Ok(ColorPreset::Passthrough),
        "managed" => Ok(ColorPreset::Managed),
        other => anyhow::bail!(
            "unknown color preset '{other}' (expected linear_to_srgb, linear_to_rec709, \
             srgb_to_linear, passthrough or managed)"
        ),
    }
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let mut builder = ConversionJob::builder()
        .input_pattern(&args.in_pattern)
        .output_path(&args.out)
        .color_preset(parse_color_preset(&args.color)?)
        .codec(&args.codec)
        .quality(args.quality)
        .prefetch_workers(args.workers)
        .overwrite(args.overwrite);

    if let Some(fps) = args.fps {
        builder = builder.fps(fps);
    }
    if let Some(space) = args.input_colorspace {
        builder = builder.input_color_space(space);
    }
    if let Some(w) = args.width {
        builder = builder.width(w);
    }
    if let Some(h) = args.height {
        builder = builder.height(h);
    }
    if let Some(layer) = args.layer {
        builder = builder.layer(layer);
    }
    if let Some(start) = args.start {
        builder = builder.start_frame(start);
    }
    if let Some(end) = args.end {
        builder = builder.end_frame(end);
    }
    if let Some(path) = args.overlay {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read overlay spec '{}'", path.display()))?;
        let spec: OverlaySpec = serde_json::from_str(&text)
            .with_context(|| format!("parse overlay spec '{}'", path.display()))?;
        builder = builder.overlay(spec);
    }
    if args.contact_sheet {
        builder = builder.composite(CompositeSpec {
            columns: args.columns,
            thumbnail_width: args.thumbnail_width,
            ..CompositeSpec::default()
        });
    }

    let job = builder.build()?;
    let mut sink = reelforge::FfmpegSink::new(reelforge::FfmpegSinkOpts {
        out_path: job.output_path.clone(),
        codec: job.codec.clone(),
        quality: job.quality,
        overwrite: job.overwrite,
    });
    let mut converter = SequenceConverter::new(job);
    let summary = converter.run(&mut sink, |event| {
        if event.index == event.total || event.index.is_multiple_of(24) {
            eprintln!(
                "  frame {} ({}/{}, {:.0}%)",
                event.frame,
                event.index,
                event.total,
                event.percent()
            );
        }
        true
    })?;

    eprintln!(
        "wrote {} ({} frames, {} frozen)",
        summary.output_path.display(),
        summary.frames_written,
        summary.frames_frozen
    );
    Ok(())
}

fn cmd_detect(args: DetectArgs) -> anyhow::Result<()> {
    let sequence = detect_sequence(&args.in_pattern)?;
    let range = resolve_range(&sequence, args.start, args.end)?;

    let report = serde_json::json!({
        "directory": sequence.dir(),
        "padding": sequence.padding(),
        "first_frame": range.start,
        "last_frame": range.end,
        "frame_count": range.len(),
        "existing": range.existing.len(),
        "gaps": range.gap_count,
        "first_file": sequence.file_name(range.start),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
