use std::{collections::HashMap, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use ffmpeg_next::{
    Rational,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use stillframe::{
    CachedFrameSource, Command, DecodedFrames, FfmpegCatalog, FfmpegLogLevel, MediaCodecCatalog,
    SnapshotEncoder, SnapshotOptions, WatermarkOptions,
};

const CLI_AFTER_HELP: &str = "Examples:\n  stillframe snapshot input.mp4 --directory shots --at 0 --at 120:middle.png\n  stillframe watermark logo.png --rate 10 --frames 3 --json\n  stillframe watermark logo.png --frames 50 --swap 25:other.png\n  stillframe completions zsh > _stillframe";

#[derive(Debug, Parser)]
#[command(
    name = "stillframe",
    version,
    about = "Drive the snapshot and watermark nodes against real media files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Print every frame event, not just results.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Push a video through a snapshot node, arming it at chosen frames.
    #[command(
        about = "Capture snapshots from a video",
        after_help = "Examples:\n  stillframe snapshot input.mp4 --at 0\n  stillframe snapshot input.mp4 --directory shots --at 10:a.png --at 20:b.jpg --progress"
    )]
    Snapshot {
        /// Input video path.
        input: PathBuf,
        /// Directory snapshots are written into.
        #[arg(long, default_value = stillframe::config::DEFAULT_SNAPSHOT_DIRECTORY)]
        directory: PathBuf,
        /// Initial snapshot file name.
        #[arg(long, default_value = stillframe::config::DEFAULT_SNAPSHOT_FILENAME)]
        filename: String,
        /// Arm before frame FRAME, optionally renaming the snapshot (FRAME[:FILENAME]).
        #[arg(long = "at", value_parser = parse_arm_request)]
        arms: Vec<(u64, Option<String>)>,
        /// Show a progress spinner.
        #[arg(long)]
        progress: bool,
    },

    /// Pull frames from a watermark source.
    #[command(
        about = "Serve a cached watermark frame",
        after_help = "Examples:\n  stillframe watermark logo.png --rate 30000/1001 --frames 10\n  stillframe watermark logo.png --swap 5:other.png --json"
    )]
    Watermark {
        /// Watermark media file.
        input: PathBuf,
        /// Synthetic frame rate (25, 30000/1001, 29.97, ntsc, ...).
        #[arg(long, short = 'r', value_parser = parse_rate_arg, default_value = "25")]
        rate: Rational,
        /// Number of frames to pull.
        #[arg(long, default_value_t = 5)]
        frames: u64,
        /// Swap the backing file before pull FRAME (FRAME:PATH).
        #[arg(long = "swap", value_parser = parse_swap_request)]
        swaps: Vec<(u64, PathBuf)>,
        /// Output parameters and timestamps as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_arm_request(value: &str) -> Result<(u64, Option<String>), String> {
    let (frame, filename) = match value.split_once(':') {
        Some((frame, filename)) if !filename.is_empty() => (frame, Some(filename.to_string())),
        Some((frame, _)) => (frame, None),
        None => (value, None),
    };
    let frame = frame
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid frame index in {value:?}"))?;
    Ok((frame, filename))
}

fn parse_swap_request(value: &str) -> Result<(u64, PathBuf), String> {
    let (frame, path) = value
        .split_once(':')
        .ok_or_else(|| format!("expected FRAME:PATH, got {value:?}"))?;
    let frame = frame
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid frame index in {value:?}"))?;
    Ok((frame, PathBuf::from(path)))
}

fn parse_rate_arg(value: &str) -> Result<Rational, String> {
    stillframe::parse_frame_rate(value).map_err(|error| error.to_string())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level.parse()?;
        stillframe::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

/// Converts frames into the pixel format the armed encoder expects.
///
/// Format negotiation is the host's job; the snapshot node never converts.
#[derive(Default)]
struct FrameConverter {
    scaler: Option<(ScalingContext, Pixel, Pixel, u32, u32)>,
}

impl FrameConverter {
    fn convert(
        &mut self,
        frame: &VideoFrame,
        target: Pixel,
    ) -> Result<VideoFrame, Box<dyn std::error::Error>> {
        if frame.format() == target {
            return Ok(frame.clone());
        }

        let key = (frame.format(), target, frame.width(), frame.height());
        let stale = self
            .scaler
            .as_ref()
            .is_none_or(|(_, from, to, width, height)| (*from, *to, *width, *height) != key);
        if stale {
            let scaler = ScalingContext::get(
                frame.format(),
                frame.width(),
                frame.height(),
                target,
                frame.width(),
                frame.height(),
                ScalingFlags::BILINEAR,
            )?;
            self.scaler = Some((scaler, key.0, key.1, key.2, key.3));
        }

        let mut converted = VideoFrame::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler.run(frame, &mut converted)?;
        }
        converted.set_pts(frame.pts());
        Ok(converted)
    }
}

fn run_snapshot(
    global: &GlobalOptions,
    input: PathBuf,
    options: SnapshotOptions,
    arms: Vec<(u64, Option<String>)>,
    progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = FfmpegCatalog::new();
    let mut schedule: HashMap<u64, Vec<Option<String>>> = HashMap::new();
    for (frame, filename) in arms {
        schedule.entry(frame).or_default().push(filename);
    }

    let mut lease = catalog.open_decoder(&input)?;
    let mut snapshot = SnapshotEncoder::new(catalog, options);
    let mut converter = FrameConverter::default();

    let spinner = progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {pos} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar
    });

    let mut saved = 0usize;
    let mut failed = 0usize;
    for (index, decoded) in DecodedFrames::new(&mut lease).enumerate() {
        let decoded = decoded?;
        let index = index as u64;

        for filename in schedule.remove(&index).unwrap_or_default() {
            match filename {
                Some(filename) => snapshot.process_command(Command::parse("filename", &filename)?),
                None => snapshot.arm(None),
            }
        }

        let frame = if snapshot.is_armed() {
            let target = catalog.encoder_pixel_format(snapshot.options().target_path());
            match target {
                Ok(pixel) => converter.convert(&decoded, pixel)?,
                Err(_) => decoded,
            }
        } else {
            decoded
        };

        let was_armed = snapshot.is_armed();
        let frame = snapshot.on_frame(frame);
        if global.verbose {
            println!("frame {index}: {}x{} pts={:?}", frame.width(), frame.height(), frame.pts());
        }

        if was_armed {
            match snapshot.last_outcome() {
                Some(Ok(path)) => {
                    saved += 1;
                    println!("{} {} (frame {index})", "saved".green().bold(), path.display());
                }
                Some(Err(error)) => {
                    failed += 1;
                    eprintln!("{} frame {index}: {error}", "failed".red().bold());
                }
                None => {}
            }
        }

        if let Some(bar) = &spinner {
            bar.inc(1);
        }
    }

    if let Some(bar) = spinner {
        bar.finish_with_message("done");
    }
    if !schedule.is_empty() {
        let mut missed: Vec<u64> = schedule.into_keys().collect();
        missed.sort_unstable();
        eprintln!(
            "{} input ended before frames {missed:?}",
            "warning:".yellow().bold()
        );
    }
    println!("{saved} saved, {failed} failed");
    Ok(())
}

fn run_watermark(
    input: PathBuf,
    rate: Rational,
    frames: u64,
    swaps: Vec<(u64, PathBuf)>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = WatermarkOptions::new(&input).rate(rate);
    let mut source = CachedFrameSource::open(FfmpegCatalog::new(), options)?;
    let parameters = source.negotiate_output()?;

    let mut timestamps = Vec::new();
    for pull in 0..frames {
        for (_, path) in swaps.iter().filter(|(at, _)| *at == pull) {
            if let Err(error) = source.process_command(Command::Filename(path.display().to_string()))
            {
                eprintln!("{} swap to {}: {error}", "failed".red().bold(), path.display());
            } else if !json_output {
                println!("{} {}", "swapped".cyan().bold(), path.display());
            }
        }
        let pts = source.produce_next().and_then(|frame| frame.pts());
        if !json_output {
            match pts {
                Some(pts) => println!("pull {pull}: pts={pts}"),
                None => println!("pull {pull}: {}", "no frame".dimmed()),
            }
        }
        timestamps.push(pts);
    }

    if json_output {
        let payload = json!({
            "width": parameters.width,
            "height": parameters.height,
            "sample_aspect_ratio": parameters.sample_aspect_ratio.to_string(),
            "frame_rate": parameters.frame_rate.to_string(),
            "time_base": parameters.time_base.to_string(),
            "pixel_format": format!("{:?}", parameters.pixel_format),
            "timestamps": timestamps,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Output: {}x{} sar={} rate={} time_base={} format={:?}",
            parameters.width,
            parameters.height,
            parameters.sample_aspect_ratio,
            parameters.frame_rate,
            parameters.time_base,
            parameters.pixel_format,
        );
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Snapshot {
            input,
            directory,
            filename,
            arms,
            progress,
        } => {
            let options = SnapshotOptions::default()
                .directory(directory)
                .filename(filename);
            run_snapshot(&cli.global, input, options, arms, progress)?;
        }
        Commands::Watermark {
            input,
            rate,
            frames,
            swaps,
            json,
        } => run_watermark(input, rate, frames, swaps, json)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "stillframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
