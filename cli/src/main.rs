use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadre_core::{
    control::ControlScript,
    detection::{ContourReacquirer, DEFAULT_THRESHOLD},
    framing::{
        compose, CinematicParams, FramingConfig, VerticalBias, DEFAULT_BIAS_SLIDER,
        DEFAULT_HEADROOM_RATIO, DEFAULT_MIN_SELECTION, DEFAULT_REF_WIDTH_RATIO,
        DEFAULT_THIRDS_RULE_RATIO,
    },
    geometry::Rect,
    pipeline::{run, Assistant},
    smoothing::DEFAULT_ALPHA,
    tracking::{
        template::{DEFAULT_LOSS_THRESHOLD, DEFAULT_SEARCH_RADIUS},
        TemplateTracker, TrackEvent, TrackingSession,
    },
    video::{FfmpegSource, FrameSource, RecordingSink},
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cadre",
    version,
    about = "Follow a selected subject and export a stabilised 16:9 crop",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a subject through a video and record the framed result.
    Run(RunArgs),

    /// Print the crop window for a subject box without touching any video.
    Compose {
        /// Frame size as WIDTHxHEIGHT
        #[arg(long, value_parser = parse_size)]
        frame: (u32, u32),

        /// Subject box x,y,w,h
        #[arg(long)]
        subject: Rect,

        #[command(flatten)]
        framing: FramingArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Input video path or URL
    #[arg(short, long)]
    input: PathBuf,

    /// Full frame with selection, subject and crop overlays
    #[arg(short, long, default_value = "annotated.mp4")]
    output: PathBuf,

    /// The crop window on its own
    #[arg(short, long, default_value = "crop.mp4")]
    crop_output: PathBuf,

    /// Operator event script (press/move/release/bias/quit per frame)
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Start tracking this region (x,y,w,h) on the first frame
    #[arg(long)]
    roi: Option<Rect>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Luma threshold for reacquiring a lost target
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    reacquire_threshold: u8,

    /// Tracker search radius in pixels
    #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS)]
    search_radius: i32,

    /// Mean luma difference at which the tracker gives up
    #[arg(long, default_value_t = DEFAULT_LOSS_THRESHOLD)]
    loss_threshold: f32,

    #[command(flatten)]
    framing: FramingArgs,
}

#[derive(Args)]
struct FramingArgs {
    /// Vertical bias slider position (0–100)
    #[arg(long, default_value_t = DEFAULT_BIAS_SLIDER, value_parser = clap::value_parser!(u8).range(0..=100))]
    bias: u8,

    /// Crop width as a fraction of frame width
    #[arg(long, default_value_t = DEFAULT_REF_WIDTH_RATIO)]
    ref_width_ratio: f64,

    /// Headroom above the subject, as a fraction of its height
    #[arg(long, default_value_t = DEFAULT_HEADROOM_RATIO)]
    headroom_ratio: f64,

    /// Rule-of-thirds line, as a fraction of subject height
    #[arg(long, default_value_t = DEFAULT_THIRDS_RULE_RATIO)]
    thirds_ratio: f64,

    /// Smoothing gain (0–1); smaller is steadier
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    alpha: f64,

    /// Minimum selection size in pixels (exclusive)
    #[arg(long, default_value_t = DEFAULT_MIN_SELECTION)]
    min_selection: i32,
}

impl FramingArgs {
    fn config(&self) -> FramingConfig {
        FramingConfig {
            params: CinematicParams {
                ref_width_ratio: self.ref_width_ratio,
                headroom_ratio: self.headroom_ratio,
                thirds_rule_ratio: self.thirds_ratio,
            },
            alpha: self.alpha,
            min_selection: self.min_selection,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Compose {
            frame,
            subject,
            framing,
        } => cmd_compose(frame, subject, framing),
    }
}

// ── run ───────────────────────────────────────────────────────────────────────

fn cmd_run(args: RunArgs) -> Result<()> {
    info!("cadre — interactive framing");
    info!("  input       : {}", args.input.display());
    info!("  annotated   : {}", args.output.display());
    info!("  crop        : {}", args.crop_output.display());

    if args.events.is_none() && args.roi.is_none() {
        tracing::warn!("no --events or --roi given; nothing will be tracked");
    }
    let mut controls = match &args.events {
        Some(path) => ControlScript::load(path)?,
        None => ControlScript::default(),
    };
    if let Some(roi) = args.roi {
        controls = controls.merge(ControlScript::select(roi, 0));
    }
    if let Some(limit) = args.max_frames {
        controls = controls.merge(ControlScript::quit_at(limit));
    }

    let mut source = FfmpegSource::open(&args.input)?;
    let total = match (args.max_frames, source.estimated_frames()) {
        (Some(limit), 0) => limit,
        (Some(limit), estimate) => limit.min(estimate),
        (None, estimate) => estimate,
    };
    let mut sink = RecordingSink::new(
        Some(args.output.clone()),
        Some(args.crop_output.clone()),
        source.frame_rate(),
    );

    let (search_radius, loss_threshold) = (args.search_radius, args.loss_threshold);
    let session = TrackingSession::new(
        move || TemplateTracker::new(search_radius, loss_threshold),
        ContourReacquirer::new(args.reacquire_threshold),
    );
    let mut assistant = Assistant::new(
        args.framing.config(),
        VerticalBias::from_slider(args.framing.bias),
        session,
    );

    let pb = progress(total);
    let summary = run(&mut assistant, &mut source, &mut sink, &mut controls, |report| {
        pb.inc(1);
        match (report.started, report.track) {
            (Some(roi), _) => pb.set_message(format!("tracking {roi}")),
            (_, TrackEvent::Reacquired(roi)) => pb.set_message(format!("reacquired {roi}")),
            (_, TrackEvent::Lost) => pb.set_message("target lost; searching…"),
            _ => {}
        }
    })
    .context("framing run failed")?;

    pb.finish_with_message("Done.");
    info!(
        frames = summary.frames,
        tracked = summary.tracked,
        reacquired = summary.reacquired,
        lost = summary.lost,
        sessions = summary.sessions_started,
        "summary"
    );
    Ok(())
}

// ── compose ───────────────────────────────────────────────────────────────────

fn cmd_compose(frame: (u32, u32), subject: Rect, framing: FramingArgs) -> Result<()> {
    let config = framing.config();
    config.output_size(frame.0, frame.1)?;
    let window = compose(
        frame.0,
        frame.1,
        subject,
        VerticalBias::from_slider(framing.bias),
        &config.params,
    );
    println!("{window}");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

fn progress(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} [{elapsed_precise}]",
            )
            .unwrap()
            .progress_chars("=> "),
        );
        pb
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {pos} frames {msg} [{elapsed_precise}]")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb
    };
    pb.set_message("waiting for selection");
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
