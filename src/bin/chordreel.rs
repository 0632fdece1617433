use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use chordreel::{
    AssetCatalog, DirCatalog, FfmpegEngine, Manifest, PairerConfig, PipelineConfig,
    PipelineCoordinator, RangeOutcome, compile_to_manifest,
};

#[derive(Parser, Debug)]
#[command(name = "chordreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile decoded note signals into the render work manifest.
    Compile(CompileArgs),
    /// Check pitch coverage against a pack without writing anything.
    Check(CheckArgs),
    /// Render a compiled manifest to a video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input signal stream JSON (`[{state, note, channel, time}]`).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Pack directory of per-pitch clips.
    #[arg(long)]
    pack: PathBuf,

    /// Output directory for the manifest files.
    #[arg(long, default_value = "scripts")]
    scripts: PathBuf,

    /// Upper bound on the number of render batches.
    #[arg(long, default_value_t = 10)]
    batches: u32,

    /// Semitone shift to apply if the song misses the pack range.
    /// Derived automatically when omitted.
    #[arg(long, allow_hyphen_values = true)]
    transpose: Option<i32>,

    /// Minimum start time of the first note, in seconds. 0 disables the
    /// lead-in shift.
    #[arg(long, default_value_t = 2.0)]
    start_delay: f64,

    /// Channels to keep (all when omitted).
    #[arg(long, value_delimiter = ',')]
    channels: Option<Vec<u8>>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input signal stream JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Pack directory of per-pitch clips.
    #[arg(long)]
    pack: PathBuf,

    /// Semitone shift to validate instead of deriving one.
    #[arg(long, allow_hyphen_values = true)]
    transpose: Option<i32>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Directory holding a compiled manifest.
    #[arg(long, default_value = "scripts")]
    scripts: PathBuf,

    /// Pack directory of per-pitch clips.
    #[arg(long)]
    pack: PathBuf,

    /// Directory for intermediate block/segment artifacts.
    #[arg(long, default_value = "work")]
    work: PathBuf,

    /// Output video path.
    #[arg(long, default_value = "movie.mp4")]
    out: PathBuf,

    /// Worker pool width for the block stage.
    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Worker pool width for the segment stage (quarter of --concurrency
    /// when omitted).
    #[arg(long)]
    segment_concurrency: Option<usize>,

    /// Output canvas width.
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Output canvas height.
    #[arg(long, default_value_t = 1080)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Compile(args) => cmd_compile(args),
        Command::Check(args) => cmd_check(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load_signals(path: &PathBuf) -> anyhow::Result<Vec<chordreel::Signal>> {
    let body = std::fs::read(path)
        .with_context(|| format!("read signal stream '{}'", path.display()))?;
    serde_json::from_slice(&body)
        .with_context(|| format!("decode signal stream '{}'", path.display()))
}

fn cmd_compile(args: CompileArgs) -> anyhow::Result<()> {
    let signals = load_signals(&args.in_path)?;
    let catalog = DirCatalog::new(&args.pack);
    let pairer_cfg = PairerConfig {
        channels: args.channels,
        min_start_delay: (args.start_delay > 0.0).then_some(args.start_delay),
    };

    let (manifest, truncated) = compile_to_manifest(
        &signals,
        pairer_cfg,
        &catalog,
        args.transpose,
        args.batches,
        &args.scripts,
    )?;

    for press in &truncated {
        eprintln!(
            "warning: press of {} on channel {} at t={} has no release; note dropped",
            press.note, press.channel, press.time
        );
    }
    eprintln!(
        "compiled {} entries, {} blocks, {} batches into {}",
        manifest.script.len(),
        manifest.blocks.len(),
        manifest.batches.len(),
        args.scripts.display()
    );
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let signals = load_signals(&args.in_path)?;
    let catalog = DirCatalog::new(&args.pack);
    let pairer = chordreel::Pairer::new(PairerConfig::default());
    let mut events = pairer.pair(&signals)?.events;

    let available = catalog.available_pitches()?;
    match chordreel::resolve_range(&mut events, &available, args.transpose)? {
        RangeOutcome::Covered => eprintln!("pack covers the song; no transposition needed"),
        RangeOutcome::Transposed { shift } => {
            eprintln!("song fits after transposing by {shift} semitones")
        }
    }
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let manifest = Manifest::load(&args.scripts)?;
    let catalog = DirCatalog::new(&args.pack);
    let engine = FfmpegEngine::new(args.width, args.height)?;

    let mut cfg = PipelineConfig::new(&args.work, &args.out);
    cfg.block_concurrency = args.concurrency;
    cfg.segment_concurrency = args.segment_concurrency;

    let mut coordinator = PipelineCoordinator::new(cfg);
    coordinator.run(&manifest, &catalog, &engine)?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
