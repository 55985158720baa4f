//! qrstamp CLI - stamp a QR code onto a 3D model
//!
//! Loads a base mesh, engraves or embosses an encoded payload and writes the
//! result as 3MF, STL or OBJ.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use qrstamp::config::MergePolicy;
use qrstamp::{
    encode, tracking_url, AlgorithmKind, CombineOutcome, ErrorLevel, Face, FootprintKind,
    OutputMode, Pipeline, RunJournal, StampConfig, StampError, StampMode,
};
use qrstamp_mesh::io::{load_solid, save_parts, save_solid};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qrstamp")]
#[command(about = "Engrave or emboss QR codes on 3D-printable models", long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stamp a payload onto a base model
    Stamp(StampArgs),
    /// Print mesh statistics for a model
    Info {
        /// Model file (.stl, .obj, .3mf)
        file: PathBuf,
    },
    /// Print the module grid for a payload
    Encode {
        /// Text to encode
        payload: String,
        /// Error correction level (L, M, Q, H)
        #[arg(short, long)]
        level: Option<ErrorLevel>,
    },
}

#[derive(clap::Args)]
struct StampArgs {
    /// Base model (.stl, .obj, .3mf)
    base: PathBuf,
    /// Output file; the extension selects the format
    output: PathBuf,
    /// Text to encode (defaults to a tracking URL built from --id)
    #[arg(short, long, conflicts_with = "id")]
    payload: Option<String>,
    /// Identifier appended to --base-url as `?id=`
    #[arg(long)]
    id: Option<String>,
    /// Base URL for --id
    #[arg(long, default_value = "https://example.com/k")]
    base_url: String,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Stamp side in mm
    #[arg(long)]
    size: Option<f64>,
    /// Engrave depth or emboss height in mm
    #[arg(long)]
    depth: Option<f64>,
    /// Clearance from the footprint edge in mm
    #[arg(long)]
    margin: Option<f64>,
    /// Error correction level (L, M, Q, H)
    #[arg(long)]
    level: Option<ErrorLevel>,
    /// Engrave or emboss
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Stamp the bottom face
    #[arg(long)]
    flip: bool,
    /// Rotate the code 180° about the face normal
    #[arg(long)]
    rotate_180: bool,
    /// Footprint model
    #[arg(long, value_enum)]
    footprint: Option<FootprintArg>,
    /// Stamp geometry strategy
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,
    /// Write base and stamp as separate objects instead of combining
    #[arg(long)]
    separate: bool,
    /// Use only the first part of a multi-part input
    #[arg(long)]
    first_part: bool,
    /// Write intermediate meshes, the run log and a JSON report here
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Engrave,
    Emboss,
}

#[derive(Clone, Copy, ValueEnum)]
enum FootprintArg {
    Box,
    Circle,
    Section,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Box,
    Contour,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Stamp(args) => stamp(args)?,
        Commands::Info { file } => show_info(&file)?,
        Commands::Encode { payload, level } => {
            let mut options = StampConfig::default().encode;
            if let Some(level) = level {
                options.level = level;
            }
            let grid = encode(&payload, &options)?;
            print!("{grid}");
            println!(
                "{}x{} modules, {} active",
                grid.cols(),
                grid.rows(),
                grid.active_count()
            );
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Apply command-line overrides on top of the file (or default) config.
fn build_config(args: &StampArgs) -> Result<StampConfig> {
    let mut config = match &args.config {
        Some(path) => StampConfig::load(path)?,
        None => StampConfig::default(),
    };
    let s = &mut config.stamp;
    if let Some(v) = args.size {
        s.target_size_mm = v;
    }
    if let Some(v) = args.depth {
        s.depth_mm = v;
    }
    if let Some(v) = args.margin {
        s.margin_mm = v;
    }
    if let Some(m) = args.mode {
        s.mode = match m {
            ModeArg::Engrave => StampMode::Engrave,
            ModeArg::Emboss => StampMode::Emboss,
        };
    }
    if args.flip {
        s.face = Face::Bottom;
    }
    if args.rotate_180 {
        s.rotation_180 = true;
    }
    if let Some(a) = args.algorithm {
        s.algorithm = match a {
            AlgorithmArg::Box => AlgorithmKind::Box,
            AlgorithmArg::Contour => AlgorithmKind::Contour,
        };
    }
    if let Some(f) = args.footprint {
        config.footprint.kind = match f {
            FootprintArg::Box => FootprintKind::Box,
            FootprintArg::Circle => FootprintKind::Circle,
            FootprintArg::Section => FootprintKind::Section,
        };
    }
    if let Some(level) = args.level {
        config.encode.level = level;
    }
    if args.separate {
        config.output.mode = OutputMode::Separate;
    }
    if args.first_part {
        config.output.part_merge = MergePolicy::First;
    }
    config.validate()?;
    Ok(config)
}

fn stamp(args: StampArgs) -> Result<()> {
    let config = build_config(&args)?;
    let payload = match (&args.payload, &args.id) {
        (Some(p), _) => p.clone(),
        (None, Some(id)) => tracking_url(&args.base_url, id),
        (None, None) => anyhow::bail!("either --payload or --id is required"),
    };

    let base = load_solid(&args.base, config.output.part_merge.into())
        .with_context(|| format!("loading {}", args.base.display()))?;
    info!(
        triangles = base.triangle_count(),
        "loaded {}",
        args.base.display()
    );

    let output = match &config.output.format {
        Some(ext) => args.output.with_extension(ext),
        None => args.output.clone(),
    };

    let pipeline = Pipeline::new(config)?;
    let mut journal = RunJournal::new();
    let result = pipeline.run(&payload, base.clone(), &mut journal);

    if let Some(dir) = &args.debug_dir {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("log.txt"), journal.to_text())?;
    }
    let run = match result {
        Ok(run) => run,
        Err(e) if passes_base_through(&e) => {
            let written = save_solid(&base, &output)?;
            warn!("{e}; wrote the base unmodified to {}", written.display());
            println!("no stamp applied ({e}) -> {}", written.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(dir) = &args.debug_dir {
        write_debug(dir, &run, &journal)?;
    }

    let written = save_parts(&run.parts(), &output)?;
    match &run.outcome {
        Some(CombineOutcome::Failed) => warn!(
            "combination failed, wrote the base unmodified to {}",
            written.display()
        ),
        _ => info!("wrote {}", written.display()),
    }
    println!(
        "{} modules at {:.3} mm ({:.2} mm square) -> {}",
        run.placement.grid.active_count(),
        run.placement.spec.module_size_mm,
        run.placement.extent(),
        written.display()
    );
    Ok(())
}

/// Errors after which the loaded base is still written out. Encode errors
/// and timeouts produce no output.
fn passes_base_through(e: &StampError) -> bool {
    matches!(e, StampError::Geometry(_) | StampError::NoOverlap(_))
}

fn write_debug(dir: &Path, run: &qrstamp::StampRun, journal: &RunJournal) -> Result<()> {
    save_solid(&run.base, &dir.join("base.stl"))?;
    if !run.stamp.is_empty() {
        save_solid(&run.stamp, &dir.join("stamp.stl"))?;
    }
    let report = serde_json::to_string_pretty(&run.report(journal))?;
    fs::write(dir.join("report.json"), report)?;
    fs::write(dir.join("log.txt"), journal.to_text())?;
    Ok(())
}

fn show_info(file: &Path) -> Result<()> {
    let solid = load_solid(file, Default::default())
        .with_context(|| format!("loading {}", file.display()))?;
    let b = solid.bounds();
    let e = b.extent();

    println!("{}", file.display());
    println!("  Vertices: {}", solid.vertex_count());
    println!("  Triangles: {}", solid.triangle_count());
    println!(
        "  Bounds: ({:.3}, {:.3}, {:.3}) .. ({:.3}, {:.3}, {:.3})",
        b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z
    );
    println!("  Size: {:.3} x {:.3} x {:.3} mm", e.x, e.y, e.z);
    println!("  Volume: {:.3} mm³", solid.volume());
    println!("  Watertight: {}", solid.is_watertight());
    Ok(())
}
