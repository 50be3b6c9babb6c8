//! cytoquant CLI — command-line interface for the quantification pipeline.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use cytoquant_core::{
    pipeline, Calibration, PipelineConfig, PipelineOutput, Plane, PlaneStack, SliceSelection,
    ThresholdMethod,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cytoquant")]
#[command(about = "Segment and quantify labeled objects in multi-channel fluorescence stacks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Quantify one volume given as an ordered list of plane images.
    Measure(MeasureArgs),

    /// Quantify every image of a directory as a single-plane volume.
    Batch(BatchArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ThresholdMethodArg {
    Huang,
    Otsu,
}

impl ThresholdMethodArg {
    fn to_core(self) -> ThresholdMethod {
        match self {
            Self::Huang => ThresholdMethod::Huang,
            Self::Otsu => ThresholdMethod::Otsu,
        }
    }
}

/// Pipeline parameters shared by both subcommands.
#[derive(Debug, Clone, Args)]
struct PipelineArgs {
    /// Minimum accepted object area, physical units.
    #[arg(long, default_value = "8.0")]
    min_area: f64,

    /// Maximum accepted object area, physical units.
    #[arg(long, default_value = "300.0")]
    max_area: f64,

    /// Band-pass base scale, physical units.
    #[arg(long, default_value = "2.5")]
    sigma: f64,

    /// Ratio of the wide to the narrow band-pass scale.
    #[arg(long, default_value = "1.4")]
    scale_ratio: f64,

    /// Histogram thresholding method.
    #[arg(long, value_enum, default_value_t = ThresholdMethodArg::Huang)]
    threshold: ThresholdMethodArg,

    /// Process only this 1-based slice instead of the whole stack.
    #[arg(long)]
    slice: Option<usize>,

    /// Segment the union of --fuse-channels instead of a single channel.
    #[arg(long)]
    fuse: bool,

    /// Channels contributing to the fused mask (1-based). Defaults to all
    /// channels of the volume.
    #[arg(long, value_delimiter = ',')]
    fuse_channels: Vec<usize>,

    /// Channel to segment in single-channel mode (1-based). Defaults to the
    /// last channel of the volume.
    #[arg(long)]
    channel: Option<usize>,

    /// Watershed merge tolerance on the distance map.
    #[arg(long, default_value = "0.5")]
    tolerance: f32,

    /// Directory to write 16-bit label mask PNGs into, one per slice.
    #[arg(long)]
    label_mask_dir: Option<PathBuf>,
}

impl PipelineArgs {
    fn to_config(&self, n_channels: usize) -> PipelineConfig {
        PipelineConfig {
            min_area: self.min_area,
            max_area: self.max_area,
            sigma: self.sigma,
            scale_ratio: self.scale_ratio,
            threshold_method: self.threshold.to_core(),
            slices: match self.slice {
                Some(z) => SliceSelection::Single(z),
                None => SliceSelection::All,
            },
            fuse_channels: self.fuse,
            fusion_channels: if self.fuse_channels.is_empty() {
                (1..=n_channels).collect()
            } else {
                self.fuse_channels.clone()
            },
            designated_channel: self.channel.unwrap_or(n_channels),
            watershed_tolerance: self.tolerance,
            build_label_mask: self.label_mask_dir.is_some(),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Plane image, repeatable; ordered channel-major (c1z1, c2z1, ..., c1z2).
    #[arg(long = "plane", required = true)]
    planes: Vec<PathBuf>,

    /// Number of channels per slice.
    #[arg(long, default_value = "1")]
    channels: usize,

    /// Number of z-slices.
    #[arg(long, default_value = "1")]
    slices: usize,

    /// Physical width of one pixel.
    #[arg(long, default_value = "1.0")]
    pixel_width: f64,

    /// Physical height of one pixel.
    #[arg(long, default_value = "1.0")]
    pixel_height: f64,

    /// Title reported in the Image column. Defaults to the first plane's
    /// file stem.
    #[arg(long)]
    title: Option<String>,

    /// Path to write the result table (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Optional path to also write the result table as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Debug, Clone, Args)]
struct BatchArgs {
    /// Directory of input images.
    #[arg(long)]
    dir: PathBuf,

    /// Image file extension to pick up.
    #[arg(long, default_value = "tif")]
    ext: String,

    /// Physical width of one pixel.
    #[arg(long, default_value = "1.0")]
    pixel_width: f64,

    /// Physical height of one pixel.
    #[arg(long, default_value = "1.0")]
    pixel_height: f64,

    /// Directory to write one JSON result per input image into.
    #[arg(long)]
    out_dir: PathBuf,

    /// Optional path for a combined CSV over all inputs.
    #[arg(long)]
    csv: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Measure(args) => run_measure(&args),
        Commands::Batch(args) => run_batch(&args),
    }
}

/// Load one image file as an f32 intensity plane (16-bit samples widened).
fn load_plane(path: &Path) -> CliResult<Plane> {
    let img = image::open(path)
        .map_err(|e| -> CliError { format!("failed to open {}: {}", path.display(), e).into() })?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let mut plane = Plane::new(w, h);
    for (dst, src) in plane.pixels_mut().zip(gray.pixels()) {
        *dst = image::Luma([src[0] as f32]);
    }
    Ok(plane)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_outputs(
    out: &PipelineOutput,
    json_path: &Path,
    csv_path: Option<&Path>,
    label_mask_dir: Option<&Path>,
) -> CliResult<()> {
    let json = serde_json::to_string_pretty(&out.rows)?;
    std::fs::write(json_path, &json)?;
    tracing::info!("Results written to {}", json_path.display());

    if let Some(csv_path) = csv_path {
        std::fs::write(csv_path, render_csv(out))?;
        tracing::info!("CSV written to {}", csv_path.display());
    }

    if let Some(dir) = label_mask_dir {
        std::fs::create_dir_all(dir)?;
        for report in &out.slices {
            if let Some(ref label) = report.label_mask {
                let path = dir.join(format!("labels_z{:03}.png", report.z));
                image::DynamicImage::ImageLuma16(label.clone()).save(&path)?;
                tracing::info!("Label mask written to {}", path.display());
            }
        }
    }
    Ok(())
}

fn render_csv(out: &PipelineOutput) -> String {
    let mut csv = out.columns.join(",");
    csv.push('\n');
    for row in &out.rows {
        csv.push_str(&row.record().join(","));
        csv.push('\n');
    }
    csv
}

// ── measure ───────────────────────────────────────────────────────────

fn run_measure(args: &MeasureArgs) -> CliResult<()> {
    let expected = args.channels * args.slices;
    if args.planes.len() != expected {
        return Err(format!(
            "expected {} planes ({} channels x {} slices), got {}",
            expected,
            args.channels,
            args.slices,
            args.planes.len()
        )
        .into());
    }

    let mut planes = Vec::with_capacity(args.planes.len());
    for path in &args.planes {
        tracing::info!("Loading plane: {}", path.display());
        planes.push(load_plane(path)?);
    }

    let title = args
        .title
        .clone()
        .unwrap_or_else(|| file_stem(&args.planes[0]));
    let calibration = Calibration {
        pixel_width: args.pixel_width,
        pixel_height: args.pixel_height,
    };
    let volume = PlaneStack::new(title, args.channels, args.slices, calibration, planes)?;

    let config = args.pipeline.to_config(args.channels);
    let out = pipeline::run(&volume, &config)?;

    let accepted: usize = out.slices.iter().map(|s| s.accepted.len()).sum();
    let rejected: usize = out.slices.iter().map(|s| s.rejected.len()).sum();
    tracing::info!("Accepted {} objects ({} rejected by area band)", accepted, rejected);
    for report in &out.slices {
        if let Some(ref err) = report.error {
            tracing::warn!("Slice {} failed: {}", report.z, err);
        }
    }

    write_outputs(
        &out,
        &args.out,
        args.csv.as_deref(),
        args.pipeline.label_mask_dir.as_deref(),
    )
}

// ── batch ─────────────────────────────────────────────────────────────

fn run_batch(args: &BatchArgs) -> CliResult<()> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(&args.dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case(args.ext.as_str()))
                .unwrap_or(false)
        })
        .collect();
    inputs.sort();
    if inputs.is_empty() {
        return Err(format!(
            "no .{} files found in {}",
            args.ext,
            args.dir.display()
        )
        .into());
    }
    tracing::info!("Batch of {} images from {}", inputs.len(), args.dir.display());

    std::fs::create_dir_all(&args.out_dir)?;
    let calibration = Calibration {
        pixel_width: args.pixel_width,
        pixel_height: args.pixel_height,
    };
    let config = args.pipeline.to_config(1);

    let mut combined_csv: Option<String> = None;
    let mut n_failed = 0usize;
    for path in &inputs {
        let stem = file_stem(path);
        let result = load_plane(path).and_then(|plane| {
            let volume = PlaneStack::from_single_plane(stem.clone(), calibration, plane);
            pipeline::run(&volume, &config).map_err(CliError::from)
        });
        let out = match result {
            Ok(out) => out,
            Err(err) => {
                // One bad file does not abort the batch.
                tracing::warn!("Skipping {}: {}", path.display(), err);
                n_failed += 1;
                continue;
            }
        };

        let json_path = args.out_dir.join(format!("{}.json", stem));
        let label_dir = args
            .pipeline
            .label_mask_dir
            .as_ref()
            .map(|d| d.join(&stem));
        write_outputs(&out, &json_path, None, label_dir.as_deref())?;

        if args.csv.is_some() {
            let csv = combined_csv.get_or_insert_with(|| {
                let mut header = out.columns.join(",");
                header.push('\n');
                header
            });
            for row in &out.rows {
                csv.push_str(&row.record().join(","));
                csv.push('\n');
            }
        }
    }

    if let (Some(csv_path), Some(csv)) = (args.csv.as_ref(), combined_csv) {
        std::fs::write(csv_path, csv)?;
        tracing::info!("Combined CSV written to {}", csv_path.display());
    }
    if n_failed > 0 {
        tracing::warn!("{} of {} images failed", n_failed, inputs.len());
    }
    Ok(())
}
