//! GreenAccess CLI - urban greenspace accessibility

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use greenaccess_algorithms::kernel::{decay_kernel, DecayFunction, DecayKernelParams};
use greenaccess_core::io::{read_geojson, read_geotiff, write_geotiff};
use greenaccess_core::Raster;
use greenaccess_model::{run, ModelArgs, ResolvedModel, SearchRadii};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "greenaccess")]
#[command(author, version, about = "Urban greenspace accessibility (2SFCA)", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the accessibility model
    Run {
        #[command(flatten)]
        model: ModelFlags,
    },
    /// Check model arguments without running
    Validate {
        #[command(flatten)]
        model: ModelFlags,
        /// Also read the inputs and resolve search radii
        #[arg(long)]
        inputs: bool,
    },
    /// Show information about a raster or GeoJSON file
    Info {
        /// Input file
        input: PathBuf,
    },
    /// Write a decay kernel as a GeoTIFF
    Kernel {
        /// Output file
        output: PathBuf,
        /// Radius in pixels
        #[arg(short, long)]
        radius: f64,
        /// Decay function: dichotomy, exponential, gaussian, density, power
        #[arg(short, long, default_value = "dichotomy")]
        function: String,
        /// Exponent for the power function (negative)
        #[arg(short, long, allow_hyphen_values = true)]
        beta: Option<f64>,
        /// Divide weights by their sum
        #[arg(short, long)]
        normalize: bool,
    },
}

/// Model arguments from a JSON file, flags, or both (flags win)
#[derive(Args)]
struct ModelFlags {
    /// JSON file with model arguments
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Workspace directory
    #[arg(short, long)]
    workspace: Option<PathBuf>,
    /// Suffix appended to output file names
    #[arg(long)]
    suffix: Option<String>,
    /// Worker threads: negative for sequential, 0 for all cores
    #[arg(long, allow_hyphen_values = true)]
    workers: Option<i64>,
    /// Land-use/land-cover raster
    #[arg(long)]
    lulc: Option<PathBuf>,
    /// LULC attribute table (CSV)
    #[arg(long)]
    lulc_table: Option<PathBuf>,
    /// Population raster
    #[arg(long)]
    population: Option<PathBuf>,
    /// Administrative units (GeoJSON)
    #[arg(long)]
    aoi: Option<PathBuf>,
    /// Greenspace demand in m² per capita
    #[arg(long)]
    demand: Option<f64>,
    /// Decay function: dichotomy, exponential, gaussian, density, power
    #[arg(long)]
    decay: Option<String>,
    /// Exponent for the power decay function
    #[arg(long, allow_hyphen_values = true)]
    beta: Option<f64>,
    /// radius_uniform, radius_per_greenspace_class or radius_per_pop_group
    #[arg(long)]
    mode: Option<String>,
    /// Search radius in metres for radius_uniform
    #[arg(long)]
    radius: Option<f64>,
    /// Population group radii table (CSV) for radius_per_pop_group
    #[arg(long)]
    radii_table: Option<PathBuf>,
    /// Report under/oversupplied population per group
    #[arg(long)]
    aggregate_by_pop_group: bool,
}

impl ModelFlags {
    fn into_args(self) -> Result<ModelArgs> {
        let mut args = match &self.config {
            Some(path) => ModelArgs::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ModelArgs {
                workspace_dir: required(self.workspace.clone(), "--workspace")?,
                results_suffix: String::new(),
                n_workers: None,
                lulc_raster_path: required(self.lulc.clone(), "--lulc")?,
                lulc_attribute_table: required(self.lulc_table.clone(), "--lulc-table")?,
                population_raster_path: required(self.population.clone(), "--population")?,
                aoi_vector_path: required(self.aoi.clone(), "--aoi")?,
                greenspace_demand: required(self.demand, "--demand")?,
                decay_function: "dichotomy".into(),
                decay_function_power_beta: None,
                search_radius_mode: "radius_uniform".into(),
                search_radius: None,
                population_group_radii_table: None,
                aggregate_by_pop_group: false,
            },
        };

        if let Some(v) = self.workspace {
            args.workspace_dir = v;
        }
        if let Some(v) = self.suffix {
            args.results_suffix = v;
        }
        if let Some(v) = self.workers {
            args.n_workers = Some(v);
        }
        if let Some(v) = self.lulc {
            args.lulc_raster_path = v;
        }
        if let Some(v) = self.lulc_table {
            args.lulc_attribute_table = v;
        }
        if let Some(v) = self.population {
            args.population_raster_path = v;
        }
        if let Some(v) = self.aoi {
            args.aoi_vector_path = v;
        }
        if let Some(v) = self.demand {
            args.greenspace_demand = v;
        }
        if let Some(v) = self.decay {
            args.decay_function = v;
        }
        if let Some(v) = self.beta {
            args.decay_function_power_beta = Some(v);
        }
        if let Some(v) = self.mode {
            args.search_radius_mode = v;
        }
        if let Some(v) = self.radius {
            args.search_radius = Some(v);
        }
        if let Some(v) = self.radii_table {
            args.population_group_radii_table = Some(v);
        }
        if self.aggregate_by_pop_group {
            args.aggregate_by_pop_group = true;
        }
        Ok(args)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    match value {
        Some(v) => Ok(v),
        None => bail!("{} is required when no --config is given", flag),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn describe_radii(radii: &SearchRadii) -> String {
    match radii {
        SearchRadii::Uniform(r) => format!("{} m", r),
        SearchRadii::PerGreenspaceClass(by_class) => by_class
            .iter()
            .map(|(code, r)| format!("lucode {}: {} m", code, r))
            .collect::<Vec<_>>()
            .join(", "),
        SearchRadii::PerPopulationGroup(by_group) => by_group
            .iter()
            .map(|(group, r)| format!("{}: {} m", group.field(), r))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn raster_info(input: &Path) -> Result<()> {
    let raster: Raster<f64> = read_geotiff(input).context("Failed to read raster")?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();
    let (w, h) = raster.pixel_size();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Pixel size: {} x {}", w, h);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!("  Sum: {:.4}", stats.sum);
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn vector_info(input: &Path) -> Result<()> {
    let layer = read_geojson(input).context("Failed to read GeoJSON")?;
    println!("File: {}", input.display());
    println!("Features: {}", layer.len());
    if let Some(crs) = &layer.crs {
        println!("CRS: {}", crs);
    }
    println!("Fields: {}", layer.fields.join(", "));
    let groups = layer.fields_with_prefix("pop_");
    if !groups.is_empty() {
        println!("Population groups: {}", groups.join(", "));
    }
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run { model } => {
            let args = model.into_args()?;
            let start = Instant::now();
            let pb = spinner("Running greenspace accessibility model...")?;
            let outcome = run(&args);
            pb.finish_and_clear();
            let outcome = outcome.context("Model run failed")?;
            let elapsed = start.elapsed();

            info!(
                "{} task(s) executed, {} up to date",
                outcome.report.executed.len(),
                outcome.report.skipped.len()
            );
            done("Greenspace supply", &outcome.supply, elapsed);
            println!("Administrative unit summary saved to: {}", outcome.summary.display());
        }

        Commands::Validate { model, inputs } => {
            let args = model.into_args()?;
            let validated = args.validate().context("Invalid model arguments")?;
            println!("Search radius mode: {}", validated.mode);
            println!("Decay function: {}", validated.decay);
            println!("Greenspace demand: {} m² per capita", validated.demand);
            println!("Processing: {:?}", validated.processing);

            if inputs {
                let resolved = ResolvedModel::resolve(&args).context("Invalid model inputs")?;
                println!("Search radii: {}", describe_radii(&resolved.radii));
                println!(
                    "Working pixel size: {} m",
                    resolved.pixel_size.0.abs()
                );
                println!("Administrative units: {}", resolved.units.layer.len());
                let groups: Vec<&str> = resolved.units.groups.iter().map(|g| g.name()).collect();
                if !groups.is_empty() {
                    println!("Population groups: {}", groups.join(", "));
                }
            }
            println!("Arguments are valid");
        }

        Commands::Info { input } => {
            let is_vector = input
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"));
            if is_vector {
                vector_info(&input)?;
            } else {
                raster_info(&input)?;
            }
        }

        Commands::Kernel {
            output,
            radius,
            function,
            beta,
            normalize,
        } => {
            let function = DecayFunction::parse(&function, beta).context("Invalid decay function")?;
            let start = Instant::now();
            let kernel = decay_kernel(&DecayKernelParams {
                function,
                radius,
                normalize,
            })
            .context("Failed to build kernel")?;
            let elapsed = start.elapsed();
            info!("{} kernel: {} x {}", function, kernel.rows(), kernel.cols());
            write_geotiff(&kernel, &output).context("Failed to write output")?;
            done("Kernel", &output, elapsed);
        }
    }

    Ok(())
}
