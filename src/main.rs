use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perch::{
    condition::{condition_scores, ConditionScale},
    constants::{BirdSet, DEFAULT_SAMPLE_SIZES},
    export,
    home_range::{area_table, reference_bandwidths, KernelParams},
    models::{habitat_comparisons, select_models},
    observations::{
        csv_reader::{read_condition_records, read_model_records, read_relocations, RelocationColumns},
        BirdSetExt,
    },
    projection::{project_relocations, UtmProjection},
    validation::{plateau_sample_size, summarize, SampleSizeValidation, ValidationParams},
};

#[derive(Parser)]
#[command(name = "perch", version)]
#[command(about = "Kernel home ranges, sample-size validation and territory statistics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-bird kernel home-range areas (and optional contour polygons)
    HomeRange {
        #[command(flatten)]
        input: RelocationInput,

        #[command(flatten)]
        kernel: KernelArgs,

        /// Contour levels in percent
        #[arg(long, value_delimiter = ',', default_values_t = [50.0, 75.0, 95.0])]
        percent: Vec<f64>,

        /// Area table output (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Write the contours as a GeoJSON FeatureCollection (longitude/latitude)
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Resample each bird's relocations to check that the home-range area plateaus
    Validate {
        #[command(flatten)]
        input: RelocationInput,

        #[command(flatten)]
        kernel: KernelArgs,

        /// Sample sizes to evaluate
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_SAMPLE_SIZES)]
        sizes: Vec<usize>,

        /// Trials per sample size
        #[arg(long, default_value_t = 100)]
        trials: usize,

        /// Contour level in percent
        #[arg(long, default_value_t = 95.0)]
        percent: f64,

        /// RNG seed; a random seed is drawn and logged when omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Relative tolerance used to report the plateau sample size
        #[arg(long, default_value_t = 0.05)]
        tolerance: f64,

        /// Trial ledger output (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Mean ± standard error per bird and sample size
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Scaled body-condition index
    Condition {
        csv: PathBuf,

        /// Regression scale: linear or log-log
        #[arg(long, default_value = "linear")]
        scale: String,

        #[arg(long, default_value_t = ',')]
        delimiter: char,

        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// AICc model selection and urban vs rural Welch tests
    Models {
        csv: PathBuf,

        #[arg(long, default_value_t = ',')]
        delimiter: char,

        /// Ranked model table output
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RelocationInput {
    /// Territory relocations (one row per GPS fix)
    csv: PathBuf,

    /// UTM definition, e.g. "+proj=utm +zone=17 +datum=WGS84 +units=m +no_defs"
    #[arg(long)]
    proj: String,

    #[arg(long, default_value = "bird_id")]
    id_column: String,

    #[arg(long, default_value = "longitude")]
    lon_column: String,

    #[arg(long, default_value = "latitude")]
    lat_column: String,

    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

#[derive(Args)]
struct KernelArgs {
    /// Density grid resolution (cells per side)
    #[arg(long, default_value_t = perch::constants::DEFAULT_GRID)]
    grid: usize,

    /// Grid margin as a fraction of the relocation range
    #[arg(long, default_value_t = perch::constants::DEFAULT_EXTENT)]
    extent: f64,
}

impl KernelArgs {
    fn params(&self) -> Result<KernelParams> {
        KernelParams::builder()
            .grid(self.grid)
            .extent(self.extent)
            .build()
            .context("kernel parameters")
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("delimiter '{c}' is not a single ASCII character"))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("perch=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// File when a path is given, stdout otherwise.
fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(export::create_file(p).context("output")?),
        None => Box::new(std::io::stdout().lock()),
    })
}

fn load_birds(input: &RelocationInput) -> Result<(UtmProjection, BirdSet)> {
    let projection: UtmProjection = input.proj.parse().context("projection")?;
    let columns = RelocationColumns {
        bird_id: input.id_column.clone(),
        longitude: input.lon_column.clone(),
        latitude: input.lat_column.clone(),
        timestamp: None,
    };
    let raw = read_relocations(&input.csv, &columns, delimiter_byte(input.delimiter)?)
        .with_context(|| format!("load: {}", input.csv.display()))?;

    let (observations, report) = project_relocations(&projection, &raw);
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), "relocations outside the projection domain");
    }
    let birds = BirdSet::from_observations(observations, None).context("grouping")?;
    match birds.relocation_count_stats() {
        Some(stats) => info!(%projection, "{stats}"),
        None => anyhow::bail!("load: no relocation could be projected"),
    }
    Ok((projection, birds))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::HomeRange {
            input,
            kernel,
            percent,
            out,
            geojson,
        } => {
            let params = kernel.params()?;
            let (projection, birds) = load_birds(&input)?;

            let (rows, estimates, failures) = area_table(&birds, &percent, &params);
            for (bird, err) in &failures {
                warn!(%bird, "no home range: {err}");
            }
            export::write_area_table_csv(output(out.as_deref())?, &rows).context("area table")?;

            if let Some(path) = geojson {
                let fc = export::contours_to_geojson(&estimates, Some(&projection))
                    .context("contours")?;
                export::write_geojson(export::create_file(&path)?, &fc).context("geojson")?;
                info!(path = %path.display(), "contours written");
            }
        }

        Commands::Validate {
            input,
            kernel,
            sizes,
            trials,
            percent,
            seed,
            tolerance,
            out,
            summary,
        } => {
            let params = ValidationParams::builder()
                .sample_sizes(sizes)
                .trials(trials)
                .percent(percent)
                .kernel(kernel.params()?)
                .build()
                .context("validation parameters")?;
            let (_, birds) = load_birds(&input)?;

            let seed = seed.unwrap_or_else(rand::random);
            info!(seed, %params, "validation");
            let mut rng = StdRng::seed_from_u64(seed);

            let (bandwidths, no_bandwidth) = reference_bandwidths(&birds, &params.kernel);
            for (bird, err) in &no_bandwidth {
                warn!(%bird, "excluded from validation: {err}");
            }

            let outcome = birds.validate_sample_sizes(&bandwidths, &mut rng, &params);
            for (bird, err) in &outcome.failed_birds {
                warn!(%bird, "{err}");
            }
            export::write_trials_csv(output(out.as_deref())?, &outcome.ledger)
                .context("trial ledger")?;

            let rows = summarize(&outcome.ledger);
            for (bird, n) in plateau_sample_size(&rows, tolerance) {
                match n {
                    Some(n) => info!(%bird, n, "area within {:.0}% of the largest sample", tolerance * 100.0),
                    None => warn!(%bird, "no plateau estimate"),
                }
            }
            if let Some(path) = summary {
                export::write_summary_csv(export::create_file(&path)?, &rows).context("summary")?;
            }
        }

        Commands::Condition {
            csv,
            scale,
            delimiter,
            out,
        } => {
            let scale: ConditionScale = scale.parse().context("condition scale")?;
            let records = read_condition_records(&csv, delimiter_byte(delimiter)?)
                .with_context(|| format!("load: {}", csv.display()))?;
            let (smi, scores) = condition_scores(&records, scale).context("condition index")?;
            info!(
                exponent = smi.exponent,
                mean_wing_length = smi.mean_wing_length,
                n = smi.n,
                "scaled mass index"
            );
            export::write_condition_csv(output(out.as_deref())?, &scores)
                .context("condition output")?;
        }

        Commands::Models {
            csv,
            delimiter,
            out,
        } => {
            let records = read_model_records(&csv, delimiter_byte(delimiter)?)
                .with_context(|| format!("load: {}", csv.display()))?;
            let selection = select_models(&records).context("model selection")?;

            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{selection}")?;
            if let Some(best) = selection.best() {
                write!(stdout, "\n{best}")?;
            }
            match habitat_comparisons(&records) {
                Ok(c) => {
                    writeln!(
                        stdout,
                        "\nurban vs rural comm_distance: t={:.3} df={:.2} p={:.4}",
                        c.comm_distance.t, c.comm_distance.df, c.comm_distance.p_value
                    )?;
                    writeln!(
                        stdout,
                        "urban vs rural sqrt(area_75): t={:.3} df={:.2} p={:.4}",
                        c.sqrt_area.t, c.sqrt_area.df, c.sqrt_area.p_value
                    )?;
                }
                Err(err) => warn!("habitat comparisons skipped: {err}"),
            }

            if let Some(path) = out {
                export::write_model_table_csv(export::create_file(&path)?, &selection)
                    .context("model table")?;
            }
        }
    }
    Ok(())
}
