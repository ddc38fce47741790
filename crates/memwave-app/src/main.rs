//! memwave command-line driver
//!
//! Runs one analysis per subject from JSON inputs and writes JSON results.
//! A subject that fails is logged and reported in the output; the remaining
//! subjects still run.
//!
//! # Usage
//!
//! ```bash
//! # Classify every subject in a feature file, caching results
//! memwave classify --features features.json --config classify.json --cache cache/
//!
//! # Oscillation clusters from mean power spectra
//! memwave cluster --spectra spectra.json --out clusters.json
//!
//! # Traveling-wave fits for cluster phases
//! memwave waves --phases phases.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use memwave_core::config::{ClassifierConfig, ClusterConfig, WaveConfig};
use memwave_core::error::ErrorKind;
use memwave_core::types::{Electrode, EventTable};
use memwave_native::cache::ResultCache;
use memwave_native::cluster::{BackgroundPeakDetector, ClusterExtractor, ClusterMap, PeakDetector};
use memwave_native::pipeline::{ClassifierAnalysis, SubjectPipeline};
use memwave_native::provider::{FeatureRequest, InMemoryProvider};
use memwave_native::wave::{subsequent_memory_effect, ClusterWaves, WaveFitter};

/// memwave analyses
#[derive(Parser, Debug)]
#[command(name = "memwave")]
#[command(author, version, about = "Intracranial EEG memory analyses", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify recalled vs not-recalled events per subject
    Classify {
        /// JSON object mapping subject id to feature set
        #[arg(long)]
        features: PathBuf,

        /// Classifier settings (JSON); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Result cache directory
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,

        /// Only these subjects
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Drop abridged sessions and a poorly performing first session
        #[arg(long)]
        exclusions: bool,
    },

    /// Find oscillation clusters from mean power spectra
    Cluster {
        /// JSON list of per-subject spectra
        #[arg(long)]
        spectra: PathBuf,

        /// Cluster settings (JSON); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Smallest detrended log-power bump counted as a peak
        #[arg(long, default_value = "0.0")]
        min_residual: f64,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Fit traveling waves to cluster phases
    Waves {
        /// JSON list of clusters with positions, phases, and optional power
        #[arg(long)]
        phases: PathBuf,

        /// Wave grid settings (JSON); defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Mean power spectra for one subject
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpectraInput {
    subject: String,
    electrodes: Vec<Electrode>,
    freqs: Vec<f64>,
    /// Frequency × electrode
    mean_power: Vec<Vec<f64>>,
}

/// Positions and raw phases (electrode × time) for one cluster, optionally
/// with band power (event × electrode × time) and its events
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaveInput {
    name: String,
    positions: Vec<Point3<f64>>,
    phases: Vec<Vec<f64>>,
    #[serde(default)]
    power: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(default)]
    events: Option<EventTable>,
}

/// Per-subject outcome as written to the output file
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome<T> {
    Ok(T),
    Error { kind: ErrorKind, message: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("memwave v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Classify {
            features,
            config,
            cache,
            out,
            subjects,
            exclusions,
        } => run_classify(&features, config.as_deref(), cache, out.as_deref(), subjects, exclusions),
        Commands::Cluster {
            spectra,
            config,
            min_residual,
            out,
        } => run_cluster(&spectra, config.as_deref(), min_residual, out.as_deref()),
        Commands::Waves { phases, config, out } => run_waves(&phases, config.as_deref(), out.as_deref()),
    }
}

fn run_classify(
    features: &Path,
    config: Option<&Path>,
    cache: Option<PathBuf>,
    out: Option<&Path>,
    subjects: Vec<String>,
    exclusions: bool,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ClassifierConfig::from_json(&read(path)?)
            .with_context(|| format!("invalid classifier config {}", path.display()))?,
        None => ClassifierConfig::default(),
    };
    let provider = InMemoryProvider::from_json(&read(features)?)
        .with_context(|| format!("invalid feature file {}", features.display()))?;

    let subjects = if subjects.is_empty() { provider.subjects() } else { subjects };
    let requests: Vec<FeatureRequest> = subjects
        .iter()
        .map(|s| FeatureRequest::new(s.clone(), config.task).with_phases(&config.feature_phases))
        .collect();
    info!(subjects = requests.len(), "classifying");

    let analysis = ClassifierAnalysis::new(config).with_exclusions(exclusions);
    let mut pipeline = SubjectPipeline::new(provider, analysis);
    if let Some(dir) = cache {
        pipeline = pipeline.with_cache(ResultCache::new(dir));
    }

    let results: BTreeMap<String, Outcome<_>> = pipeline
        .run_batch(&requests)
        .into_iter()
        .map(|(subject, outcome)| {
            let outcome = match outcome {
                Ok(result) => {
                    info!(subject = %subject, auc = result.auc, c = result.c, "classified");
                    Outcome::Ok(result)
                }
                Err(e) => Outcome::Error {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            };
            (subject, outcome)
        })
        .collect();

    write_json(out, &results)
}

fn run_cluster(spectra: &Path, config: Option<&Path>, min_residual: f64, out: Option<&Path>) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ClusterConfig::from_json(&read(path)?)
            .with_context(|| format!("invalid cluster config {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    let inputs: Vec<SpectraInput> =
        serde_json::from_str(&read(spectra)?).with_context(|| format!("invalid spectra file {}", spectra.display()))?;

    let extractor = ClusterExtractor::new(config)?;
    let detector = BackgroundPeakDetector { min_residual };

    let mut results: BTreeMap<String, Outcome<ClusterMap>> = BTreeMap::new();
    for input in inputs {
        let outcome = cluster_subject(&extractor, &detector, &input);
        let outcome = match outcome {
            Ok(clusters) => {
                info!(subject = %input.subject, clusters = clusters.total_clusters(), "clusters found");
                Outcome::Ok(clusters)
            }
            Err(e) => {
                warn!(subject = %input.subject, error = %e, "cluster detection failed");
                Outcome::Error {
                    kind: ErrorKind::Data,
                    message: format!("{e:#}"),
                }
            }
        };
        results.insert(input.subject, outcome);
    }

    write_json(out, &results)
}

fn cluster_subject(
    extractor: &ClusterExtractor,
    detector: &BackgroundPeakDetector,
    input: &SpectraInput,
) -> anyhow::Result<ClusterMap> {
    let rows = input.mean_power.len();
    let cols = input.electrodes.len();
    let flat: Vec<f64> = input.mean_power.iter().flatten().copied().collect();
    let mean_power = ndarray::Array2::from_shape_vec((rows, cols), flat)
        .context("mean_power must be frequency x electrode")?;
    let peaks = detector.detect(&input.freqs, mean_power.view())?;
    Ok(extractor.run(&input.electrodes, &peaks)?)
}

fn run_waves(phases: &Path, config: Option<&Path>, out: Option<&Path>) -> anyhow::Result<()> {
    let config: WaveConfig = match config {
        Some(path) => serde_json::from_str(&read(path)?)
            .with_context(|| format!("invalid wave config {}", path.display()))?,
        None => WaveConfig::default(),
    };
    let inputs: Vec<WaveInput> =
        serde_json::from_str(&read(phases)?).with_context(|| format!("invalid phase file {}", phases.display()))?;
    let fitter = WaveFitter::new(&config)?;

    let mut results: BTreeMap<String, Outcome<ClusterWaves>> = BTreeMap::new();
    for input in inputs {
        let outcome = fit_waves(&fitter, &input);
        let outcome = match outcome {
            Ok(waves) => {
                info!(cluster = %input.name, r_squared = waves.mean.r_squared, "waves fitted");
                Outcome::Ok(waves)
            }
            Err(e) => {
                warn!(cluster = %input.name, error = %e, "wave fit failed");
                Outcome::Error {
                    kind: ErrorKind::Data,
                    message: format!("{e:#}"),
                }
            }
        };
        results.insert(input.name, outcome);
    }

    write_json(out, &results)
}

fn fit_waves(fitter: &WaveFitter, input: &WaveInput) -> anyhow::Result<ClusterWaves> {
    let rows = input.phases.len();
    let cols = input.phases.first().map_or(0, Vec::len);
    let flat: Vec<f64> = input.phases.iter().flatten().copied().collect();
    let phases =
        ndarray::Array2::from_shape_vec((rows, cols), flat).context("phases must be electrode x time")?;
    let mut waves = fitter.fit_cluster(&input.positions, phases.view())?;

    match (&input.power, &input.events) {
        (Some(power), Some(events)) => {
            let dims = (
                power.len(),
                power.first().map_or(0, Vec::len),
                power.first().and_then(|e| e.first()).map_or(0, Vec::len),
            );
            let flat: Vec<f64> = power.iter().flatten().flatten().copied().collect();
            let power = ndarray::Array3::from_shape_vec(dims, flat).context("power must be event x electrode x time")?;
            waves.sme = Some(subsequent_memory_effect(power.view(), events)?);
        }
        (None, None) => {}
        _ => anyhow::bail!("power and events must be given together"),
    }
    Ok(waves)
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write_json<T: Serialize>(out: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "results written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
