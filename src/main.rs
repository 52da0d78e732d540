use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use traffic_sentinel::analysis::stats::reference_means;
use traffic_sentinel::config::{EngineConfig, LoggingConfig};
use traffic_sentinel::{
    classify, AnomalyResult, Classification, Detector, FeatureVector, SharedDetector,
    TelemetryGenerator,
};

/// Upper bound on `simulate --count`.
const MAX_SIMULATED_WINDOWS: u64 = 1_000_000;

#[derive(Parser)]
#[command(
    name = "traffic-sentinel",
    about = "Network-traffic anomaly detection engine",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single observation window
    Detect {
        #[command(flatten)]
        features: FeatureArgs,

        /// Train the reconstruction model first (otherwise the statistical test is used)
        #[arg(long)]
        train: bool,

        /// Training epochs (defaults to config)
        #[arg(long)]
        epochs: Option<usize>,

        /// Synthetic baseline samples (defaults to config)
        #[arg(long)]
        samples: Option<usize>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Generate synthetic telemetry and run it through the detector
    Simulate {
        /// Number of observation windows
        #[arg(
            long,
            default_value = "20",
            value_parser = clap::value_parser!(u64).range(1..=MAX_SIMULATED_WINDOWS)
        )]
        count: u64,

        /// Probability that a window carries an injected attack
        #[arg(long, default_value = "0.2")]
        anomaly_rate: f64,

        /// Train the reconstruction model first
        #[arg(long)]
        train: bool,

        /// Seed for telemetry and training
        #[arg(long)]
        seed: Option<u64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the severity band for a score
    Classify {
        /// Anomaly score (0-100)
        #[arg(long, allow_hyphen_values = true)]
        score: f64,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Observation window; omitted features sit on their reference mean.
#[derive(Args)]
struct FeatureArgs {
    /// Packets per second
    #[arg(long)]
    packet_rate: Option<f64>,

    /// Bytes per second
    #[arg(long)]
    byte_volume: Option<f64>,

    /// Distinct destination addresses
    #[arg(long)]
    unique_destinations: Option<f64>,

    /// Shannon entropy of the protocol mix
    #[arg(long)]
    protocol_entropy: Option<f64>,

    /// Fraction of the day elapsed (0-1)
    #[arg(long)]
    time_of_day: Option<f64>,

    /// Average connection duration in seconds
    #[arg(long)]
    connection_duration: Option<f64>,
}

impl FeatureArgs {
    fn into_features(self) -> FeatureVector {
        let means = reference_means();
        FeatureVector {
            packet_rate: self.packet_rate.unwrap_or(means.packet_rate),
            byte_volume: self.byte_volume.unwrap_or(means.byte_volume),
            unique_destinations: self.unique_destinations.unwrap_or(means.unique_destinations),
            protocol_entropy: self.protocol_entropy.unwrap_or(means.protocol_entropy),
            time_of_day_factor: self.time_of_day.unwrap_or(means.time_of_day_factor),
            connection_duration: self.connection_duration.unwrap_or(means.connection_duration),
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Detect {
            features,
            train,
            epochs,
            samples,
            json,
        } => {
            let features = features.into_features();
            features.validate()?;

            let detector = SharedDetector::new(Detector::new(config.training.clone()));
            if train {
                let epochs = epochs.unwrap_or(config.training.epochs);
                let samples = samples.unwrap_or(config.training.samples);
                tracing::info!(%epochs, %samples, "Training detector");
                detector.train(epochs, samples).await?;
            }

            let result = detector.detect(&features);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Simulate {
            count,
            anomaly_rate,
            train,
            seed,
            json,
        } => {
            ensure!(
                (0.0..=1.0).contains(&anomaly_rate),
                "--anomaly-rate must be within [0, 1], got {}",
                anomaly_rate
            );

            let mut training = config.training.clone();
            if seed.is_some() {
                training.seed = seed;
            }
            let detector = SharedDetector::new(Detector::new(training));
            if train {
                tracing::info!("Training detector");
                detector.train_default().await?;
            }

            let (mut generator, mut dice) = match seed {
                Some(s) => (
                    TelemetryGenerator::seeded(s),
                    StdRng::seed_from_u64(s.wrapping_add(1)),
                ),
                None => (TelemetryGenerator::from_entropy(), StdRng::from_entropy()),
            };

            let mut rows = Vec::new();
            for _ in 0..count {
                let (features, injected) = generator.generate_labeled(dice.gen_bool(anomaly_rate));
                let result = detector.detect(&features);
                rows.push((features, injected, result));
            }

            if json {
                let out: Vec<_> = rows
                    .iter()
                    .enumerate()
                    .map(|(i, (features, injected, result))| {
                        serde_json::json!({
                            "index": i,
                            "injected": injected,
                            "features": features,
                            "result": result,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_simulation(&rows, &detector);
            }
        }
        Commands::Classify { score } => {
            println!("{}", classify(score));
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_result(result: &AnomalyResult) {
    println!("\n=== Traffic Sentinel Detection ===");
    println!("Classification: {}", result.classification);
    println!("Score:          {:.1}", result.score);
    println!("Anomaly:        {}", result.is_anomaly);
    println!("Confidence:     {:.0}%", result.confidence * 100.0);
    println!("Error:          {:.4}", result.reconstruction_error);
    println!("Scoring path:   {:?}", result.scoring_path);
    println!("\nFeature contributions:");

    let mut contributions: Vec<_> = result.feature_contributions.iter().collect();
    contributions.sort_by(|a, b| b.1.total_cmp(a.1));
    for (feature, weight) in contributions {
        println!(" - {:<20} {:>6.1}%", feature, weight * 100.0);
    }
    println!("==================================\n");
}

fn print_simulation(
    rows: &[(FeatureVector, Option<traffic_sentinel::AttackPattern>, AnomalyResult)],
    detector: &SharedDetector,
) {
    println!(
        "{:<5} | {:<16} | {:>6} | {:<10} | Top feature",
        "#", "Injected", "Score", "Class"
    );
    println!("{:-<5}-|-{:-<16}-|-{:->6}-|-{:-<10}-|-{:-<20}", "", "", "", "", "");

    let mut counts: BTreeMap<Classification, usize> = BTreeMap::new();
    let (mut injected_total, mut injected_flagged) = (0usize, 0usize);

    for (i, (_, injected, result)) in rows.iter().enumerate() {
        *counts.entry(result.classification).or_default() += 1;
        if injected.is_some() {
            injected_total += 1;
            if result.classification != Classification::Normal {
                injected_flagged += 1;
            }
        }
        let label = injected.map(|p| p.name()).unwrap_or("-");
        let top = result
            .top_contributor()
            .map(|(f, w)| format!("{} ({:.0}%)", f, w * 100.0))
            .unwrap_or_default();
        println!(
            "{:<5} | {:<16} | {:>6.1} | {:<10} | {}",
            i, label, result.score, result.classification, top
        );
    }

    let metrics = detector.get_metrics();
    println!("\n=== Summary ===");
    println!("Model ready: {} ({:?})", metrics.is_ready, metrics.state);
    for class in Classification::ALL {
        println!("{:<12}: {}", class, counts.get(&class).copied().unwrap_or(0));
    }
    if injected_total > 0 {
        println!(
            "Injected attacks flagged: {}/{}",
            injected_flagged, injected_total
        );
    }
    println!();
}
