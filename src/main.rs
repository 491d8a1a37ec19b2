use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use student_alert_engine::detectors::EwmaConfig;
use student_alert_engine::pipeline::{detect_candidates, DetectionOptions};
use student_alert_engine::policy::{PolicyContext, PolicyOutcome};
use student_alert_engine::{config, ingest, report, tuning};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alert-engine")]
#[command(about = "Statistical alert detection for student tracking data", long_about = None)]
struct Cli {
    /// Log decisions at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print tuned control-chart parameters
    Tune {
        #[arg(long, default_value_t = tuning::DEFAULT_TARGET_FALSE_ALERTS_PER_N)]
        target_n: f64,
        #[arg(long, default_value_t = tuning::DEFAULT_CUSUM_K_FACTOR)]
        k_factor: f64,
        /// Baseline quality score in [0, 1]
        #[arg(long)]
        quality: Option<f64>,
    },
    /// Run detectors and alert policy over a tracking CSV
    Detect {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        min_support: u64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print alerts as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown alert report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        min_support: u64,
        #[arg(long, default_value = "alert-report.md")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_pipeline(
    csv: &Path,
    settings: Option<&Path>,
    min_support: u64,
) -> anyhow::Result<PolicyOutcome> {
    let settings = config::resolve_settings(settings)?;
    let entries = ingest::read_entries(csv)?;
    let options = DetectionOptions {
        min_support,
        ..DetectionOptions::default()
    };
    let candidates = detect_candidates(&entries, &options);
    let mut policy = PolicyContext::new(settings);
    Ok(policy.process(&candidates))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Tune {
            target_n,
            k_factor,
            quality,
        } => {
            let ewma = tuning::adjust_multiplier_by_baseline_quality(
                tuning::compute_ewma_control_multiplier(target_n),
                quality,
            );
            let cusum = tuning::adjust_multiplier_by_baseline_quality(
                tuning::compute_cusum_decision_interval_multiplier(k_factor, target_n),
                quality,
            );
            println!("Target: one false alert per {target_n} observations");
            println!(
                "- EWMA control multiplier L = {:.3} (lambda {})",
                ewma,
                EwmaConfig::default().lambda
            );
            println!("- CUSUM decision interval h = {:.3} (k {})", cusum, k_factor);
        }
        Commands::Detect {
            csv,
            settings,
            min_support,
            limit,
            json,
        } => {
            let outcome = run_pipeline(&csv, settings.as_deref(), min_support)?;

            if json {
                let body = json!({
                    "alerts": outcome.emitted,
                    "suppressed": report::suppression_counts(&outcome),
                });
                let rendered =
                    serde_json::to_string_pretty(&body).context("failed to render alerts")?;
                println!("{rendered}");
                return Ok(());
            }

            if outcome.emitted.is_empty() {
                println!("No alerts raised from {}.", csv.display());
                return Ok(());
            }

            println!("Alerts raised:");
            for alert in outcome.emitted.iter().take(limit) {
                println!(
                    "- [{}] {} {} ({}) confidence {:.2}",
                    alert.severity,
                    alert.student_id,
                    alert.kind,
                    alert.context_key().unwrap_or("default"),
                    alert.confidence
                );
            }
            if !outcome.suppressed.is_empty() {
                println!("{} candidates held back by policy.", outcome.suppressed.len());
            }
        }
        Commands::Report {
            csv,
            settings,
            min_support,
            out,
        } => {
            let outcome = run_pipeline(&csv, settings.as_deref(), min_support)?;
            let source = csv.display().to_string();
            let report = report::build_report(&source, &outcome);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
