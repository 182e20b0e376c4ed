/// Slope evaluation tool: scores persisted slope grids and writes CSV tables.
///
/// `compare`     Horn vs Zevenbergen–Thorne on the same grid
///               → slope_eval.csv, summary.csv
/// `resolution`  coarse-resolution slopes vs a fine-resolution reference
///               → metrics.csv, samples.csv, evaluation.json
///
/// Slope grids are read as `<prefix>_horn.npy` / `<prefix>_zeven.npy`, the
/// layout written by `slope-estimate`.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use slope_core::metrics::{agreement_rows, compare_methods};
use slope_core::pipeline::{evaluate_resolution, EvaluationConfig, SlopePair};
use slope_core::{npy, report, SlopeMethod};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "slope-evaluate", about = "Evaluate slope estimators from persisted slope grids")]
struct Args {
    /// Output directory for CSV tables (created if absent)
    #[arg(short, long, default_value = "data/eval")]
    output: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Agreement between Horn and Zevenbergen-Thorne on one grid.
    Compare {
        /// Slope grid prefix, e.g. data/slopes/katoomba
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Accuracy of coarse-resolution slopes against a fine reference.
    Resolution {
        /// Fine-resolution slope grid prefix
        #[arg(short, long)]
        reference: PathBuf,

        /// Coarse-resolution slope grid prefix
        #[arg(short, long)]
        test: PathBuf,

        /// JSON evaluation config; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Estimator whose fine-resolution output is the reference
        #[arg(long)]
        reference_method: Option<SlopeMethod>,

        /// Comma-separated percentiles to sample, e.g. 5,50,95
        #[arg(long, value_delimiter = ',')]
        quantiles: Vec<f64>,

        /// Near-flat cutoff in degrees for quantile sampling
        #[arg(long)]
        threshold: Option<f64>,
    },
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn grid_path(prefix: &Path, method: SlopeMethod) -> PathBuf {
    let mut name = prefix.file_name().unwrap_or_default().to_os_string();
    name.push(format!("_{}.npy", method.file_tag()));
    prefix.with_file_name(name)
}

fn load_pair(prefix: &Path) -> Result<SlopePair> {
    let load = |method| {
        let path = grid_path(prefix, method);
        npy::load(&path).with_context(|| format!("Load failed: {}", path.display()))
    };
    Ok(SlopePair {
        horn: load(SlopeMethod::Horn)?,
        zeven: load(SlopeMethod::ZevenbergenThorne)?,
    })
}

fn resolve_config(
    path: Option<&Path>,
    reference_method: Option<SlopeMethod>,
    quantiles: Vec<f64>,
    threshold: Option<f64>,
) -> Result<EvaluationConfig> {
    let mut config = match path {
        Some(p) => EvaluationConfig::load(p)
            .with_context(|| format!("Config load failed: {}", p.display()))?,
        None => EvaluationConfig::default(),
    };
    if let Some(m) = reference_method {
        config.reference_method = m;
    }
    if !quantiles.is_empty() {
        config.quantiles = quantiles;
    }
    if let Some(t) = threshold {
        config.threshold = t;
    }
    config.sampler()?;
    Ok(config)
}

fn fmt_r(r: Option<f64>) -> String {
    r.map(|r| format!("{r:.4}"))
        .unwrap_or_else(|| "undefined".to_string())
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn run_compare(input: &Path, output: &Path) -> Result<()> {
    let pair = load_pair(input)?;
    let rows = agreement_rows(&pair.horn, &pair.zeven)?;
    let cmp = compare_methods(&pair.horn, &pair.zeven)?;

    info!(
        "{} cells: Horn mean {:.3}°, Zevenbergen mean {:.3}°, |diff| mean {:.3}°, r = {}",
        cmp.horn.count,
        cmp.horn.mean,
        cmp.zeven.mean,
        cmp.difference.mean,
        fmt_r(cmp.correlation)
    );

    fs::create_dir_all(output).with_context(|| format!("Cannot create {}", output.display()))?;
    let eval_path = output.join("slope_eval.csv");
    report::write_file(&eval_path, |w| report::write_agreement(w, &rows))
        .with_context(|| format!("Write failed: {}", eval_path.display()))?;
    let summary_path = output.join("summary.csv");
    report::write_file(&summary_path, |w| report::write_comparison(w, &cmp))
        .with_context(|| format!("Write failed: {}", summary_path.display()))?;

    info!("  -> {}", eval_path.display());
    info!("  -> {}", summary_path.display());
    Ok(())
}

fn run_resolution(
    reference: &Path,
    test: &Path,
    config: &EvaluationConfig,
    output: &Path,
) -> Result<()> {
    let reference_path = grid_path(reference, config.reference_method);
    let reference = npy::load(&reference_path)
        .with_context(|| format!("Load failed: {}", reference_path.display()))?;
    let test = load_pair(test)?;

    let evaluation = evaluate_resolution(&reference, &test, config)?;
    for m in &evaluation.metrics.methods {
        info!(
            "{:<20} rmse {:>8.4}  mae {:>8.4}  r {}",
            m.method,
            m.rmse,
            m.mae,
            fmt_r(m.correlation)
        );
    }

    fs::create_dir_all(output).with_context(|| format!("Cannot create {}", output.display()))?;
    let metrics_path = output.join("metrics.csv");
    report::write_file(&metrics_path, |w| report::write_metrics(w, &evaluation.metrics))
        .with_context(|| format!("Write failed: {}", metrics_path.display()))?;
    let samples_path = output.join("samples.csv");
    report::write_file(&samples_path, |w| {
        report::write_samples(w, &evaluation.samples, reference.width)
    })
    .with_context(|| format!("Write failed: {}", samples_path.display()))?;
    let json_path = output.join("evaluation.json");
    fs::write(&json_path, serde_json::to_string_pretty(&evaluation)?)
        .with_context(|| format!("Write failed: {}", json_path.display()))?;

    for p in [&metrics_path, &samples_path, &json_path] {
        info!("  -> {}", p.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.cmd {
        Command::Compare { input } => run_compare(&input, &args.output),
        Command::Resolution {
            reference,
            test,
            config,
            reference_method,
            quantiles,
            threshold,
        } => {
            let config = resolve_config(config.as_deref(), reference_method, quantiles, threshold)?;
            run_resolution(&reference, &test, &config, &args.output)
        }
    }
}
