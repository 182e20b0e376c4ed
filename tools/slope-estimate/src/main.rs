/// Slope estimation tool: reads a single-band GeoTIFF DEM, computes Horn and
/// Zevenbergen–Thorne slope grids, and writes them as `.npy` arrays.
///
/// With `--reference <fine DEM>` the DEM is also scored against the reference
/// DEM's slope → metrics.csv, samples.csv, evaluation.json.
///
/// Pixel spacing comes from the GeoTIFF ModelPixelScale tag, or the
/// ModelTransformation tag when no scale is present. GDAL_NODATA cells become
/// missing (NaN) elevations.
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use slope_core::grid::{ElevationGrid, Grid, PixelSpacing};
use slope_core::metrics::describe;
use slope_core::pipeline::{estimate_slopes, run, Evaluation, EvaluationConfig, SlopePair};
use slope_core::scanner::EdgePolicy;
use slope_core::{npy, report, SlopeMethod};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

// ── GeoTIFF tag ids ──────────────────────────────────────────────────────────

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TRANSFORMATION: u16 = 34264;
const GDAL_NODATA: u16 = 42113;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "slope-estimate",
    about = "Compute Horn and Zevenbergen-Thorne slope grids from a GeoTIFF DEM"
)]
struct Args {
    /// Input DEM (single-band GeoTIFF)
    #[arg(long)]
    dem: PathBuf,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "data/slopes")]
    output: PathBuf,

    /// Output file prefix; defaults to the DEM file stem
    #[arg(long)]
    prefix: Option<String>,

    /// Border handling: reflect | missing [default: reflect, or the config's]
    #[arg(long)]
    edge_policy: Option<EdgePolicy>,

    /// Fine-resolution reference DEM to score this DEM's slopes against
    #[arg(long)]
    reference: Option<PathBuf>,

    /// JSON evaluation config (edge policy, reference method, quantiles, threshold)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override pixel width in ground units
    #[arg(long)]
    dx: Option<f64>,

    /// Override pixel height in ground units
    #[arg(long)]
    dy: Option<f64>,
}

// ── Georeferencing ────────────────────────────────────────────────────────────

/// `(dx, dy)` from ModelPixelScale `[sx, sy, sz]`, else from the 4×4
/// ModelTransformation matrix (`dx = m[0]`, `dy = −m[5]`).
fn spacing_from_tags(scale: Option<&[f64]>, transform: Option<&[f64]>) -> Option<(f64, f64)> {
    if let Some(&[sx, sy, ..]) = scale {
        return Some((sx, sy));
    }
    match transform {
        Some(m) if m.len() >= 6 => Some((m[0], -m[5])),
        _ => None,
    }
}

/// GDAL writes the nodata value as ASCII, sometimes NUL-terminated.
fn parse_nodata(raw: &str) -> Option<f64> {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

fn mask_nodata(data: &mut [f64], nodata: Option<f64>) -> usize {
    let Some(nd) = nodata else {
        return 0;
    };
    let mut n = 0;
    for v in data.iter_mut() {
        if *v == nd || (nd.is_nan() && v.is_nan()) {
            *v = f64::NAN;
            n += 1;
        }
    }
    n
}

fn find_f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(Tag::from_u16_exhaustive(tag))? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

fn to_f64(img: DecodingResult) -> Result<Vec<f64>> {
    Ok(match img {
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        _ => bail!("unsupported DEM sample type"),
    })
}

fn read_dem(path: &Path, dx: Option<f64>, dy: Option<f64>) -> Result<ElevationGrid> {
    let file = File::open(path).with_context(|| format!("Open failed: {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Not a valid TIFF: {}", path.display()))?;
    let (width, height) = decoder.dimensions()?;

    let scale = find_f64_tag(&mut decoder, MODEL_PIXEL_SCALE)?;
    let transform = find_f64_tag(&mut decoder, MODEL_TRANSFORMATION)?;
    let tagged = spacing_from_tags(scale.as_deref(), transform.as_deref());
    let (dx, dy) = match (dx, dy, tagged) {
        (Some(dx), Some(dy), _) => (dx, dy),
        (dx, dy, Some((tx, ty))) => (dx.unwrap_or(tx), dy.unwrap_or(ty)),
        _ => bail!(
            "{} has no georeferencing; pass --dx and --dy",
            path.display()
        ),
    };
    let spacing = PixelSpacing::new(dx, dy)?;

    let nodata = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? {
        Some(value) => parse_nodata(&value.into_string()?),
        None => None,
    };

    let mut data = to_f64(decoder.read_image()?)
        .with_context(|| format!("Decode failed: {}", path.display()))?;
    let masked = mask_nodata(&mut data, nodata);
    if masked > 0 {
        info!("{masked} nodata cells masked");
    }

    let grid = Grid::from_vec(height as usize, width as usize, data)?;
    info!(
        "loaded {}x{} DEM from {} (dx={dx}, dy={dy})",
        height,
        width,
        path.display()
    );
    Ok(ElevationGrid::new(grid, spacing))
}

// ── Output ────────────────────────────────────────────────────────────────────

fn log_summaries(slopes: &SlopePair) {
    for method in SlopeMethod::ALL {
        let grid = slopes.get(method);
        match describe(&grid.data) {
            Some(s) => info!(
                "{method}: {} cells, mean {:.3}°, min {:.3}°, max {:.3}°",
                s.count, s.mean, s.min, s.max
            ),
            None => warn!("{method}: every cell is missing"),
        }
    }
}

fn write_slopes(output: &Path, prefix: &str, slopes: &SlopePair) -> Result<()> {
    for method in SlopeMethod::ALL {
        let out_path = output.join(format!("{}_{}.npy", prefix, method.file_tag()));
        npy::save(&out_path, slopes.get(method))
            .with_context(|| format!("Write failed: {}", out_path.display()))?;
        info!("  -> {}", out_path.display());
    }
    Ok(())
}

/// `reference_width` maps sample indices back to reference rows and columns.
fn write_evaluation(output: &Path, evaluation: &Evaluation, reference_width: usize) -> Result<()> {
    let metrics_path = output.join("metrics.csv");
    report::write_file(&metrics_path, |w| report::write_metrics(w, &evaluation.metrics))
        .with_context(|| format!("Write failed: {}", metrics_path.display()))?;
    let samples_path = output.join("samples.csv");
    report::write_file(&samples_path, |w| {
        report::write_samples(w, &evaluation.samples, reference_width)
    })
    .with_context(|| format!("Write failed: {}", samples_path.display()))?;
    let json_path = output.join("evaluation.json");
    fs::write(&json_path, serde_json::to_string_pretty(evaluation)?)
        .with_context(|| format!("Write failed: {}", json_path.display()))?;

    for p in [&metrics_path, &samples_path, &json_path] {
        info!("  -> {}", p.display());
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(p) => EvaluationConfig::load(p)
            .with_context(|| format!("Config load failed: {}", p.display()))?,
        None => EvaluationConfig::default(),
    };
    if let Some(policy) = args.edge_policy {
        config.edge_policy = policy;
    }

    let prefix = match args.prefix {
        Some(p) => p,
        None => args
            .dem
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Cannot derive output prefix from DEM path; pass --prefix")?
            .to_string(),
    };

    let dem = read_dem(&args.dem, args.dx, args.dy)?;
    let (slopes, evaluation) = match &args.reference {
        Some(path) => {
            let reference_dem = read_dem(path, None, None)?;
            let out = run(&reference_dem, &dem, &config)?;
            (out.test, Some((out.evaluation, out.reference.width)))
        }
        None => (estimate_slopes(&dem, config.edge_policy), None),
    };
    log_summaries(&slopes);

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    write_slopes(&args.output, &prefix, &slopes)?;
    if let Some((evaluation, width)) = &evaluation {
        write_evaluation(&args.output, evaluation, *width)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spacing_prefers_pixel_scale() {
        let scale = [30.0, 30.0, 0.0];
        let transform = [10.0, 0.0, 0.0, 500.0, 0.0, -10.0];
        assert_eq!(
            spacing_from_tags(Some(&scale[..]), Some(&transform[..])),
            Some((30.0, 30.0))
        );
    }

    #[test]
    fn spacing_from_transform_flips_y() {
        let transform = [
            1.0, 0.0, 0.0, 256_000.0, //
            0.0, -2.0, 0.0, 6_246_000.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert_eq!(spacing_from_tags(None, Some(&transform[..])), Some((1.0, 2.0)));
    }

    #[test]
    fn spacing_missing_without_tags() {
        assert_eq!(spacing_from_tags(None, None), None);
        assert_eq!(spacing_from_tags(Some(&[1.0][..]), None), None);
    }

    #[test]
    fn nodata_parses_gdal_ascii() {
        assert_eq!(parse_nodata("-9999\0"), Some(-9999.0));
        assert_eq!(parse_nodata(" -3.4028234663852886e+38 "), Some(-3.4028234663852886e38));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_nodata("none"), None);
    }

    #[test]
    fn reference_run_writes_slopes_and_tables() {
        let dem = |n: usize| {
            let cell = 900.0 / (n - 1) as f64;
            let grid = Grid::from_fn(n, n, |r, c| {
                let (x, y) = (c as f64 * cell, r as f64 * cell);
                0.2 * x + 0.0004 * y * y
            })
            .unwrap();
            ElevationGrid::new(grid, PixelSpacing::new(cell, cell).unwrap())
        };
        let out = run(&dem(31), &dem(7), &EvaluationConfig::default()).unwrap();

        let dir = std::env::temp_dir().join(format!("slope-estimate-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        write_slopes(&dir, "coarse", &out.test).unwrap();
        write_evaluation(&dir, &out.evaluation, out.reference.width).unwrap();

        assert_eq!(npy::load(dir.join("coarse_horn.npy")).unwrap().shape(), (7, 7));
        assert_eq!(npy::load(dir.join("coarse_zeven.npy")).unwrap().shape(), (7, 7));
        let metrics = fs::read_to_string(dir.join("metrics.csv")).unwrap();
        assert_eq!(metrics.lines().count(), 3);
        let samples = fs::read_to_string(dir.join("samples.csv")).unwrap();
        assert_eq!(samples.lines().count(), 1 + 5);
        assert!(dir.join("evaluation.json").exists());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mask_nodata_replaces_sentinel() {
        let mut data = vec![1.0, -9999.0, 3.0, -9999.0];
        assert_eq!(mask_nodata(&mut data, Some(-9999.0)), 2);
        assert!(data[1].is_nan() && data[3].is_nan());
        assert_eq!(data[0], 1.0);

        let mut untouched = vec![1.0, 2.0];
        assert_eq!(mask_nodata(&mut untouched, None), 0);
    }
}
