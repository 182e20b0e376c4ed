//! Comma-separated tables for downstream inspection and plotting.
//!
//! Every table starts with a header row. Floats use Rust's shortest
//! round-trip formatting; an undefined statistic is an empty field.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::metrics::{AgreementRow, MethodComparison, MetricsReport, Summary};
use crate::quantile::Sample;

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

pub fn write_metrics<W: Write>(mut w: W, report: &MetricsReport) -> Result<()> {
    writeln!(w, "method,n_valid,rmse,mae,correlation")?;
    for m in &report.methods {
        writeln!(
            w,
            "{},{},{},{},{}",
            m.method,
            m.n_valid,
            m.rmse,
            m.mae,
            opt(m.correlation)
        )?;
    }
    Ok(())
}

/// `width` turns flattened sample indices back into row/column.
pub fn write_samples<W: Write>(mut w: W, samples: &[Sample], width: usize) -> Result<()> {
    writeln!(w, "label,index,row,col,reference,horn,zeven,horn_error,zeven_error")?;
    for s in samples {
        let (row, col) = (s.index / width.max(1), s.index % width.max(1));
        writeln!(
            w,
            "{},{},{row},{col},{},{},{},{},{}",
            s.label, s.index, s.reference, s.horn, s.zeven, s.horn_error, s.zeven_error
        )?;
    }
    Ok(())
}

pub fn write_agreement<W: Write>(mut w: W, rows: &[AgreementRow]) -> Result<()> {
    writeln!(w, "Horn,Zevenbergen,Difference")?;
    for r in rows {
        writeln!(w, "{},{},{}", r.horn, r.zeven, r.difference)?;
    }
    Ok(())
}

fn summary_row<W: Write>(w: &mut W, name: &str, s: &Summary) -> Result<()> {
    writeln!(
        w,
        "{name},{},{},{},{},{},{},{},{}",
        s.count,
        s.mean,
        opt(s.std),
        s.min,
        s.p25,
        s.p50,
        s.p75,
        s.max
    )?;
    Ok(())
}

/// Describe table for both estimators and their absolute difference.
pub fn write_comparison<W: Write>(mut w: W, cmp: &MethodComparison) -> Result<()> {
    writeln!(w, "field,count,mean,std,min,25%,50%,75%,max")?;
    summary_row(&mut w, "Horn", &cmp.horn)?;
    summary_row(&mut w, "Zevenbergen", &cmp.zeven)?;
    summary_row(&mut w, "Difference", &cmp.difference)?;
    Ok(())
}

/// Create `path` and hand a buffered writer to `f`.
pub fn write_file<P, F>(path: P, f: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut w = BufWriter::new(File::create(path)?);
    f(&mut w)?;
    w.flush()?;
    Ok(())
}
