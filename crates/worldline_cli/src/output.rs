//! CSV export for sampled trajectories.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use worldline_core::body::Body;

/// Writes one row per sample: the affine parameter, every coordinate,
/// every velocity, and optionally the coordinate speed.
pub fn write_csv(path: &Path, body: &Body, with_speed: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let chart = body.chart();
    let mut header = vec!["s".to_string()];
    for i in 0..chart.dim() {
        header.push(chart.coord(i).to_string());
    }
    for i in 0..chart.dim() {
        header.push(chart.velocity(i).to_string());
    }
    if with_speed {
        header.push("speed".to_string());
    }
    writeln!(out, "{}", header.join(","))?;

    let speed = if with_speed {
        Some(body.coordinate_speed(None)?.to_vec())
    } else {
        None
    };
    for k in 0..body.len() {
        let mut row = Vec::with_capacity(header.len());
        row.push(format!("{:.12e}", body.affine()[k]));
        for i in 0..chart.dim() {
            row.push(format!("{:.12e}", body.coord(i)[k]));
        }
        for i in 0..chart.dim() {
            row.push(format!("{:.12e}", body.velocity(i)[k]));
        }
        if let Some(speed) = &speed {
            row.push(format!("{:.12e}", speed[k]));
        }
        writeln!(out, "{}", row.join(","))?;
    }
    out.flush()?;
    Ok(())
}
