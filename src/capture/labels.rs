use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use super::frame::GroundTruthBox;

pub const LABEL_CSV_HEADER: &str = "class_id,xmin,xmax,ymin,ymax";

/// Write one frame's labels: header, then one row per box in list order.
pub fn write_label_csv(path: &Path, labels: &[GroundTruthBox]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{LABEL_CSV_HEADER}")?;
    for label in labels {
        writeln!(
            out,
            "{},{},{},{},{}",
            label.class_id, label.xmin, label.xmax, label.ymin, label.ymax
        )?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_label_csv(path: &Path) -> Result<Vec<GroundTruthBox>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read label file {}", path.display()))?;
    parse_label_csv(&raw).with_context(|| format!("invalid label file {}", path.display()))
}

pub fn parse_label_csv(raw: &str) -> Result<Vec<GroundTruthBox>> {
    let mut lines = raw.lines();
    match lines.next().map(str::trim) {
        Some(LABEL_CSV_HEADER) => {}
        Some(other) => return Err(anyhow!("unexpected header '{}'", other)),
        None => return Err(anyhow!("missing header")),
    }

    let mut labels = Vec::new();
    for (row, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(anyhow!(
                "row {}: expected 5 fields, found {}",
                row + 1,
                fields.len()
            ));
        }
        let int = |i: usize| -> Result<i32> {
            fields[i]
                .parse()
                .map_err(|_| anyhow!("row {}: '{}' is not an integer", row + 1, fields[i]))
        };
        labels.push(GroundTruthBox {
            class_id: fields[0]
                .parse()
                .map_err(|_| anyhow!("row {}: bad class id '{}'", row + 1, fields[0]))?,
            xmin: int(1)?,
            xmax: int(2)?,
            ymin: int(3)?,
            ymax: int(4)?,
        });
    }
    Ok(labels)
}
