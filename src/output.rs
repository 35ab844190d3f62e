use anyhow::{anyhow, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

/// Write one label per line, creating or truncating `path`.
///
/// The delimiter only matters for the record layout; with a single column
/// every line is just the integer followed by `\n`.
pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[i64], delimiter: u8) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_path(path)
        .map_err(|e| anyhow!("Failed to create {:?}: {}", path, e))?;

    for label in labels {
        wtr.write_record([label.to_string()])
            .map_err(|e| anyhow!("Failed to write to {:?}: {}", path, e))?;
    }
    wtr.flush()
        .map_err(|e| anyhow!("Failed to flush {:?}: {}", path, e))?;

    log::info!("wrote {} labels to {:?}", labels.len(), path);
    Ok(())
}

/// Read a label file written by [`write_labels`], first column of each line.
pub fn read_labels<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Vec<i64>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow!("Failed to open {:?}: {}", path, e))?;

    let mut labels = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| anyhow!("Error reading line {} of {:?}: {}", i, path, e))?;
        let field = record
            .get(0)
            .ok_or_else(|| anyhow!("Line {} of {:?} is empty", i, path))?;
        let label = field
            .trim()
            .parse::<i64>()
            .map_err(|e| anyhow!("Line {} of {:?} is not an integer ({:?}): {}", i, path, field, e))?;
        labels.push(label);
    }
    Ok(labels)
}
