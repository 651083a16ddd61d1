//! Dataset loading and saving.
//!
//! Input is either a CSV file with a header row or a JSON array of objects (as
//! returned by the activity API). Output is always CSV.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dataset::models::{ActivityRecord, Dataset, EnrichedDataset};
use crate::errors::AppError;

/// Load a dataset, choosing the reader from the file extension.
pub fn load_dataset(path: &Path) -> Result<Dataset, AppError> {
    if !path.exists() {
        return Err(AppError::InputNotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let reader = BufReader::new(File::open(path)?);
    let dataset = match extension.as_str() {
        "csv" => read_csv(reader)?,
        "json" => read_json(reader)?,
        other => return Err(AppError::UnsupportedFormat(other.to_string())),
    };

    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        dataset.len(),
        dataset.columns.len(),
        path.display()
    );
    Ok(dataset)
}

/// Read CSV with a header row. Empty cells become null; ragged rows are padded.
pub fn read_csv<R: Read>(reader: R) -> Result<Dataset, AppError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut values: Vec<Value> = record
            .iter()
            .take(columns.len())
            .map(|cell| {
                if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                }
            })
            .collect();
        values.resize(columns.len(), Value::Null);
        rows.push(ActivityRecord::new(values));
    }

    Ok(Dataset::new(columns, rows))
}

/// Read a JSON array of objects. Columns are the union of keys in first-seen order.
pub fn read_json<R: Read>(reader: R) -> Result<Dataset, AppError> {
    let objects: Vec<Map<String, Value>> = serde_json::from_reader(reader)?;

    let mut columns: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = objects
        .into_iter()
        .map(|mut object| {
            let values = columns
                .iter()
                .map(|c| object.remove(c).unwrap_or(Value::Null))
                .collect();
            ActivityRecord::new(values)
        })
        .collect();

    Ok(Dataset::new(columns, rows))
}

/// Write the enriched dataset as CSV, creating the parent directory if needed.
pub fn save_csv(path: &Path, dataset: &EnrichedDataset) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    write_csv(writer, dataset)
}

pub fn write_csv<W: Write>(writer: W, dataset: &EnrichedDataset) -> Result<(), AppError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&dataset.columns)?;
    for record in &dataset.records {
        csv_writer.write_record(record.values.iter().map(cell_text))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Render a value as a CSV cell. Structures are written as compact JSON.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
