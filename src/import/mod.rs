//! CSV import for measured target and measurement series.
//!
//! Measurement tools export density readings as two columns: an input
//! position and a density value. Inputs may be given as fractions (`0..1`)
//! or percentages (`0..100`); rows may come in any order and need not be
//! evenly spaced.
//!
//! ## Supported Formats
//!
//! The importer looks for the input column under `input`, `x`, `percent` or
//! `in`, and the value column under `density`, `value`, `y`, `out` or
//! `target` (case-insensitive). Files without a header row use the first two
//! columns.
//!
//! ## Example
//!
//! ```rust,ignore
//! use quad_curves::import::{TargetCsv, TargetCsvSchema};
//!
//! let schema = TargetCsvSchema::builder().value_column("L*").build();
//! let samples = TargetCsv::new(schema).import("measured.csv")?;
//! ```

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::target::TargetSamples;

const INPUT_ALIASES: &[&str] = &["input", "x", "percent", "in"];
const VALUE_ALIASES: &[&str] = &["density", "value", "y", "out", "target"];

/// Column names for CSV import.
#[derive(Debug, Clone, Default)]
pub struct TargetCsvSchema {
    /// Column name for the input position.
    pub input_column: Option<String>,
    /// Column name for the density value.
    pub value_column: Option<String>,
}

impl TargetCsvSchema {
    /// Create a schema builder.
    #[must_use]
    pub fn builder() -> TargetCsvSchemaBuilder {
        TargetCsvSchemaBuilder::default()
    }

    /// Create a schema that auto-detects columns from common names.
    #[must_use]
    pub fn auto_detect() -> Self {
        Self::default()
    }

    /// Try to find a column index by name (case-insensitive, with aliases).
    fn find_column(headers: &[&str], primary: Option<&str>, aliases: &[&str]) -> Option<usize> {
        if let Some(name) = primary {
            if let Some(idx) = find_header_index(headers, name) {
                return Some(idx);
            }
        }
        aliases.iter().find_map(|alias| find_header_index(headers, alias))
    }
}

/// Builder for [`TargetCsvSchema`].
#[derive(Debug, Default)]
pub struct TargetCsvSchemaBuilder {
    schema: TargetCsvSchema,
}

impl TargetCsvSchemaBuilder {
    /// Set the input column name.
    #[must_use]
    pub fn input_column(mut self, name: impl Into<String>) -> Self {
        self.schema.input_column = Some(name.into());
        self
    }

    /// Set the value column name.
    #[must_use]
    pub fn value_column(mut self, name: impl Into<String>) -> Self {
        self.schema.value_column = Some(name.into());
        self
    }

    /// Build the schema.
    #[must_use]
    pub fn build(self) -> TargetCsvSchema {
        self.schema
    }
}

/// CSV importer for density series.
#[derive(Debug, Clone, Default)]
pub struct TargetCsv {
    schema: TargetCsvSchema,
}

impl TargetCsv {
    /// Create a new importer with the given schema.
    #[must_use]
    pub fn new(schema: TargetCsvSchema) -> Self {
        Self { schema }
    }

    /// Create an importer that auto-detects columns.
    #[must_use]
    pub fn auto_detect() -> Self {
        Self::new(TargetCsvSchema::auto_detect())
    }

    /// Import a series from a CSV file.
    pub fn import(&self, path: impl AsRef<Path>) -> Result<TargetSamples> {
        let file = std::fs::File::open(path.as_ref())?;
        self.import_reader(file)
    }

    /// Import a series from any reader.
    pub fn import_reader<R: Read>(&self, reader: R) -> Result<TargetSamples> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut records = reader.records();
        let Some(first) = records.next() else {
            return Err(Error::CsvImport {
                line: 0,
                reason: "file is empty".to_string(),
            });
        };
        let first = first?;

        let first_is_data = first.len() >= 2 && first.iter().take(2).all(|f| f.parse::<f64>().is_ok());
        let (input_idx, value_idx, mut rows) = if first_is_data {
            (0, 1, vec![(1, first)])
        } else {
            let headers: Vec<&str> = first.iter().collect();
            let input_idx =
                TargetCsvSchema::find_column(&headers, self.schema.input_column.as_deref(), INPUT_ALIASES)
                    .ok_or_else(|| Error::CsvImport {
                        line: 1,
                        reason: "Could not find input column".to_string(),
                    })?;
            let value_idx =
                TargetCsvSchema::find_column(&headers, self.schema.value_column.as_deref(), VALUE_ALIASES)
                    .ok_or_else(|| Error::CsvImport {
                        line: 1,
                        reason: "Could not find density/value column".to_string(),
                    })?;
            (input_idx, value_idx, Vec::new())
        };

        for (line_num, record) in records.enumerate() {
            let record = record.map_err(|e| Error::CsvImport {
                line: line_num + 2, // +2 for 1-based and first row
                reason: e.to_string(),
            })?;
            rows.push((line_num + 2, record));
        }

        let mut points = Vec::with_capacity(rows.len());
        for (line, record) in rows {
            let input = record.get(input_idx).unwrap_or("");
            let value = record.get(value_idx).unwrap_or("");
            if input.is_empty() && value.is_empty() {
                continue;
            }
            let parse = |s: &str, what: &str| -> Result<f64> {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| Error::CsvImport {
                        line,
                        reason: format!("invalid {what} {s:?}"),
                    })
            };
            points.push((parse(input, "input")?, parse(value, "value")?));
        }

        if points.len() < 2 {
            return Err(Error::CsvImport {
                line: 0,
                reason: format!("need at least 2 rows, got {}", points.len()),
            });
        }

        let max_input = points.iter().map(|p| p.0).fold(f64::MIN, f64::max);
        if max_input > 1.0 {
            for p in &mut points {
                p.0 /= 100.0;
            }
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let (min, max) = (xs[0], xs[xs.len() - 1]);
        if max <= min {
            return Err(Error::CsvImport {
                line: 0,
                reason: "input column spans no range".to_string(),
            });
        }

        let n = xs.len();
        let samples = (0..n)
            .map(|j| interpolate_linear(&xs, &ys, min + (max - min) * j as f64 / (n - 1) as f64))
            .collect();
        log::debug!("imported {n} density rows over [{min}, {max}]");
        Ok(TargetSamples::new(samples).with_domain(min, max))
    }
}

/// Piecewise-linear lookup into sorted `xs`.
fn interpolate_linear(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let hi = xs.partition_point(|&v| v < x).clamp(1, xs.len() - 1);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return ys[hi];
    }
    let t = ((x - xs[lo]) / span).clamp(0.0, 1.0);
    ys[lo] + t * (ys[hi] - ys[lo])
}

/// Find a header index by name (case-insensitive).
fn find_header_index(headers: &[&str], name: &str) -> Option<usize> {
    let name_lower = name.to_lowercase();
    headers.iter().position(|h| h.to_lowercase() == name_lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_schema_builder() {
        let schema = TargetCsvSchema::builder().input_column("step").value_column("L").build();
        assert_eq!(schema.input_column, Some("step".to_string()));
        assert_eq!(schema.value_column, Some("L".to_string()));
    }

    #[test]
    fn test_find_header_index() {
        let headers = ["Input", "Density"];
        assert_eq!(find_header_index(&headers, "input"), Some(0));
        assert_eq!(find_header_index(&headers, "DENSITY"), Some(1));
        assert_eq!(find_header_index(&headers, "unknown"), None);
    }

    #[test]
    fn test_percent_inputs_are_scaled_and_sorted() {
        let data = "percent,density\n100,0.9\n0,0.0\n50,0.5\n";
        let samples = TargetCsv::auto_detect().import_reader(data.as_bytes()).unwrap();
        assert_eq!(samples.samples, vec![0.0, 0.5, 0.9]);
        assert_eq!((samples.domain_min, samples.domain_max), (0.0, 1.0));
    }

    #[test]
    fn test_uneven_rows_are_resampled() {
        let data = "x,y\n0,0\n0.25,0.5\n1,1\n";
        let samples = TargetCsv::auto_detect().import_reader(data.as_bytes()).unwrap();
        assert_eq!(samples.samples.len(), 3);
        // Grid 0, 0.5, 1: 0.5 lies on the segment from (0.25, 0.5) to (1, 1)
        assert!((samples.samples[1] - (0.5 + 0.25 / 0.75 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_headerless_file() {
        let samples = TargetCsv::auto_detect().import_reader("0,0.1\n1,0.8\n".as_bytes()).unwrap();
        assert_eq!(samples.samples.len(), 2);
        assert!((samples.samples[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_custom_value_column() {
        let data = "in,L*,density\n0,100,0\n1,10,1\n";
        let schema = TargetCsvSchema::builder().value_column("L*").build();
        let samples = TargetCsv::new(schema).import_reader(data.as_bytes()).unwrap();
        assert_eq!(samples.samples, vec![100.0, 10.0]);
    }

    #[test]
    fn test_rejects_single_row_and_bad_values() {
        let err = TargetCsv::auto_detect().import_reader("input,value\n0,0.5\n".as_bytes());
        assert!(matches!(err, Err(Error::CsvImport { .. })));

        let err = TargetCsv::auto_detect().import_reader("input,value\n0,0.5\n1,abc\n".as_bytes());
        assert!(matches!(err, Err(Error::CsvImport { line: 3, .. })));

        let err = TargetCsv::auto_detect().import_reader("foo,bar\n0,1\n".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn test_import_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "input,target").unwrap();
        for i in 0..=10 {
            writeln!(file, "{},{}", i * 10, f64::from(i) / 10.0).unwrap();
        }
        let samples = TargetCsv::auto_detect().import(file.path()).unwrap();
        assert_eq!(samples.samples.len(), 11);
        assert!((samples.samples[5] - 0.5).abs() < 1e-12);
    }
}
