//! Input rows and their normalized upload records.

pub mod timestamp;

use std::collections::HashMap;
use std::path::Path;

use crate::config::ColumnConfig;
use crate::error::{Result, UploadError};

pub use timestamp::normalize_timestamp;

/// One CSV row keyed by header name.
pub type Row = HashMap<String, String>;

/// Captive/wild classification from the input sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wildness {
    Wild,
    Captive,
    #[default]
    Unknown,
}

impl Wildness {
    /// Value of the `agree` field of the "wild" quality vote.
    pub fn vote(&self) -> Option<bool> {
        match self {
            Wildness::Wild => Some(true),
            Wildness::Captive => Some(false),
            Wildness::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub sample_id: String,
    pub taxon_name: Option<String>,
    pub observed_on: Option<String>,
    pub raw_x: Option<f64>,
    pub raw_y: Option<f64>,
    /// Geographic (latitude, longitude), filled by the coordinate resolver.
    pub location: Option<(f64, f64)>,
    pub upload: bool,
    pub wildness: Wildness,
    pub collector_inat: Option<String>,
    pub collector_name: Option<String>,
    pub project_code: Option<String>,
}

impl UploadRecord {
    /// Tag that identifies this sample on the remote service.
    pub fn unique_tag(&self) -> String {
        unique_tag(&self.sample_id)
    }
}

pub fn unique_tag(sample_id: &str) -> String {
    format!("emi_external_id:{}", sample_id)
}

/// Maps rows to records using the configured column names.
pub struct RowExtractor {
    columns: ColumnConfig,
}

impl RowExtractor {
    pub fn new(columns: ColumnConfig) -> Self {
        Self { columns }
    }

    /// `row_number` is 1-based and only used for error reporting.
    pub fn extract(&self, row_number: usize, row: &Row) -> Result<UploadRecord> {
        let c = &self.columns;

        let sample_id = text(row, &c.sample_id).ok_or_else(|| UploadError::MalformedRow {
            row: row_number,
            reason: format!("missing value in column '{}'", c.sample_id),
        })?;

        // Both values end up in the comma-separated tag list
        if sample_id.contains(',') {
            return Err(UploadError::MalformedRow {
                row: row_number,
                reason: format!("comma in sample id '{}'", sample_id),
            });
        }
        let project_code = text(row, &c.project_code);
        if let Some(code) = project_code.as_deref().filter(|code| code.contains(',')) {
            return Err(UploadError::MalformedRow {
                row: row_number,
                reason: format!("comma in project code '{}'", code),
            });
        }

        Ok(UploadRecord {
            sample_id,
            taxon_name: text(row, &c.taxon_name).or_else(|| text(row, &c.taxon_alt_name)),
            observed_on: row.get(&c.date).and_then(|v| normalize_timestamp(v)),
            raw_x: number(row, &c.x),
            raw_y: number(row, &c.y),
            location: None,
            upload: row.get(&c.upload).map(|v| parse_flag(v)).unwrap_or(false),
            wildness: row
                .get(&c.is_wild)
                .map(|v| parse_wildness(v))
                .unwrap_or_default(),
            collector_inat: text(row, &c.collector_inat),
            collector_name: text(row, &c.collector_name),
            project_code,
        })
    }
}

/// Read every row of a CSV file with headers.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<Row>() {
        rows.push(row?);
    }
    Ok(rows)
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !is_missing_marker(v))
        .map(|v| v.to_string())
}

fn number(row: &Row, column: &str) -> Option<f64> {
    row.get(column)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

// Spreadsheet exports write empty cells as NaN/NA.
fn is_missing_marker(value: &str) -> bool {
    matches!(value, "nan" | "NaN" | "NA" | "None" | "null")
}

fn parse_flag(raw: &str) -> bool {
    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "true" | "yes" | "y" => true,
        _ => value.parse::<f64>().map(|n| n == 1.0).unwrap_or(false),
    }
}

fn parse_wildness(raw: &str) -> Wildness {
    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "true" | "yes" | "y" | "wild" => Wildness::Wild,
        "false" | "no" | "n" | "captive" => Wildness::Captive,
        _ => match value.parse::<f64>() {
            Ok(n) if n == 1.0 => Wildness::Wild,
            Ok(n) if n == 0.0 => Wildness::Captive,
            _ => Wildness::Unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn extractor() -> RowExtractor {
        RowExtractor::new(ColumnConfig::default())
    }

    #[test]
    fn test_extract_full_row() {
        let r = row(&[
            ("sample_id", " dbgi_008572 "),
            ("taxon_name", "Gentiana lutea"),
            ("date", "20230714"),
            ("longitude", "7.1"),
            ("latitude", "46.03"),
            ("inat_upload", "1.0"),
            ("is_wild", "0"),
            ("collector_inat", "ifedenat25"),
            ("project_code", "dbgi"),
        ]);

        let record = extractor().extract(1, &r).unwrap();
        assert_eq!(record.sample_id, "dbgi_008572");
        assert_eq!(record.taxon_name.as_deref(), Some("Gentiana lutea"));
        assert_eq!(record.observed_on.as_deref(), Some("2023-07-14T00:00:00"));
        assert_eq!(record.raw_x, Some(7.1));
        assert_eq!(record.raw_y, Some(46.03));
        assert!(record.upload);
        assert_eq!(record.wildness, Wildness::Captive);
        assert_eq!(record.collector_inat.as_deref(), Some("ifedenat25"));
        assert_eq!(record.project_code.as_deref(), Some("dbgi"));
        assert_eq!(record.location, None);
        assert_eq!(record.unique_tag(), "emi_external_id:dbgi_008572");
    }

    #[test]
    fn test_empty_sample_id_is_malformed() {
        let r = row(&[("sample_id", "  "), ("inat_upload", "1")]);
        match extractor().extract(4, &r) {
            Err(UploadError::MalformedRow { row, .. }) => assert_eq!(row, 4),
            other => panic!("expected MalformedRow, got {:?}", other),
        }

        let r = row(&[("inat_upload", "1")]);
        assert!(matches!(
            extractor().extract(5, &r),
            Err(UploadError::MalformedRow { .. })
        ));
    }

    #[test]
    fn test_comma_in_tag_values_is_malformed() {
        let r = row(&[("sample_id", "dbgi_1,dbgi_2"), ("inat_upload", "1")]);
        assert!(matches!(
            extractor().extract(2, &r),
            Err(UploadError::MalformedRow { row: 2, .. })
        ));

        let r = row(&[
            ("sample_id", "dbgi_1"),
            ("project_code", "dbgi,emi"),
            ("inat_upload", "1"),
        ]);
        match extractor().extract(3, &r) {
            Err(UploadError::MalformedRow { row, reason }) => {
                assert_eq!(row, 3);
                assert!(reason.contains("project code"));
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_numbers_become_none() {
        let r = row(&[
            ("sample_id", "a1"),
            ("longitude", "n/a"),
            ("latitude", ""),
        ]);
        let record = extractor().extract(1, &r).unwrap();
        assert_eq!(record.raw_x, None);
        assert_eq!(record.raw_y, None);
        assert!(!record.upload);
        assert_eq!(record.wildness, Wildness::Unknown);
    }

    #[test]
    fn test_alternate_taxon_column() {
        let r = row(&[
            ("sample_id", "a1"),
            ("taxon_name", "nan"),
            ("taxon_alt_name", "Abies alba"),
        ]);
        let record = extractor().extract(1, &r).unwrap();
        assert_eq!(record.taxon_name.as_deref(), Some("Abies alba"));
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert_eq!(parse_wildness("1.0"), Wildness::Wild);
        assert_eq!(parse_wildness("no"), Wildness::Captive);
        assert_eq!(parse_wildness("2"), Wildness::Unknown);
        assert_eq!(Wildness::Captive.vote(), Some(false));
    }

    #[test]
    fn test_read_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id,taxon_name,inat_upload").unwrap();
        writeln!(file, "s1,Abies alba,1").unwrap();
        writeln!(file, ",,1").unwrap();
        file.flush().unwrap();

        let rows = read_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["taxon_name"], "Abies alba");
        assert_eq!(rows[1]["sample_id"], "");
    }
}
