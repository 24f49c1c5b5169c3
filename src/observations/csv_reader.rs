//! # Delimited input readers
//!
//! Readers for the three field sheets consumed by the pipeline:
//!
//! | Sheet            | Required columns                                                        |
//! |------------------|-------------------------------------------------------------------------|
//! | territories      | bird id, longitude, latitude (names configurable, timestamp optional)   |
//! | body condition   | `bird_id, wing_length, weight, habitat`                                 |
//! | combined models  | `bird_id, habitat, dialect, age, noise, comm_distance, condition, area_75` |
//!
//! Headers are validated **by name** before any row is parsed, so column order in the file
//! does not matter and extra metadata columns are ignored. A missing column, or a field that
//! does not parse to the expected type, is reported as [`TerritoryError::SchemaError`]
//! naming the row and column.
use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    condition::ConditionRecord, models::ModelRecord, observations::RawRelocation,
    territory_errors::TerritoryError,
};

/// Column names of the territory sheet.
#[derive(Debug, Clone)]
pub struct RelocationColumns {
    pub bird_id: String,
    pub longitude: String,
    pub latitude: String,
    /// Optional timestamp column, kept verbatim when present in the file
    pub timestamp: Option<String>,
}

impl Default for RelocationColumns {
    fn default() -> Self {
        RelocationColumns {
            bird_id: "bird_id".into(),
            longitude: "longitude".into(),
            latitude: "latitude".into(),
            timestamp: Some("timestamp".into()),
        }
    }
}

pub const CONDITION_COLUMNS: [&str; 4] = ["bird_id", "wing_length", "weight", "habitat"];

pub const MODEL_COLUMNS: [&str; 8] = [
    "bird_id",
    "habitat",
    "dialect",
    "age",
    "noise",
    "comm_distance",
    "condition",
    "area_75",
];

fn open(path: impl AsRef<Path>) -> Result<File, TerritoryError> {
    let path = path.as_ref();
    File::open(path).map_err(|e| {
        TerritoryError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, TerritoryError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| TerritoryError::SchemaError(format!("missing required column '{name}'")))
}

fn require_columns(headers: &StringRecord, names: &[&str]) -> Result<(), TerritoryError> {
    names
        .iter()
        .try_for_each(|name| column_index(headers, name).map(|_| ()))
}

fn parse_f64(record: &StringRecord, idx: usize, row: usize, column: &str) -> Result<f64, TerritoryError> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|_| {
        TerritoryError::SchemaError(format!(
            "row {row}: column '{column}' expects a number, found '{raw}'"
        ))
    })
}

/// Turn a per-row csv failure into a [`TerritoryError::SchemaError`] naming the row and,
/// when known, the column. I/O and UTF-8 failures stay [`TerritoryError::CsvError`].
fn row_error(err: csv::Error, headers: &StringRecord, fallback_row: usize) -> TerritoryError {
    let row = |pos: Option<&csv::Position>| pos.map_or(fallback_row as u64, csv::Position::line);
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths { pos, expected_len, len } => format!(
            "row {}: expected {expected_len} fields, found {len}",
            row(pos.as_ref())
        ),
        csv::ErrorKind::Deserialize { pos, err: de } => {
            let column = de
                .field()
                .and_then(|idx| headers.get(idx as usize))
                .unwrap_or("?");
            format!("row {}: column '{column}': {}", row(pos.as_ref()), de.kind())
        }
        _ => return TerritoryError::CsvError(err),
    };
    TerritoryError::SchemaError(message)
}

/// Read the territory sheet from any reader.
///
/// Arguments
/// -----------------
/// * `reader`: the delimited text source, header line first.
/// * `columns`: names of the bird id / longitude / latitude (and optional timestamp) columns.
/// * `delimiter`: field separator byte (`b','`, `b';'`, `b'\t'`).
///
/// Return
/// ----------
/// * The relocations in file order, or a [`TerritoryError::SchemaError`].
pub fn read_relocations_from_reader<R: Read>(
    reader: R,
    columns: &RelocationColumns,
    delimiter: u8,
) -> Result<Vec<RawRelocation>, TerritoryError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let id_idx = column_index(&headers, &columns.bird_id)?;
    let lon_idx = column_index(&headers, &columns.longitude)?;
    let lat_idx = column_index(&headers, &columns.latitude)?;
    let ts_idx = columns
        .timestamp
        .as_deref()
        .and_then(|name| headers.iter().position(|h| h.trim() == name));

    let mut relocations = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        // header is line 1
        let row = i + 2;
        let record = record.map_err(|e| row_error(e, &headers, row))?;
        let bird_id = record.get(id_idx).unwrap_or("").trim();
        if bird_id.is_empty() {
            return Err(TerritoryError::SchemaError(format!(
                "row {row}: empty '{}'",
                columns.bird_id
            )));
        }
        relocations.push(RawRelocation {
            bird_id: bird_id.into(),
            longitude: parse_f64(&record, lon_idx, row, &columns.longitude)?,
            latitude: parse_f64(&record, lat_idx, row, &columns.latitude)?,
            recorded_at: ts_idx
                .and_then(|idx| record.get(idx))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        });
    }
    debug!(rows = relocations.len(), "territory sheet read");
    Ok(relocations)
}

/// Read the territory sheet from a file. See [`read_relocations_from_reader`].
pub fn read_relocations(
    path: impl AsRef<Path>,
    columns: &RelocationColumns,
    delimiter: u8,
) -> Result<Vec<RawRelocation>, TerritoryError> {
    read_relocations_from_reader(open(path)?, columns, delimiter)
}

/// Validate the headers by name, then deserialize each row into `T`.
fn read_typed<T: DeserializeOwned, R: Read>(
    reader: R,
    required: &[&str],
    delimiter: u8,
) -> Result<Vec<T>, TerritoryError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    require_columns(&headers, required)?;

    rdr.deserialize::<T>()
        .enumerate()
        .map(|(i, rec)| rec.map_err(|e| row_error(e, &headers, i + 2)))
        .collect()
}

/// Read the body-condition sheet (`bird_id, wing_length, weight, habitat`).
pub fn read_condition_records_from_reader<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<ConditionRecord>, TerritoryError> {
    read_typed(reader, &CONDITION_COLUMNS, delimiter)
}

pub fn read_condition_records(
    path: impl AsRef<Path>,
    delimiter: u8,
) -> Result<Vec<ConditionRecord>, TerritoryError> {
    read_condition_records_from_reader(open(path)?, delimiter)
}

/// Read the combined model sheet.
pub fn read_model_records_from_reader<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<ModelRecord>, TerritoryError> {
    read_typed(reader, &MODEL_COLUMNS, delimiter)
}

pub fn read_model_records(
    path: impl AsRef<Path>,
    delimiter: u8,
) -> Result<Vec<ModelRecord>, TerritoryError> {
    read_model_records_from_reader(open(path)?, delimiter)
}

#[cfg(test)]
mod csv_reader_test {
    use super::*;
    use crate::condition::Habitat;

    #[test]
    fn test_read_relocations_by_name() {
        let data = "\
site,latitude,bird_id,longitude,timestamp
A1,42.10,RB-1,-81.20,2019-05-12 06:31
A1,42.11,RB-1,-81.21,
B2,42.30,RB-2,-80.90,2019-05-13 07:02
";
        let relocs =
            read_relocations_from_reader(data.as_bytes(), &RelocationColumns::default(), b',')
                .unwrap();
        assert_eq!(relocs.len(), 3);
        assert_eq!(relocs[0].bird_id.as_str(), "RB-1");
        assert_eq!(relocs[0].longitude, -81.20);
        assert_eq!(relocs[0].latitude, 42.10);
        assert_eq!(relocs[0].recorded_at.as_deref(), Some("2019-05-12 06:31"));
        assert_eq!(relocs[1].recorded_at, None);
    }

    #[test]
    fn test_read_relocations_custom_columns() {
        let data = "ID;X;Y\nw1;-81.2;42.1\n";
        let cols = RelocationColumns {
            bird_id: "ID".into(),
            longitude: "X".into(),
            latitude: "Y".into(),
            timestamp: None,
        };
        let relocs = read_relocations_from_reader(data.as_bytes(), &cols, b';').unwrap();
        assert_eq!(relocs, vec![RawRelocation::new("w1", -81.2, 42.1)]);
    }

    #[test]
    fn test_read_relocations_schema_errors() {
        let missing = "bird_id,longitude\nA,-81.2\n";
        assert_eq!(
            read_relocations_from_reader(missing.as_bytes(), &RelocationColumns::default(), b','),
            Err(TerritoryError::SchemaError(
                "missing required column 'latitude'".into()
            ))
        );

        let mistyped = "bird_id,longitude,latitude\nA,-81.2,42.1\nA,west,42.1\n";
        assert_eq!(
            read_relocations_from_reader(mistyped.as_bytes(), &RelocationColumns::default(), b','),
            Err(TerritoryError::SchemaError(
                "row 3: column 'longitude' expects a number, found 'west'".into()
            ))
        );
    }

    #[test]
    fn test_read_condition_records() {
        let data = "bird_id,habitat,weight,wing_length,notes\nA,Urban,11.2,58.5,x\nB,rural,10.9,57.0,\n";
        let recs = read_condition_records_from_reader(data.as_bytes(), b',').unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].habitat, Habitat::Urban);
        assert_eq!(recs[1].habitat, Habitat::Rural);
        assert_eq!(recs[1].wing_length, 57.0);

        let missing = "bird_id,weight,habitat\nA,11.2,urban\n";
        assert_eq!(
            read_condition_records_from_reader(missing.as_bytes(), b','),
            Err(TerritoryError::SchemaError(
                "missing required column 'wing_length'".into()
            ))
        );

        let mistyped = "bird_id,wing_length,weight,habitat\nA,long,11.2,urban\n";
        match read_condition_records_from_reader(mistyped.as_bytes(), b',') {
            Err(TerritoryError::SchemaError(msg)) => {
                assert!(msg.starts_with("row 2: column 'wing_length'"), "{msg}")
            }
            other => panic!("expected a schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_short_rows_are_schema_errors() {
        let data = "bird_id,longitude,latitude\nA,-81.2,42.1\nA,-81.3\n";
        assert_eq!(
            read_relocations_from_reader(data.as_bytes(), &RelocationColumns::default(), b','),
            Err(TerritoryError::SchemaError(
                "row 3: expected 3 fields, found 2".into()
            ))
        );

        let header = MODEL_COLUMNS.join(",");
        let data = format!("{header}\nRB-1,urban,north,ASY,55.0,120.0\n");
        assert_eq!(
            read_model_records_from_reader(data.as_bytes(), b','),
            Err(TerritoryError::SchemaError(
                "row 2: expected 8 fields, found 6".into()
            ))
        );
    }

    #[test]
    fn test_model_sheet_mistyped_column_is_named() {
        let header = MODEL_COLUMNS.join(",");
        let data = format!(
            "{header}\nRB-1,urban,north,ASY,55.0,120.0,11.2,3400.0\nRB-2,rural,south,SY,loud,90.0,10.8,2100.0\n"
        );
        match read_model_records_from_reader(data.as_bytes(), b',') {
            Err(TerritoryError::SchemaError(msg)) => {
                assert!(msg.starts_with("row 3: column 'noise'"), "{msg}")
            }
            other => panic!("expected a schema error, got {other:?}"),
        }
    }
}
