//! # Output tables and contour layers
//!
//! | Writer                      | Columns                                                                 |
//! |-----------------------------|-------------------------------------------------------------------------|
//! | [`write_trials_csv`]        | `bird_id, sample_size, trial, area_m2, h_value`                         |
//! | [`write_summary_csv`]       | `bird_id, sample_size, n_trials, n_valid, mean_area, std_error`         |
//! | [`write_area_table_csv`]    | `bird_id, n_points, h_ref, percent, area_m2`                            |
//! | [`write_condition_csv`]     | `bird_id, habitat, wing_length, weight, condition_index`                |
//! | [`write_model_table_csv`]   | `rank, model, n, k, log_likelihood, aicc, delta_aicc, weight, r_squared` |
//!
//! Missing values (failed trials, summaries without valid trials) are written as empty
//! fields. Every writer accepts any [`std::io::Write`]; use [`create_file`] for paths.
//!
//! [`contours_to_geojson`] turns home-range outlines into a GeoJSON `FeatureCollection`
//! of `Polygon`s. Coordinates stay in projected meters unless a [`UtmProjection`] is
//! given, in which case they are converted back to longitude/latitude.
use std::{fs::File, io::Write, path::Path};

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    condition::ConditionScore,
    constants::BirdId,
    home_range::{AreaRow, HomeRangeEstimate, Ring},
    models::ModelSelection,
    projection::UtmProjection,
    territory_errors::TerritoryError,
    validation::{SampleSizeSummary, TrialLedger},
};

/// Create (or truncate) an output file, naming it in the error.
pub fn create_file(path: impl AsRef<Path>) -> Result<File, TerritoryError> {
    let path = path.as_ref();
    File::create(path).map_err(|e| {
        TerritoryError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

fn write_rows<'a, W, T>(writer: W, rows: impl IntoIterator<Item = &'a T>) -> Result<(), TerritoryError>
where
    W: Write,
    T: Serialize + 'a,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// One line per trial, in ledger order.
pub fn write_trials_csv<W: Write>(writer: W, ledger: &TrialLedger) -> Result<(), TerritoryError> {
    write_rows(writer, ledger.trials())
}

pub fn write_summary_csv<W: Write>(
    writer: W,
    summaries: &[SampleSizeSummary],
) -> Result<(), TerritoryError> {
    write_rows(writer, summaries)
}

pub fn write_area_table_csv<W: Write>(writer: W, rows: &[AreaRow]) -> Result<(), TerritoryError> {
    write_rows(writer, rows)
}

pub fn write_condition_csv<W: Write>(
    writer: W,
    scores: &[ConditionScore],
) -> Result<(), TerritoryError> {
    write_rows(writer, scores)
}

#[derive(Serialize)]
struct ModelTableRow<'a> {
    rank: usize,
    model: &'a str,
    n: usize,
    k: usize,
    log_likelihood: f64,
    aicc: f64,
    delta_aicc: f64,
    weight: f64,
    r_squared: f64,
}

/// AICc table of a model selection, best model first.
pub fn write_model_table_csv<W: Write>(
    writer: W,
    selection: &ModelSelection,
) -> Result<(), TerritoryError> {
    let rows: Vec<ModelTableRow> = selection
        .models
        .iter()
        .enumerate()
        .map(|(i, m)| ModelTableRow {
            rank: i + 1,
            model: m.name,
            n: m.n,
            k: m.k,
            log_likelihood: m.log_likelihood,
            aicc: m.aicc,
            delta_aicc: m.delta_aicc,
            weight: m.weight,
            r_squared: m.r_squared,
        })
        .collect();
    write_rows(writer, &rows)
}

/// Closed GeoJSON linear ring (first position repeated at the end).
fn ring_coordinates(
    ring: &Ring,
    projection: Option<&UtmProjection>,
) -> Result<Vec<[f64; 2]>, TerritoryError> {
    let mut coords = ring
        .iter()
        .map(|p| match projection {
            Some(proj) => proj.inverse(p.x, p.y).map(|(lon, lat)| [lon, lat]),
            None => Ok([p.x, p.y]),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    Ok(coords)
}

/// Build a GeoJSON `FeatureCollection` from home-range outlines.
///
/// Arguments
/// -----------------
/// * `estimates`: `(bird, estimate)` pairs, as returned by
///   [`area_table`](crate::home_range::area_table).
/// * `projection`: convert vertices back to longitude/latitude when given.
///
/// Return
/// ----------
/// * One `Polygon` feature per contour ring, with `bird_id`, `percent`, `area_m2` and
///   `ring` (index within the estimate) properties.
pub fn contours_to_geojson(
    estimates: &[(BirdId, HomeRangeEstimate)],
    projection: Option<&UtmProjection>,
) -> Result<Value, TerritoryError> {
    let mut features = Vec::new();
    for (bird, est) in estimates {
        for (i, ring) in est.contour.iter().enumerate() {
            features.push(json!({
                "type": "Feature",
                "properties": {
                    "bird_id": bird,
                    "percent": est.percent,
                    "area_m2": est.area_m2,
                    "ring": i,
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [ring_coordinates(ring, projection)?],
                },
            }));
        }
    }
    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

pub fn write_geojson<W: Write>(writer: W, collection: &Value) -> Result<(), TerritoryError> {
    serde_json::to_writer_pretty(writer, collection)?;
    Ok(())
}

#[cfg(test)]
mod export_test {
    use super::*;
    use crate::validation::TrialResult;
    use nalgebra::Point2;

    #[test]
    fn test_trials_csv_empty_missing_area() {
        let mut ledger = TrialLedger::new();
        ledger.record(TrialResult {
            bird_id: "A".into(),
            sample_size: 10,
            trial: 0,
            area_m2: Some(1250.5),
            h_value: 12.0,
        });
        ledger.record(TrialResult {
            bird_id: "A".into(),
            sample_size: 10,
            trial: 1,
            area_m2: None,
            h_value: 12.0,
        });

        let mut buf = Vec::new();
        write_trials_csv(&mut buf, &ledger).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "bird_id,sample_size,trial,area_m2,h_value\nA,10,0,1250.5,12.0\nA,10,1,,12.0\n"
        );
    }

    #[test]
    fn test_geojson_rings_are_closed() {
        let est = HomeRangeEstimate {
            percent: 95.0,
            area_m2: 1.0,
            bandwidth: 1.0,
            cell_size: 0.1,
            n_points: 10,
            contour: vec![vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ]],
        };
        let fc = contours_to_geojson(&[("A".into(), est)], None).unwrap();
        assert_eq!(fc["type"], "FeatureCollection");
        let feature = &fc["features"][0];
        assert_eq!(feature["properties"]["bird_id"], "A");
        assert_eq!(feature["properties"]["percent"], 95.0);
        assert_eq!(feature["geometry"]["type"], "Polygon");
        let ring = feature["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn test_geojson_back_to_lon_lat() {
        let proj = UtmProjection::new(17, false).unwrap();
        let (e, n) = proj.forward(-81.0, 42.0).unwrap();
        let est = HomeRangeEstimate {
            percent: 50.0,
            area_m2: 100.0,
            bandwidth: 5.0,
            cell_size: 1.0,
            n_points: 8,
            contour: vec![vec![
                Point2::new(e, n),
                Point2::new(e + 10.0, n),
                Point2::new(e, n + 10.0),
            ]],
        };
        let fc = contours_to_geojson(&[("B".into(), est)], Some(&proj)).unwrap();
        let first = &fc["features"][0]["geometry"]["coordinates"][0][0];
        assert!((first[0].as_f64().unwrap() + 81.0).abs() < 1e-9);
        assert!((first[1].as_f64().unwrap() - 42.0).abs() < 1e-9);
    }
}
