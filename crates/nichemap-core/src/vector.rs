//! Occurrence-record input: point coordinates from an OGR-readable vector
//! layer, or from a CSV file with named x/y columns.

use std::path::Path;

use gdal::vector::LayerAccess;

use crate::error::{Error, Result};
use crate::sample::Coordinate;

/// Read occurrence coordinates from `path`.
///
/// `.csv` and `.txt` files are parsed as delimited text using the named
/// x/y columns; anything else is opened through OGR and its first layer's
/// point (or multipoint) geometries are collected.
pub fn read_occurrences(path: &Path, x_field: &str, y_field: &str) -> Result<Vec<Coordinate>> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") | Some("txt") => read_csv_points(path, x_field, y_field),
        _ => read_layer_points(path),
    }
}

fn read_csv_points(path: &Path, x_field: &str, y_field: &str) -> Result<Vec<Coordinate>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let find = |field: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(field))
            .ok_or_else(|| {
                Error::data(format!(
                    "column '{field}' not found in {} (columns: {})",
                    path.display(),
                    headers.iter().collect::<Vec<_>>().join(", ")
                ))
            })
    };
    let x_index = find(x_field)?;
    let y_index = find(y_field)?;

    let mut points = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let parse = |index: usize, field: &str| -> Result<f64> {
            record
                .get(index)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    Error::data(format!(
                        "row {} of {}: '{field}' is not numeric",
                        line + 2,
                        path.display()
                    ))
                })
        };
        points.push((parse(x_index, x_field)?, parse(y_index, y_field)?));
    }
    Ok(points)
}

fn read_layer_points(path: &Path) -> Result<Vec<Coordinate>> {
    let mut dataset = gdal::Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;
    let mut points = Vec::new();
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        if geometry.geometry_count() > 0 {
            for part in 0..geometry.geometry_count() {
                let (x, y, _) = geometry.get_geometry(part).get_point(0);
                points.push((x, y));
            }
        } else {
            let (x, y, _) = geometry.get_point(0);
            points.push((x, y));
        }
    }
    if points.is_empty() {
        return Err(Error::data(format!(
            "no point features found in {}",
            path.display()
        )));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_points_are_read_by_named_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occurrences.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id,Easting,Northing").unwrap();
        writeln!(file, "1,500010.5,4649990.5").unwrap();
        writeln!(file, "2,500020.0,4649980.0").unwrap();
        drop(file);
        let points = read_occurrences(&path, "easting", "northing").unwrap();
        assert_eq!(points, vec![(500010.5, 4649990.5), (500020.0, 4649980.0)]);
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occurrences.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let err = read_occurrences(&path, "x", "y").unwrap_err();
        assert!(err.to_string().contains("'x' not found"));
    }

    #[test]
    fn non_numeric_coordinate_is_reported_with_its_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("occurrences.csv");
        std::fs::write(&path, "x,y\n1.0,2.0\nbad,3.0\n").unwrap();
        let err = read_occurrences(&path, "x", "y").unwrap_err();
        assert!(err.to_string().contains("row 3"));
    }
}
