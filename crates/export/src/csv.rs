//! Time-series CSV output for point extractions.
//!
//! Columns: input attributes, `point_index`, `time`, `latitude`, `longitude`,
//! then one column per variable under its display name. Fill values are
//! empty fields. Quoting follows RFC 4180.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat};
use era5_common::VariableCodeMapper;
use grid_processor::TimeSeriesTable;
use serde_json::Value;
use tracing::info;

use crate::error::ExportResult;

const FIXED_COLUMNS: [&str; 4] = ["point_index", "time", "latitude", "longitude"];

/// `era5_results_<start>_to_<end>.csv`
pub fn time_series_file_name(start: NaiveDate, end: NaiveDate) -> String {
    format!("era5_results_{}_to_{}.csv", start, end)
}

/// Header row, variables relabelled to display names.
pub fn header(table: &TimeSeriesTable) -> ExportResult<Vec<String>> {
    let mapper = VariableCodeMapper::era5_land();
    let mut columns = table.attribute_columns.clone();
    columns.extend(FIXED_COLUMNS.iter().map(|c| c.to_string()));
    for spec in &table.variables {
        let name = mapper
            .to_display(spec.internal_code)
            .map_err(|e| crate::error::ExportError::InvalidInput(e.to_string()))?;
        columns.push(name.to_string());
    }
    Ok(columns)
}

/// Write the table as CSV.
pub fn write_time_series<W: Write>(table: &TimeSeriesTable, mut out: W) -> ExportResult<()> {
    write_record(&mut out, header(table)?.iter().map(String::as_str))?;

    for row in &table.rows {
        let mut fields: Vec<String> = table
            .attribute_columns
            .iter()
            .map(|key| row.attributes.get(key).map(format_attribute).unwrap_or_default())
            .collect();
        fields.push(row.point_index.to_string());
        fields.push(row.time.to_rfc3339_opts(SecondsFormat::Secs, true));
        fields.push(row.latitude.to_string());
        fields.push(row.longitude.to_string());
        fields.extend(
            row.values
                .iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
        );
        write_record(&mut out, fields.iter().map(String::as_str))?;
    }

    out.flush()?;
    Ok(())
}

/// Write the table into `dir` under its conventional name.
pub fn write_time_series_file(
    table: &TimeSeriesTable,
    dir: &Path,
    start: NaiveDate,
    end: NaiveDate,
) -> ExportResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(time_series_file_name(start, end));
    let file = std::fs::File::create(&path)?;
    write_time_series(table, std::io::BufWriter::new(file))?;
    info!(path = %path.display(), rows = table.rows.len(), "Wrote time-series CSV");
    Ok(path)
}

fn write_record<'a, W, I>(out: &mut W, fields: I) -> ExportResult<()>
where
    W: Write,
    I: Iterator<Item = &'a str>,
{
    let line = fields.map(escape_field).collect::<Vec<_>>().join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")?;
    Ok(())
}

/// Quote a field when it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_attribute(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use era5_common::PointFeature;
    use grid_processor::PointSampler;
    use test_utils::{with_fill_cells, SyntheticGrid};

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_header_uses_display_names() {
        let grid = SyntheticGrid::new("t2m").indexed();
        let point = PointFeature::new(10.0, 45.5).with_attribute("site", "A, north");
        let table = PointSampler::default().sample(&[grid], &[point]).unwrap();

        let mut buf = Vec::new();
        write_time_series(&table, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.split("\r\n");

        assert_eq!(
            lines.next().unwrap(),
            "site,point_index,time,latitude,longitude,2m_temperature"
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"A, north\",0,2024-01-01T00:00:00Z,45.5,10,0"
        );
    }

    #[test]
    fn test_fill_is_empty_field() {
        let grid = with_fill_cells(SyntheticGrid::new("t2m").indexed(), &[(0, 0)]);
        let table = PointSampler::default()
            .sample(&[grid], &[PointFeature::new(10.0, 45.5)])
            .unwrap();

        let mut buf = Vec::new();
        write_time_series(&table, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).unwrap().ends_with("10,"));
    }

    #[test]
    fn test_file_name() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(
            time_series_file_name(start, end),
            "era5_results_2024-01-01_to_2024-01-03.csv"
        );
    }
}
