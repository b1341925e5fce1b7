//! Reading telemetry samples from CSV.
//!
//! The minimal schema is a header row followed by one row per tick:
//!
//! | column | required | fallback |
//! |---|---|---|
//! | `timestamp` | no | row index |
//! | `util_pct` | yes | `cpu_util_pct` |
//! | `temp_c` | no | `battery_temp_c` |
//! | `power_w` | no | |
//! | `dt_s` | no | timestamp difference, then [`IngestOptions::default_dt_s`] |
//! | `device` | no | |
//!
//! Empty cells, `none`, and anything that does not parse as a number are
//! treated as absent.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::sample::Sample;

/// Options for [`parse_samples`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Interval used when neither a `dt_s` column nor timestamps yield one.
    pub default_dt_s: f64,
    /// Keep only rows whose `device` column equals this value.
    pub device_filter: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            default_dt_s: 1.0,
            device_filter: None,
        }
    }
}

/// Column positions resolved from the header.
#[derive(Debug, Default)]
struct Columns {
    timestamp: Option<usize>,
    util: Option<usize>,
    util_fallback: Option<usize>,
    temp: Option<usize>,
    temp_fallback: Option<usize>,
    power: Option<usize>,
    dt: Option<usize>,
    device: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
        };
        Self {
            timestamp: find("timestamp"),
            util: find("util_pct"),
            util_fallback: find("cpu_util_pct"),
            temp: find("temp_c"),
            temp_fallback: find("battery_temp_c"),
            power: find("power_w"),
            dt: find("dt_s"),
            device: find("device"),
        }
    }
}

fn invalid_data(e: csv::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// Read samples from a CSV file.
pub fn read_samples(path: &Path, options: &IngestOptions) -> std::io::Result<Vec<Sample>> {
    let file = File::open(path)?;
    parse_samples(file, options)
}

/// Parse samples from CSV text.
///
/// Fails with `InvalidData` when the header carries no utilization column or
/// the CSV itself is malformed.
pub fn parse_samples<R: Read>(reader: R, options: &IngestOptions) -> std::io::Result<Vec<Sample>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = csv_reader.headers().map_err(invalid_data)?.clone();
    if header.iter().all(str::is_empty) {
        return Ok(Vec::new());
    }

    let cols = Columns::from_header(&header);
    if cols.util.is_none() && cols.util_fallback.is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "CSV header has neither util_pct nor cpu_util_pct",
        ));
    }

    let default_dt = if options.default_dt_s > 0.0 { options.default_dt_s } else { 1.0 };
    let mut samples = Vec::new();
    let mut prev_ts: Option<f64> = None;
    let mut row_index = 0usize;
    let mut skipped = 0usize;

    for result in csv_reader.records() {
        let record = result.map_err(invalid_data)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i));

        if let Some(filter) = &options.device_filter {
            if cell(cols.device) != Some(filter.as_str()) {
                skipped += 1;
                continue;
            }
        }

        let parsed_ts = cell(cols.timestamp).and_then(parse_timestamp);
        let utilization = number(cell(cols.util))
            .or_else(|| number(cell(cols.util_fallback)))
            .unwrap_or(0.0);
        let temperature = number(cell(cols.temp)).or_else(|| number(cell(cols.temp_fallback)));
        let power = number(cell(cols.power));

        let dt = number(cell(cols.dt))
            .filter(|d| *d > 0.0)
            .or_else(|| match (parsed_ts, prev_ts) {
                (Some(cur), Some(prev)) if cur > prev => Some(cur - prev),
                _ => None,
            })
            .unwrap_or(default_dt);

        if parsed_ts.is_some() {
            prev_ts = parsed_ts;
        }
        let timestamp = parsed_ts.unwrap_or(row_index as f64);
        samples.push(Sample::new(timestamp, utilization, temperature, power, dt));
        row_index += 1;
    }

    if skipped > 0 {
        log::debug!("ingest: skipped {skipped} rows not matching the device filter");
    }
    log::debug!("ingest: parsed {} samples", samples.len());
    Ok(samples)
}

fn number(cell: Option<&str>) -> Option<f64> {
    let s = cell?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Date-time layouts tried after RFC 3339. `%.f` also matches no fraction.
const OFFSET_FORMATS: [&str; 1] = ["%Y-%m-%d %H:%M:%S%.f%:z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp as seconds since the Unix epoch.
///
/// Accepts plain numbers and ISO-8601 date-times
/// (`YYYY-MM-DD[T ]hh:mm:ss[.fff][Z|±hh:mm]`). Times without an offset are
/// taken as UTC. Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<f64>() {
        return v.is_finite().then_some(v);
    }

    let utc = DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| OFFSET_FORMATS.iter().find_map(|f| DateTime::parse_from_str(s, f).ok()))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|naive| naive.and_utc())
        })?;
    Some(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str) -> Vec<Sample> {
        parse_samples(csv.as_bytes(), &IngestOptions::default()).unwrap()
    }

    #[test]
    fn iso_timestamps() {
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z"), Some(0.0));
        assert_eq!(parse_timestamp("2000-01-01T00:00:00Z"), Some(946_684_800.0));
        assert_eq!(parse_timestamp("2000-01-01 00:00:01"), Some(946_684_801.0));
        assert_eq!(parse_timestamp("2000-01-01T01:00:00+01:00"), Some(946_684_800.0));
        let frac = parse_timestamp("2024-02-29T12:00:00.250Z").unwrap();
        assert!((frac - 1_709_208_000.25).abs() < 1e-6);
        assert_eq!(parse_timestamp("1712345678.5"), Some(1_712_345_678.5));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01T00:00:00Z"), None);
    }

    #[test]
    fn dt_from_timestamps_and_explicit_column() {
        let samples = parse(
            "timestamp,util_pct,temp_c,power_w\n\
             2025-01-01T00:00:00Z,50,60,40\n\
             2025-01-01T00:00:02Z,55,61,42\n\
             2025-01-01T00:00:10Z,60,,\n",
        );
        let dts: Vec<f64> = samples.iter().map(|s| s.dt_s).collect();
        assert_eq!(dts, vec![1.0, 2.0, 8.0]);
        assert_eq!(samples[2].temperature_c, None);
        assert_eq!(samples[2].power_w, None);

        let explicit = parse("util_pct,dt_s\n10,0.5\n20,0\n30,\n");
        let dts: Vec<f64> = explicit.iter().map(|s| s.dt_s).collect();
        assert_eq!(dts, vec![0.5, 1.0, 1.0]);
        assert_eq!(explicit[2].timestamp, 2.0);
    }

    #[test]
    fn column_fallbacks() {
        let samples = parse("timestamp,cpu_util_pct,battery_temp_c\n1,33,31.5\n2,none,\n");
        assert_eq!(samples[0].utilization_pct, 33.0);
        assert_eq!(samples[0].temperature_c, Some(31.5));
        assert_eq!(samples[1].utilization_pct, 0.0);
        assert_eq!(samples[1].temperature_c, None);
    }

    #[test]
    fn zero_readings_are_kept() {
        let samples = parse("util_pct,temp_c,power_w\n0,0,0\n");
        assert_eq!(samples[0].temperature_c, Some(0.0));
        assert_eq!(samples[0].power_w, Some(0.0));
    }

    #[test]
    fn device_filter() {
        let opts = IngestOptions {
            device_filter: Some("gpu0".to_string()),
            ..IngestOptions::default()
        };
        let csv = "timestamp,device,util_pct\n1,cpu,10\n1,gpu0,90\n2,cpu,11\n3,gpu0,80\n";
        let samples = parse_samples(csv.as_bytes(), &opts).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].utilization_pct, 80.0);
        assert_eq!(samples[1].dt_s, 2.0);
    }

    #[test]
    fn missing_utilization_column_is_invalid() {
        let err = parse_samples("timestamp,temp_c\n1,40\n".as_bytes(), &IngestOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn quoted_fields_and_crlf() {
        let samples = parse("\"timestamp\",\"util_pct\",note\r\n1,\"42\",\"a, b\"\r\n");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].utilization_pct, 42.0);
    }

    #[test]
    fn malformed_offsets_are_absent_not_fatal() {
        assert_eq!(parse_timestamp("2025-01-01T00:00:00+1\u{e9}1"), None);
        assert_eq!(parse_timestamp("2025-01-01T00:00:00+\u{e9}\u{e9}"), None);
        assert_eq!(parse_timestamp("2025-01-01T00:00:00+ab:cd"), None);

        let samples = parse("timestamp,util_pct\n1,10\n2025-01-01T00:00:00+1\u{e9}1,20\n");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp, 1.0);
        assert_eq!(samples[1].utilization_pct, 20.0);
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let samples = parse("timestamp,util_pct,note\n1,10,\"line one\nline two\"\n2,20,plain\n");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].utilization_pct, 20.0);
        assert_eq!(samples[1].dt_s, 1.0);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let samples = parse("timestamp,util_pct,temp_c,power_w\n1,10\n2,20,41,12\n");
        assert_eq!(samples[0].temperature_c, None);
        assert_eq!(samples[1].power_w, Some(12.0));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
    }
}
