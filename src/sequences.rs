//! Offline construction of sliding-window training sequences from raw trips.
//!
//! Trips are grouped by a coarse origin/destination key, ordered by pickup
//! time, and each group with more than `window_len` trips yields
//! `n - window_len` windows of consecutive durations plus the next duration
//! as target.
//!
//! The sample cap applies to the whole run, not per group: route groups that
//! sort first can fill the dataset before later ones are reached.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use crate::error::BuildError;

pub const DEFAULT_WINDOW_LEN: usize = 10;
pub const DEFAULT_MAX_TOTAL: usize = 200_000;
/// 3 decimals ≈ 100 m of latitude.
pub const DEFAULT_ROUTE_PRECISION: u32 = 3;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MIN_DISTANCE_KM: f64 = 0.01;
const MIN_DURATION_MIN: f64 = 0.5;
const MAX_DURATION_MIN: f64 = 600.0;

const REQUIRED_COLUMNS: [&str; 6] = [
    "pickup_datetime",
    "pickup_latitude",
    "pickup_longitude",
    "dropoff_latitude",
    "dropoff_longitude",
    "trip_duration",
];

pub const X_FILE: &str = "X_seq.csv";
pub const Y_FILE: &str = "y_seq.csv";

#[derive(Debug, Deserialize)]
struct RawTrip {
    pickup_datetime: String,
    pickup_latitude: f64,
    pickup_longitude: f64,
    dropoff_latitude: f64,
    dropoff_longitude: f64,
    trip_duration: f64, // seconds
}

/// A retained trip with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub pickup_time: NaiveDateTime,
    pub pickup_hour: u32,
    pub pickup_dayofweek: u32, // Monday = 0
    pub distance_km: f64,
    pub duration_min: f64,
    pub route_key: String,
}

/// Counters describing one builder run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub rows_read: usize,
    pub rows_malformed: usize,
    pub rows_filtered: usize,
    pub route_groups: usize,
    pub samples: usize,
    pub cap_reached: bool,
}

/// `x[i]` is a window of `window_len` consecutive durations, `y[i]` the duration that followed.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDataset {
    pub window_len: usize,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl SequenceDataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Every duration appearing in a window, for fitting a scaler.
    pub fn window_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.x.iter().flatten().copied()
    }

    /// Write `X_seq.csv` (N x L) and `y_seq.csv` (N) into `out_dir`.
    pub fn write_csv(&self, out_dir: &Path) -> Result<(PathBuf, PathBuf), BuildError> {
        fs::create_dir_all(out_dir)?;
        let x_path = out_dir.join(X_FILE);
        let y_path = out_dir.join(Y_FILE);

        let mut w = csv::Writer::from_path(&x_path)?;
        let header: Vec<String> = (0..self.window_len).map(|i| format!("t{}", i)).collect();
        w.write_record(&header)?;
        for row in &self.x {
            w.write_record(row.iter().map(|v| v.to_string()))?;
        }
        w.flush()?;

        let mut w = csv::Writer::from_path(&y_path)?;
        w.write_record(["y"])?;
        for v in &self.y {
            w.write_record([v.to_string()])?;
        }
        w.flush()?;

        Ok((x_path, y_path))
    }
}

/// Great-circle distance in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Round half to even at `precision` decimals and print the shortest decimal
/// that reads back as the same float, keeping a `.0` on integral values
/// (`40.7`, `-74.0`, `40.761`).
///
/// Keys sort as text, so this format decides group order and with it which
/// groups the sample cap keeps.
fn quantize(v: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let rounded = (v * scale).round_ties_even() / scale;
    if rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

/// `"lat_lon|lat_lon"` with every coordinate rounded to `precision` decimals.
pub fn route_key(
    pickup_lat: f64,
    pickup_lon: f64,
    dropoff_lat: f64,
    dropoff_lon: f64,
    precision: u32,
) -> String {
    format!(
        "{}_{}|{}_{}",
        quantize(pickup_lat, precision),
        quantize(pickup_lon, precision),
        quantize(dropoff_lat, precision),
        quantize(dropoff_lon, precision)
    )
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}

#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    pub window_len: usize,
    pub max_total_samples: usize,
    pub route_precision: u32,
}

impl Default for SequenceBuilder {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
            max_total_samples: DEFAULT_MAX_TOTAL,
            route_precision: DEFAULT_ROUTE_PRECISION,
        }
    }
}

impl SequenceBuilder {
    pub fn new(window_len: usize, max_total_samples: usize) -> Self {
        Self {
            window_len,
            max_total_samples,
            ..Self::default()
        }
    }

    pub fn with_route_precision(mut self, precision: u32) -> Self {
        self.route_precision = precision;
        self
    }

    /// Parse a raw trip CSV and build windows from it.
    pub fn build<R: Read>(&self, source: R) -> Result<(SequenceDataset, BuildSummary), BuildError> {
        if self.window_len == 0 {
            return Err(BuildError::ZeroWindow);
        }
        let (records, mut summary) = self.parse_trips(source)?;
        let (dataset, windows) = self.build_windows(records);
        summary.route_groups = windows.route_groups;
        summary.samples = dataset.len();
        summary.cap_reached = windows.cap_reached;

        tracing::info!(
            rows_read = summary.rows_read,
            rows_malformed = summary.rows_malformed,
            rows_filtered = summary.rows_filtered,
            route_groups = summary.route_groups,
            samples = summary.samples,
            cap_reached = summary.cap_reached,
            "sequences built"
        );
        Ok((dataset, summary))
    }

    /// Parse rows, derive features, and keep trips that pass the retention filter.
    pub fn parse_trips<R: Read>(&self, source: R) -> Result<(Vec<TripRecord>, BuildSummary), BuildError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Ok((Vec::new(), BuildSummary::default()));
        }
        for col in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == col) {
                return Err(BuildError::MissingColumn(col));
            }
        }

        let mut summary = BuildSummary::default();
        let mut records = Vec::new();
        for row in rdr.deserialize::<RawTrip>() {
            summary.rows_read += 1;
            let raw = match row {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("skipping malformed trip row: {}", e);
                    summary.rows_malformed += 1;
                    continue;
                }
            };
            let Some(pickup_time) = parse_timestamp(&raw.pickup_datetime) else {
                tracing::debug!("skipping unparseable pickup_datetime `{}`", raw.pickup_datetime);
                summary.rows_malformed += 1;
                continue;
            };

            let distance_km = haversine_km(
                raw.pickup_latitude,
                raw.pickup_longitude,
                raw.dropoff_latitude,
                raw.dropoff_longitude,
            );
            let duration_min = raw.trip_duration / 60.0;
            // NaN fails every comparison and is filtered here too
            if !(distance_km > MIN_DISTANCE_KM
                && duration_min > MIN_DURATION_MIN
                && duration_min < MAX_DURATION_MIN)
            {
                summary.rows_filtered += 1;
                continue;
            }

            records.push(TripRecord {
                pickup_time,
                pickup_hour: pickup_time.hour(),
                pickup_dayofweek: pickup_time.weekday().num_days_from_monday(),
                distance_km,
                duration_min,
                route_key: route_key(
                    raw.pickup_latitude,
                    raw.pickup_longitude,
                    raw.dropoff_latitude,
                    raw.dropoff_longitude,
                    self.route_precision,
                ),
            });
        }
        Ok((records, summary))
    }

    /// Sort by `(route_key, pickup_time)` and slide a stride-1 window over each group.
    pub fn build_windows(&self, mut records: Vec<TripRecord>) -> (SequenceDataset, WindowStats) {
        let seq_len = self.window_len;
        records.sort_by(|a, b| {
            a.route_key
                .cmp(&b.route_key)
                .then_with(|| a.pickup_time.cmp(&b.pickup_time))
        });

        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut stats = WindowStats::default();

        for group in records.chunk_by(|a, b| a.route_key == b.route_key) {
            stats.route_groups += 1;
            if stats.cap_reached {
                continue;
            }
            let n = group.len();
            if n <= seq_len {
                continue;
            }
            let durations: Vec<f64> = group.iter().map(|r| r.duration_min).collect();
            for i in 0..n - seq_len {
                if y.len() >= self.max_total_samples {
                    break;
                }
                x.push(durations[i..i + seq_len].to_vec());
                y.push(durations[i + seq_len]);
            }
            if y.len() >= self.max_total_samples {
                stats.cap_reached = true;
            }
        }

        (
            SequenceDataset {
                window_len: seq_len,
                x,
                y,
            },
            stats,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub route_groups: usize,
    pub cap_reached: bool,
}
