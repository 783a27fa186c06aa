use chrono::{NaiveDateTime, Timelike};

use crate::error::Error;
use crate::meter::Measurement;

const SECONDS_IN_HOUR: f64 = 3600.0;
pub const DATETIME_FORMAT: &str = "%d-%m-%y %H:%M:%S";

/// Offline cleaning of exported measurements.
///
/// Times are unix seconds; `between_hours` and excluded windows are given in
/// the local time of the camera, `utc_offset_hours` away from UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementFilter {
    pub utc_offset_hours: i32,
    pub max_speed_kmh: f32,
    /// Min gap (s) between the end times of two consecutive rows
    pub min_time_diff: f64,
    pub min_size: f32,
    pub max_size: f32,
    /// Accepted local hours, [start, end)
    pub between_hours: (u32, u32),
    pub exclude: Vec<(f64, f64)>,
}

impl Default for MeasurementFilter {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            max_speed_kmh: f32::INFINITY,
            min_time_diff: 0.0,
            min_size: 0.0,
            max_size: f32::INFINITY,
            between_hours: (0, 24),
            exclude: Vec::new(),
        }
    }
}

impl MeasurementFilter {
    /// Adds a window of local time, both ends formatted as `dd-mm-yy HH:MM:SS`.
    pub fn exclude_between(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let from = self.parse_local(from)?;
        let to = self.parse_local(to)?;
        self.exclude.push((from, to));

        Ok(())
    }

    fn parse_local(&self, s: &str) -> Result<f64, Error> {
        let local = NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT).map_err(|e| {
            Error::InvalidFilter(format!(
                "`{}` is not a `{}` datetime: {}",
                s, DATETIME_FORMAT, e
            ))
        })?;

        Ok(local.and_utc().timestamp() as f64 - self.utc_offset_hours as f64 * SECONDS_IN_HOUR)
    }

    fn local_hour(&self, time: f64) -> Option<u32> {
        let local = time + self.utc_offset_hours as f64 * SECONDS_IN_HOUR;

        chrono::DateTime::from_timestamp(local.floor() as i64, 0).map(|t| t.hour())
    }

    /// `prev` is the preceding input row, whether it was accepted or not.
    pub fn accepts(&self, m: &Measurement, prev: Option<&Measurement>) -> bool {
        if m.speed_kmh > self.max_speed_kmh {
            return false;
        }

        let prev_end = prev.map(|p| p.end_time).unwrap_or(0.0);
        if (m.end_time - prev_end).abs() < self.min_time_diff {
            return false;
        }

        if m.average_size > self.max_size || m.average_size < self.min_size {
            return false;
        }

        match self.local_hour(m.end_time) {
            Some(h) if self.between_hours.0 <= h && h < self.between_hours.1 => (),
            _ => return false,
        }

        !self
            .exclude
            .iter()
            .any(|&(from, to)| from < m.end_time && m.end_time < to)
    }

    /// Splits rows into (accepted, rejected), keeping input order.
    pub fn apply(&self, rows: &[Measurement]) -> (Vec<Measurement>, Vec<Measurement>) {
        let mut accepted = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();
        let mut prev = None;

        for row in rows {
            if self.accepts(row, prev) {
                accepted.push(row.clone());
            } else {
                rejected.push(row.clone());
            }
            prev = Some(row);
        }

        if !rows.is_empty() {
            log::info!(
                "{} rows read, {} rejected, {} accepted ({:.2}% rejected)",
                rows.len(),
                rejected.len(),
                accepted.len(),
                rejected.len() as f64 / rows.len() as f64 * 100.0
            );
        }

        (accepted, rejected)
    }
}
