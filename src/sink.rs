use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::error::Error;
use crate::meter::Measurement;

pub const CSV_HEADER: [&str; 13] = [
    "id",
    "start_time",
    "end_time",
    "elapsed_time",
    "x_dir",
    "y_dir",
    "start_frame",
    "end_frame",
    "frame_diff",
    "real_distance",
    "speed_mps",
    "speed_kmh",
    "avg_size",
];

/// Extra column of cleaned exports, see [`CsvSink::with_datetime`].
pub const DATETIME_COLUMN: &str = "datetime";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub trait MeasurementSink {
    fn record(&mut self, m: &Measurement) -> Result<(), Error>;

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes one comma separated row per measurement, columns in record order.
pub struct CsvSink<W: Write> {
    writer: W,
    // hours from UTC of the datetime column, none when the column is not written
    datetime_offset: Option<i32>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut writer: W) -> Result<Self, Error> {
        writeln!(writer, "{}", CSV_HEADER.join(","))?;

        Ok(Self {
            writer,
            datetime_offset: None,
        })
    }

    /// Adds a last `datetime` column with the start time of every row, in the
    /// local time `utc_offset_hours` away from UTC.
    pub fn with_datetime(mut writer: W, utc_offset_hours: i32) -> Result<Self, Error> {
        writeln!(writer, "{},{}", CSV_HEADER.join(","), DATETIME_COLUMN)?;

        Ok(Self {
            writer,
            datetime_offset: Some(utc_offset_hours),
        })
    }

    /// Continues an existing file without repeating the header.
    pub fn append(writer: W) -> Self {
        Self {
            writer,
            datetime_offset: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl CsvSink<io::BufWriter<std::fs::File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let exists = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = io::BufWriter::new(file);

        if exists {
            Ok(Self::append(writer))
        } else {
            Self::new(writer)
        }
    }
}

impl<W: Write> MeasurementSink for CsvSink<W> {
    fn record(&mut self, m: &Measurement) -> Result<(), Error> {
        match self.datetime_offset {
            Some(offset) => writeln!(
                self.writer,
                "{},{}",
                format_row(m),
                format_datetime(m.start_time, offset)
            )?,
            None => writeln!(self.writer, "{}", format_row(m))?,
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()?;

        Ok(())
    }
}

pub fn format_row(m: &Measurement) -> String {
    format!(
        "{},{:.3},{:.3},{:.3},{},{},{},{},{},{:.3},{:.2},{:.2},{:.2}",
        m.id,
        m.start_time,
        m.end_time,
        m.elapsed_time,
        m.direction.0,
        m.direction.1,
        m.start_frame,
        m.end_frame,
        m.frame_diff,
        m.real_distance,
        m.speed_mps,
        m.speed_kmh,
        m.average_size,
    )
}

/// Unix `time` as `YYYY-MM-DD HH:MM:SS.sss`, shifted by `utc_offset_hours`.
pub fn format_datetime(time: f64, utc_offset_hours: i32) -> String {
    let local = time + utc_offset_hours as f64 * 3600.0;
    let secs = local.floor();
    let nanos = (((local - secs) * 1e9).round() as u32).min(999_999_999);

    chrono::DateTime::from_timestamp(secs as i64, nanos)
        .map(|t| t.format(DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| format!("{:.3}", time))
}

/// Parses a row written by [`format_row`]; a trailing `datetime` column is ignored.
pub fn parse_row(line: &str) -> Result<Measurement, Error> {
    let cols: Vec<&str> = line.split(',').map(str::trim).collect();
    if cols.len() != CSV_HEADER.len() && cols.len() != CSV_HEADER.len() + 1 {
        return Err(Error::Csv(format!(
            "expected {} columns, got {}: `{}`",
            CSV_HEADER.len(),
            cols.len(),
            line
        )));
    }

    fn col<T: std::str::FromStr>(cols: &[&str], idx: usize) -> Result<T, Error> {
        cols[idx].parse().map_err(|_| {
            Error::Csv(format!(
                "column `{}`: cannot parse `{}`",
                CSV_HEADER[idx], cols[idx]
            ))
        })
    }

    Ok(Measurement {
        id: col(&cols, 0)?,
        start_time: col(&cols, 1)?,
        end_time: col(&cols, 2)?,
        elapsed_time: col(&cols, 3)?,
        direction: (col(&cols, 4)?, col(&cols, 5)?),
        start_frame: col(&cols, 6)?,
        end_frame: col(&cols, 7)?,
        frame_diff: col(&cols, 8)?,
        real_distance: col(&cols, 9)?,
        speed_mps: col(&cols, 10)?,
        speed_kmh: col(&cols, 11)?,
        average_size: col(&cols, 12)?,
    })
}

/// Reads rows written by [`CsvSink`]; header lines and blank lines are skipped.
pub fn read_csv<R: BufRead>(reader: R) -> Result<Vec<Measurement>, Error> {
    let mut rows = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with(CSV_HEADER[0]) {
            continue;
        }

        rows.push(parse_row(line)?);
    }

    Ok(rows)
}

/// Reads one csv file, or every `*.csv` file of a directory in file name order.
pub fn read_csv_path<P: AsRef<Path>>(path: P) -> Result<Vec<Measurement>, Error> {
    let path = path.as_ref();
    if !path.is_dir() {
        return read_csv(BufReader::new(File::open(path)?));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        if file.is_file() && file.extension().map_or(false, |ext| ext == "csv") {
            files.push(file);
        }
    }
    files.sort();

    if files.is_empty() {
        log::warn!("no csv files in {}", path.display());
    }

    let mut rows = Vec::new();
    for file in &files {
        let part = read_csv(BufReader::new(File::open(file)?))?;
        log::info!("{}: {} rows", file.display(), part.len());
        rows.extend(part);
    }

    Ok(rows)
}

/// Prints every measurement to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl MeasurementSink for ConsoleReporter {
    fn record(&mut self, m: &Measurement) -> Result<(), Error> {
        println!("{}", describe(m));

        Ok(())
    }
}

pub fn describe(m: &Measurement) -> String {
    let timed_at = chrono::DateTime::from_timestamp(m.end_time.trunc() as i64, 0)
        .map(|t| t.format("%H:%M:%S %d-%m-%y (+00:00 UTC)").to_string())
        .unwrap_or_else(|| format!("{:.3}", m.end_time));

    format!(
        "Object({}) timed at: {}\n  frames {}..{} ({}), {:.3}s, {:.3}m, {:.2} m/s, {:.2} km/h, direction ({}, {}), size {:.2}",
        m.id,
        timed_at,
        m.start_frame,
        m.end_frame,
        m.frame_diff,
        m.elapsed_time,
        m.real_distance,
        m.speed_mps,
        m.speed_kmh,
        m.direction.0,
        m.direction.1,
        m.average_size,
    )
}
