use std::io::BufReader;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use nalgebra as na;

use speedometer::error::Error;
use speedometer::filter::MeasurementFilter;
use speedometer::reader::DetectionsReader;
use speedometer::sink::{self, ConsoleReporter, CsvSink, MeasurementSink};
use speedometer::{Calibration, CalibrationFile, MeterConfig, Speedometer, TrackerConfig};

/// Speed of moving objects from fixed-camera detections
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track a detection dump and measure zone crossings
    Measure {
        /// Detection dump, `<frame>:<json>` per line
        #[arg(short, long)]
        input: PathBuf,

        /// Calibration json file
        #[arg(short, long)]
        calibration: PathBuf,

        #[arg(long)]
        fps: f32,

        /// Frame width in px, used for the default match distance
        #[arg(long, default_value_t = 640)]
        frame_width: u32,

        #[arg(long)]
        max_point_distance: Option<f32>,

        #[arg(long)]
        max_unseen_frames: Option<u64>,

        /// Shortest crossing (s) that is measured
        #[arg(long, default_value_t = 0.4)]
        min_elapsed_time: f32,

        /// Unix time of frame 0
        #[arg(long, default_value_t = 0.0)]
        start_time: f64,

        /// Measurements csv, appended to when it exists
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print measurements to the console
        #[arg(short, long)]
        print: bool,

        /// Frames buffered between the reader and the tracker
        #[arg(long, default_value_t = 64)]
        queue: usize,
    },

    /// Write a calibration file from two lines and the distance between them
    Calibrate {
        /// First line, x1,y1,x2,y2
        #[arg(long, value_delimiter = ',', required = true)]
        first: Vec<f32>,

        /// Second line, x1,y1,x2,y2
        #[arg(long, value_delimiter = ',', required = true)]
        second: Vec<f32>,

        /// Real distance between the lines in metres
        #[arg(short, long)]
        distance: f32,

        /// Require both lines to be vertical
        #[arg(long)]
        vertical: bool,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Drop exported measurements outside the given bounds
    Clean {
        /// Measurements csv, or a directory of them
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 0)]
        utc: i32,

        #[arg(long)]
        max_speed: Option<f32>,

        #[arg(long)]
        min_time_diff: Option<f64>,

        #[arg(long)]
        min_size: Option<f32>,

        #[arg(long)]
        max_size: Option<f32>,

        /// Accepted local hours, start,end
        #[arg(long, value_delimiter = ',')]
        between_hours: Option<Vec<u32>>,

        /// Excluded local window, "dd-mm-yy HH:MM:SS/dd-mm-yy HH:MM:SS"
        #[arg(long)]
        exclude: Vec<String>,
    },
}

fn line_points(v: &[f32]) -> Result<[na::Point2<f32>; 2], Error> {
    match *v {
        [x1, y1, x2, y2] => Ok([na::Point2::new(x1, y1), na::Point2::new(x2, y2)]),
        _ => Err(Error::InvalidCalibration(format!(
            "a line needs 4 coordinates, got {:?}",
            v
        ))),
    }
}

fn measure(
    input: PathBuf,
    calibration: PathBuf,
    tracker: TrackerConfig,
    meter: MeterConfig,
    start_time: f64,
    output: Option<PathBuf>,
    print: bool,
    queue: usize,
) -> Result<(), Error> {
    let calibration = CalibrationFile::load(&calibration)?.calibration()?;
    let mut speedometer = Speedometer::new(tracker, calibration, meter)?;

    let mut sinks: Vec<Box<dyn MeasurementSink>> = Vec::new();
    if let Some(path) = output {
        sinks.push(Box::new(CsvSink::create(path)?));
    }
    if print {
        sinks.push(Box::new(ConsoleReporter));
    }

    let file = std::fs::File::open(&input)?;
    let detections = DetectionsReader::new(BufReader::new(file), meter.fps, start_time)?;

    // Blocking send keeps every frame: the tracker must not skip frames silently.
    let (tx, rx) = bounded(queue.max(1));
    let reader = std::thread::spawn(move || {
        for frame in detections {
            if tx.send(frame).is_err() {
                break;
            }
        }
    });

    let mut frames = 0usize;
    let mut measured = 0usize;
    for frame in rx {
        frames += 1;

        for m in speedometer.process_checked(frame) {
            measured += 1;
            for s in sinks.iter_mut() {
                s.record(&m)?;
            }
        }
    }

    if reader.join().is_err() {
        log::error!("detections reader panicked");
    }

    for s in sinks.iter_mut() {
        s.flush()?;
    }

    log::info!("{} frames processed, {} measurements", frames, measured);

    Ok(())
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Measure {
            input,
            calibration,
            fps,
            frame_width,
            max_point_distance,
            max_unseen_frames,
            min_elapsed_time,
            start_time,
            output,
            print,
            queue,
        } => {
            let defaults = TrackerConfig::for_video(frame_width, fps)?;
            let tracker = TrackerConfig::new(
                max_point_distance.unwrap_or(defaults.max_point_distance),
                max_unseen_frames.unwrap_or(defaults.max_unseen_frames),
            );
            let meter = MeterConfig {
                fps,
                min_elapsed_time,
            };

            measure(input, calibration, tracker, meter, start_time, output, print, queue)
        }

        Command::Calibrate {
            first,
            second,
            distance,
            vertical,
            output,
        } => {
            let (a, b) = (line_points(&first)?, line_points(&second)?);
            let calibration = if vertical {
                Calibration::vertical(a, b, distance)?
            } else {
                Calibration::from_points(a, b, distance)?
            };

            CalibrationFile::from(&calibration).save(&output)?;
            log::info!("calibration saved to {}", output.display());

            Ok(())
        }

        Command::Clean {
            input,
            output,
            utc,
            max_speed,
            min_time_diff,
            min_size,
            max_size,
            between_hours,
            exclude,
        } => {
            let defaults = MeasurementFilter::default();
            let between_hours = match between_hours.as_deref() {
                None => defaults.between_hours,
                Some(&[start, end]) => (start, end),
                Some(other) => {
                    return Err(Error::InvalidFilter(format!(
                        "between hours needs start,end, got {:?}",
                        other
                    )))
                }
            };
            let mut filter = MeasurementFilter {
                utc_offset_hours: utc,
                max_speed_kmh: max_speed.unwrap_or(defaults.max_speed_kmh),
                min_time_diff: min_time_diff.unwrap_or(defaults.min_time_diff),
                min_size: min_size.unwrap_or(defaults.min_size),
                max_size: max_size.unwrap_or(defaults.max_size),
                between_hours,
                exclude: Vec::new(),
            };

            for window in &exclude {
                let (from, to) = window.split_once('/').ok_or_else(|| {
                    Error::InvalidFilter(format!("`{}`: expected `from/to`", window))
                })?;
                filter.exclude_between(from, to)?;
            }

            let rows = sink::read_csv_path(&input)?;
            let (accepted, _) = filter.apply(&rows);

            let file = std::fs::File::create(&output)?;
            let mut out = CsvSink::with_datetime(std::io::BufWriter::new(file), utc)?;
            for m in &accepted {
                out.record(m)?;
            }
            out.flush()?;

            Ok(())
        }
    }
}
