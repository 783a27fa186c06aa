pub mod calibration;
pub mod detection;
pub mod error;
pub mod filter;
pub mod frame;
pub mod meter;
pub mod reader;
pub mod sink;
pub mod tracker;

mod track;

pub use calibration::{Calibration, CalibrationFile, Line, Side};
pub use detection::Detection;
pub use frame::Frame;
pub use meter::{Crossing, Measurement, MeterConfig, SpeedMeter};
pub use track::Track;
pub use tracker::{Tracker, TrackerConfig};

use error::Error;

/// Tracker followed by the speed meter, fed one frame at a time in frame order.
pub struct Speedometer {
    tracker: Tracker,
    meter: SpeedMeter,
}

impl Speedometer {
    pub fn new(
        tracker: TrackerConfig,
        calibration: Calibration,
        meter: MeterConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            tracker: Tracker::new(tracker),
            meter: SpeedMeter::new(calibration, meter)?,
        })
    }

    /// Returns the measurements completed in this frame.
    ///
    /// Tracks whose crossing was finalized, measured or not, leave the tracker.
    pub fn process(&mut self, frame: &Frame) -> Vec<Measurement> {
        let tracks = self
            .tracker
            .update(frame.index, frame.timestamp, &frame.detections);
        let crossings = self.meter.update(frame.index, tracks);

        let mut measurements = Vec::with_capacity(crossings.len());
        for crossing in crossings {
            self.tracker.release(crossing.id());

            if let Crossing::Measured(m) = crossing {
                log::info!(
                    "frame #{}: track {} measured at {:.2} km/h",
                    frame.index,
                    m.id,
                    m.speed_kmh
                );
                measurements.push(m);
            }
        }

        measurements
    }

    /// Like [`Speedometer::process`], for frames that may have failed to decode upstream.
    pub fn process_checked(&mut self, frame: Result<Frame, Error>) -> Vec<Measurement> {
        match frame {
            Ok(frame) => self.process(&frame),
            Err(err) => {
                log::warn!("frame skipped: {}", err);
                Vec::new()
            }
        }
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        self.tracker.tracks()
    }

    #[inline]
    pub fn meter(&self) -> &SpeedMeter {
        &self.meter
    }
}
