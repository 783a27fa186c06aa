use std::collections::{HashMap, HashSet};

use serde_derive::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::error::Error;
use crate::Track;

const MIN_ELAPSED_SECONDS: f32 = 0.4;
const MPS_TO_KMH: f32 = 3.6;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    pub fps: f32,
    /// Crossings shorter than this (s) are discarded
    pub min_elapsed_time: f32,
}

impl MeterConfig {
    pub fn new(fps: f32) -> Result<Self, Error> {
        let config = Self {
            fps,
            min_elapsed_time: MIN_ELAPSED_SECONDS,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "fps must be a positive number, got {}",
                self.fps
            )));
        }

        if !self.min_elapsed_time.is_finite() || self.min_elapsed_time <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min elapsed time must be a positive number, got {}",
                self.min_elapsed_time
            )));
        }

        Ok(())
    }
}

/// Speed record of one completed zone crossing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub elapsed_time: f32,
    // (x,y), each in {-1, 0, 1}
    pub direction: (i8, i8),
    pub start_frame: u64,
    pub end_frame: u64,
    pub frame_diff: u64,
    // in m
    pub real_distance: f32,
    pub speed_mps: f32,
    pub speed_kmh: f32,
    // in px^2
    pub average_size: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Crossing {
    Measured(Measurement),
    /// Crossing too short to measure reliably
    Rejected { id: u32, elapsed_time: f32 },
}

impl Crossing {
    #[inline]
    pub fn id(&self) -> u32 {
        match self {
            Crossing::Measured(m) => m.id,
            Crossing::Rejected { id, .. } => *id,
        }
    }

    #[inline]
    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            Crossing::Measured(m) => Some(m),
            Crossing::Rejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    start_frame: u64,
    // observation index inside the track
    start_index: usize,
}

/// Watches track positions against the calibrated zone.
pub struct SpeedMeter {
    calibration: Calibration,
    config: MeterConfig,
    measuring: HashMap<u32, Entry>,
    finalized: HashSet<u32>,
}

impl SpeedMeter {
    pub fn new(calibration: Calibration, config: MeterConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            calibration,
            config,
            measuring: HashMap::new(),
            finalized: HashSet::new(),
        })
    }

    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[inline]
    pub fn is_measuring(&self, id: u32) -> bool {
        self.measuring.contains_key(&id)
    }

    #[inline]
    pub fn measuring_count(&self) -> usize {
        self.measuring.len()
    }

    /// Returns the crossings completed in this frame, in track order.
    pub fn update(&mut self, frame: u64, tracks: &[Track]) -> Vec<Crossing> {
        let mut crossings = Vec::new();

        for track in tracks {
            let id = track.id();
            let pos = match track.last_centroid() {
                Some(pos) => pos,
                None => continue,
            };

            if let Some(entry) = self.measuring.get(&id).copied() {
                if self.calibration.has_left(&pos) {
                    self.measuring.remove(&id);
                    self.finalized.insert(id);

                    crossings.push(self.measure(track, entry));
                }
            } else if !self.finalized.contains(&id) && self.calibration.contains(&pos) {
                log::debug!("frame #{}: track {} entered the zone", frame, id);

                self.measuring.insert(
                    id,
                    Entry {
                        start_frame: track.last_frame(),
                        start_index: track.observation_count() - 1,
                    },
                );
            }
        }

        let active: HashSet<u32> = tracks.iter().map(|t| t.id()).collect();
        self.measuring.retain(|id, _| {
            let keep = active.contains(id);
            if !keep {
                log::debug!("frame #{}: track {} lost inside the zone", frame, id);
            }
            keep
        });
        self.finalized.retain(|id| active.contains(id));

        crossings
    }

    fn measure(&self, track: &Track, entry: Entry) -> Crossing {
        let end_index = track.observation_count() - 1;
        let end_frame = track.last_frame();
        let frame_diff = end_frame.saturating_sub(entry.start_frame);
        let elapsed_time = frame_diff as f32 / self.config.fps;

        if elapsed_time < self.config.min_elapsed_time {
            log::debug!(
                "track {}: crossing in {:.3}s discarded",
                track.id(),
                elapsed_time
            );

            return Crossing::Rejected {
                id: track.id(),
                elapsed_time,
            };
        }

        let start = track.centroids()[entry.start_index];
        let end = track.centroids()[end_index];
        let pixel_displacement = (end.x - start.x).abs();
        let avg_height = (start.y + end.y) / 2.0;
        let dpp = self.calibration.distance_per_pixel(avg_height);

        // lines that are not vertical may cross away from the calibration height
        if !dpp.is_finite() || dpp <= 0.0 {
            log::warn!(
                "track {}: no line spacing at y = {:.1}, crossing discarded",
                track.id(),
                avg_height
            );

            return Crossing::Rejected {
                id: track.id(),
                elapsed_time,
            };
        }

        let real_distance = pixel_displacement * dpp;
        let speed_mps = real_distance / elapsed_time;

        Crossing::Measured(Measurement {
            id: track.id(),
            start_time: track.times()[entry.start_index],
            end_time: track.times()[end_index],
            elapsed_time,
            direction: track.direction(),
            start_frame: entry.start_frame,
            end_frame,
            frame_diff,
            real_distance,
            speed_mps,
            speed_kmh: speed_mps * MPS_TO_KMH,
            average_size: track.average_size(),
        })
    }
}
