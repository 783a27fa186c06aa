use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::{Detection, Track};

const MAX_POINT_DISTANCE_RATIO: f32 = 0.25;
const MAX_UNSEEN_SECONDS: f32 = 0.2;
const STATIONARY_OBSERVATIONS: usize = 3;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Max centroid distance (px) between a track and a detection it may be matched with
    pub max_point_distance: f32,
    /// Frames a track survives without a match
    pub max_unseen_frames: u64,
}

impl TrackerConfig {
    pub fn new(max_point_distance: f32, max_unseen_frames: u64) -> Self {
        Self {
            max_point_distance,
            max_unseen_frames,
        }
    }

    pub fn for_video(frame_width: u32, fps: f32) -> Result<Self, Error> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "fps must be a positive number, got {}",
                fps
            )));
        }

        if frame_width == 0 {
            return Err(Error::InvalidConfig("frame width is 0".to_string()));
        }

        Ok(Self {
            max_point_distance: frame_width as f32 * MAX_POINT_DISTANCE_RATIO,
            max_unseen_frames: ((fps * MAX_UNSEEN_SECONDS).round() as u64).max(1),
        })
    }
}

/// Greedy nearest-neighbour tracker.
///
/// Tracks are visited in creation order and each one takes the closest
/// detection still available, so an earlier track can take a detection that
/// would have been a better fit for a later one.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
    // index of the last frame that was applied
    last_frame: Option<u64>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(64),
            next_id: 1,
            last_frame: None,
        }
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Applies one frame and returns the active tracks.
    ///
    /// Frames with an invalid detection, or older than the last applied
    /// frame, are skipped and leave the active set unchanged.
    pub fn update(&mut self, frame: u64, time: f64, detections: &[Detection]) -> &[Track] {
        if let Err(err) = self.check(frame, detections) {
            log::warn!("frame #{}: skipped, {}", frame, err);
            return &self.tracks;
        }
        self.last_frame = Some(frame);

        if detections.is_empty() {
            let max_unseen = self.config.max_unseen_frames;
            self.tracks.retain(|t| {
                let keep = frame.saturating_sub(t.last_frame()) <= max_unseen;
                if !keep {
                    log::debug!("frame #{}: track {} lost", frame, t.id());
                }
                keep
            });

            return &self.tracks;
        }

        if self.tracks.is_empty() {
            for det in detections {
                self.spawn(frame, time, det);
            }

            return &self.tracks;
        }

        let distances = self.distances(detections);
        let mut consumed = vec![false; detections.len()];
        let mut removed = vec![false; self.tracks.len()];

        for (ti, track) in self.tracks.iter_mut().enumerate() {
            let nearest = distances[ti]
                .iter()
                .enumerate()
                .filter(|(di, _)| !consumed[*di])
                .fold(None, |best: Option<(usize, f32)>, (di, &d)| match best {
                    Some((_, bd)) if bd <= d => best,
                    _ => Some((di, d)),
                });

            let matched = match nearest {
                Some((di, d)) if d <= self.config.max_point_distance => {
                    let det = &detections[di];
                    track.add_observation(
                        frame,
                        det.position(),
                        det.size(),
                        det.centroid(),
                        time,
                    );
                    consumed[di] = true;
                    true
                }
                _ => false,
            };

            if !matched
                && frame.saturating_sub(track.last_frame()) > self.config.max_unseen_frames
            {
                log::debug!("frame #{}: track {} lost", frame, track.id());
                removed[ti] = true;
            }

            if track.observation_count() > STATIONARY_OBSERVATIONS
                && track.is_stationary(STATIONARY_OBSERVATIONS)
            {
                log::debug!("frame #{}: track {} is stationary", frame, track.id());
                removed[ti] = true;
            }
        }

        let mut idx = 0;
        self.tracks.retain(|_| {
            let keep = !removed[idx];
            idx += 1;
            keep
        });

        for (di, det) in detections.iter().enumerate() {
            if !consumed[di] {
                self.spawn(frame, time, det);
            }
        }

        &self.tracks
    }

    /// Removes a track from the active set, e.g. once its crossing was measured.
    pub fn release(&mut self, id: u32) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id() == id)?;

        Some(self.tracks.remove(pos))
    }

    fn check(&self, frame: u64, detections: &[Detection]) -> Result<(), Error> {
        if let Some(last) = self.last_frame.filter(|&last| frame < last) {
            return Err(Error::TrackingInconsistency(format!(
                "frame index goes back from {}",
                last
            )));
        }

        detections.iter().try_for_each(Detection::validate)
    }

    fn distances(&self, detections: &[Detection]) -> Vec<Vec<f32>> {
        self.tracks
            .iter()
            .map(|t| {
                let last = t.last_centroid().unwrap_or_else(na::Point2::origin);

                detections
                    .iter()
                    .map(|d| na::distance(&last, &d.centroid()))
                    .collect()
            })
            .collect()
    }

    fn spawn(&mut self, frame: u64, time: f64, det: &Detection) {
        let id = self.next_id;
        self.next_id += 1;

        log::debug!("frame #{}: new track {}", frame, id);

        self.tracks.push(Track::new(
            id,
            frame,
            det.position(),
            det.size(),
            det.centroid(),
            time,
        ));
    }
}
