use nalgebra as na;

/// One physical object followed across frames.
///
/// Every matched observation appends one entry to each of the per-observation
/// sequences, so they always have the same length.
#[derive(Debug, Clone)]
pub struct Track {
    id: u32,
    frames: Vec<u64>,
    positions: Vec<na::Point2<f32>>,
    // (w,h) in px
    sizes: Vec<na::Vector2<f32>>,
    centroids: Vec<na::Point2<f32>>,
    // unix seconds
    times: Vec<f64>,
}

impl Track {
    pub fn new(
        id: u32,
        frame: u64,
        position: na::Point2<f32>,
        size: na::Vector2<f32>,
        centroid: na::Point2<f32>,
        time: f64,
    ) -> Self {
        let mut track = Self {
            id,
            frames: Vec::with_capacity(32),
            positions: Vec::with_capacity(32),
            sizes: Vec::with_capacity(32),
            centroids: Vec::with_capacity(32),
            times: Vec::with_capacity(32),
        };

        track.add_observation(frame, position, size, centroid, time);
        track
    }

    pub fn add_observation(
        &mut self,
        frame: u64,
        position: na::Point2<f32>,
        size: na::Vector2<f32>,
        centroid: na::Point2<f32>,
        time: f64,
    ) {
        self.frames.push(frame);
        self.positions.push(position);
        self.sizes.push(size);
        self.centroids.push(centroid);
        self.times.push(time);
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn observation_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    #[inline]
    pub fn positions(&self) -> &[na::Point2<f32>] {
        &self.positions
    }

    #[inline]
    pub fn sizes(&self) -> &[na::Vector2<f32>] {
        &self.sizes
    }

    #[inline]
    pub fn centroids(&self) -> &[na::Point2<f32>] {
        &self.centroids
    }

    #[inline]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    pub fn last_frame(&self) -> u64 {
        self.frames.last().copied().unwrap_or_default()
    }

    #[inline]
    pub fn last_centroid(&self) -> Option<na::Point2<f32>> {
        self.centroids.last().copied()
    }

    pub fn average_size(&self) -> f32 {
        if self.sizes.is_empty() {
            return 0.0;
        }

        self.sizes.iter().map(|s| s.x * s.y).sum::<f32>() / self.sizes.len() as f32
    }

    /// Sign of the first-to-last centroid displacement per axis, (x, y).
    pub fn direction(&self) -> (i8, i8) {
        match (self.centroids.first(), self.centroids.last()) {
            (Some(first), Some(last)) => {
                let delta = last - first;

                (sign(delta.x), sign(delta.y))
            }
            _ => (0, 0),
        }
    }

    /// Mean centroid displacement per observation step, in px.
    pub fn average_velocity(&self) -> na::Vector2<f32> {
        let steps = self.centroids.len().saturating_sub(1);
        if steps == 0 {
            return na::Vector2::zeros();
        }

        let sum = self
            .centroids
            .windows(2)
            .fold(na::Vector2::zeros(), |acc, w| acc + (w[1] - w[0]));

        sum / steps as f32
    }

    /// True when the last `n` centroids are exactly equal.
    pub fn is_stationary(&self, n: usize) -> bool {
        if n == 0 || self.centroids.len() < n {
            return false;
        }

        let tail = &self.centroids[self.centroids.len() - n..];
        tail.iter().all(|c| *c == tail[0])
    }
}

#[inline]
fn sign(v: f32) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
