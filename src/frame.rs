use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub detections: Vec<Detection>,
    pub timestamp: f64, // unix seconds
}

impl Frame {
    pub fn new(index: u64, timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            index,
            detections,
            timestamp,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
