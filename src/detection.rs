use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

/// Contains (x,y) of the top-left corner, (width,height) and the centroid of a bbox
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "c")]
    pub centroid: [f32; 2],
}

impl Detection {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            centroid: [x + w / 2., y + h / 2.],
        }
    }

    #[inline(always)]
    pub fn position(&self) -> na::Point2<f32> {
        na::Point2::new(self.x, self.y)
    }

    #[inline(always)]
    pub fn size(&self) -> na::Vector2<f32> {
        na::Vector2::new(self.w, self.h)
    }

    #[inline(always)]
    pub fn centroid(&self) -> na::Point2<f32> {
        na::Point2::new(self.centroid[0], self.centroid[1])
    }

    pub fn validate(&self) -> Result<(), Error> {
        let fields = [
            self.x,
            self.y,
            self.w,
            self.h,
            self.centroid[0],
            self.centroid[1],
        ];

        if fields.iter().any(|v| !v.is_finite()) {
            return Err(Error::TrackingInconsistency(format!(
                "non-finite field in {:?}",
                self
            )));
        }

        if self.w < 0. || self.h < 0. {
            return Err(Error::TrackingInconsistency(format!(
                "negative size in {:?}",
                self
            )));
        }

        Ok(())
    }
}
