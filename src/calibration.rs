use std::fmt;
use std::path::Path;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    On,
    Right,
}

/// Measurement boundary in pixel space. `top` is always the point with the smaller y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Vertical {
        x: f32,
        top: na::Point2<f32>,
        bottom: na::Point2<f32>,
    },
    // y = k * x + n
    General {
        k: f32,
        n: f32,
        top: na::Point2<f32>,
        bottom: na::Point2<f32>,
    },
}

impl Line {
    pub fn vertical(a: na::Point2<f32>, b: na::Point2<f32>) -> Result<Self, Error> {
        if a.x != b.x {
            return Err(Error::InvalidCalibration(format!(
                "line {} - {} is not vertical",
                a, b
            )));
        }

        if a == b {
            return Err(Error::InvalidCalibration(format!(
                "line is defined by a single point {}",
                a
            )));
        }

        let (top, bottom) = ordered(a, b);

        Ok(Line::Vertical { x: a.x, top, bottom })
    }

    pub fn through(a: na::Point2<f32>, b: na::Point2<f32>) -> Result<Self, Error> {
        if a == b {
            return Err(Error::InvalidCalibration(format!(
                "line is defined by a single point {}",
                a
            )));
        }

        if a.x == b.x {
            return Self::vertical(a, b);
        }

        if a.y == b.y {
            return Err(Error::InvalidCalibration(format!(
                "line {} - {} is horizontal",
                a, b
            )));
        }

        let (top, bottom) = ordered(a, b);
        let k = (top.y - bottom.y) / (top.x - bottom.x);
        let n = top.y - k * top.x;

        Ok(Line::General { k, n, top, bottom })
    }

    #[inline]
    pub fn x_at(&self, y: f32) -> f32 {
        match *self {
            Line::Vertical { x, .. } => x,
            Line::General { k, n, .. } => (y - n) / k,
        }
    }

    #[inline]
    pub fn side_of(&self, p: &na::Point2<f32>) -> Side {
        let x = self.x_at(p.y);

        if p.x < x {
            Side::Left
        } else if p.x > x {
            Side::Right
        } else {
            Side::On
        }
    }

    #[inline]
    pub fn points(&self) -> [na::Point2<f32>; 2] {
        match *self {
            Line::Vertical { top, bottom, .. } | Line::General { top, bottom, .. } => [top, bottom],
        }
    }

    #[inline]
    pub fn is_vertical(&self) -> bool {
        matches!(self, Line::Vertical { .. })
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Vertical { x, .. } => write!(f, "vertical line at x = {}", x),
            Line::General { k, n, .. } => write!(f, "line y = {:.2}x + {:.2}", k, n),
        }
    }
}

#[inline]
fn ordered(a: na::Point2<f32>, b: na::Point2<f32>) -> (na::Point2<f32>, na::Point2<f32>) {
    if a.y <= b.y {
        (a, b)
    } else {
        (b, a)
    }
}

/// Pair of measurement lines with the real distance (m) between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    left: Line,
    right: Line,
    distance: f32,
}

impl Calibration {
    /// Orders the lines so that `left` has the smaller x at the reference height.
    pub fn new(a: Line, b: Line, distance: f32) -> Result<Self, Error> {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Error::InvalidCalibration(format!(
                "distance must be a positive number, got {}",
                distance
            )));
        }

        let ys = a.points().iter().chain(b.points().iter()).map(|p| p.y).sum::<f32>();
        let reference = ys / 4.0;
        let (xa, xb) = (a.x_at(reference), b.x_at(reference));

        if !xa.is_finite() || !xb.is_finite() || xa == xb {
            return Err(Error::InvalidCalibration(format!(
                "lines ({}) and ({}) meet at y = {}",
                a, b, reference
            )));
        }

        let (left, right) = if xa < xb { (a, b) } else { (b, a) };
        log::info!("calibrated zone: left {}, right {}, {} m", left, right, distance);

        Ok(Self {
            left,
            right,
            distance,
        })
    }

    pub fn vertical(
        a: [na::Point2<f32>; 2],
        b: [na::Point2<f32>; 2],
        distance: f32,
    ) -> Result<Self, Error> {
        Self::new(
            Line::vertical(a[0], a[1])?,
            Line::vertical(b[0], b[1])?,
            distance,
        )
    }

    /// Vertical lines when both pairs share an x, otherwise perspective (general) lines.
    pub fn from_points(
        a: [na::Point2<f32>; 2],
        b: [na::Point2<f32>; 2],
        distance: f32,
    ) -> Result<Self, Error> {
        match (Line::vertical(a[0], a[1]), Line::vertical(b[0], b[1])) {
            (Ok(la), Ok(lb)) => Self::new(la, lb, distance),
            _ => Self::new(
                Line::through(a[0], a[1])?,
                Line::through(b[0], b[1])?,
                distance,
            ),
        }
    }

    #[inline]
    pub fn left(&self) -> &Line {
        &self.left
    }

    #[inline]
    pub fn right(&self) -> &Line {
        &self.right
    }

    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Metres per pixel at the given image row.
    pub fn distance_per_pixel(&self, height: f32) -> f32 {
        match (&self.left, &self.right) {
            (Line::Vertical { x: lx, .. }, Line::Vertical { x: rx, .. }) => {
                self.distance / (rx - lx)
            }
            (left, right) => self.distance / (right.x_at(height) - left.x_at(height)),
        }
    }

    /// Between the lines, both lines included.
    #[inline]
    pub fn contains(&self, p: &na::Point2<f32>) -> bool {
        self.left.side_of(p) != Side::Left && self.right.side_of(p) != Side::Right
    }

    /// On or past either line.
    #[inline]
    pub fn has_left(&self, p: &na::Point2<f32>) -> bool {
        self.left.side_of(p) != Side::Right || self.right.side_of(p) != Side::Left
    }
}

/// On-disk form of a calibration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationFile {
    pub lines: [[[f32; 2]; 2]; 2],
    pub distance: f32,
}

impl CalibrationFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;

        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;

        Ok(())
    }

    pub fn calibration(&self) -> Result<Calibration, Error> {
        let pt = |p: [f32; 2]| na::Point2::new(p[0], p[1]);
        let [a, b] = self.lines;

        Calibration::from_points([pt(a[0]), pt(a[1])], [pt(b[0]), pt(b[1])], self.distance)
    }
}

impl From<&Calibration> for CalibrationFile {
    fn from(c: &Calibration) -> Self {
        let arr = |l: &Line| {
            let [top, bottom] = l.points();
            [[top.x, top.y], [bottom.x, bottom.y]]
        };

        Self {
            lines: [arr(c.left()), arr(c.right())],
            distance: c.distance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    fn pt(x: f32, y: f32) -> na::Point2<f32> {
        na::Point2::new(x, y)
    }

    #[test]
    fn vertical_requires_same_x() {
        assert!(Line::vertical(pt(10.0, 0.0), pt(10.0, 100.0)).is_ok());

        match Line::vertical(pt(10.0, 0.0), pt(11.0, 100.0)) {
            Err(Error::InvalidCalibration(_)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn general_line_degenerates_to_vertical() {
        let line = Line::through(pt(10.0, 100.0), pt(10.0, 0.0)).unwrap();

        assert!(line.is_vertical());
        assert_eq!(line.points(), [pt(10.0, 0.0), pt(10.0, 100.0)]);
    }

    #[test]
    fn general_line_inverse() {
        // y = 2x + 10
        let line = Line::through(pt(0.0, 10.0), pt(10.0, 30.0)).unwrap();

        assert_nearly_eq!(line.x_at(20.0), 5.0, 1e-5);
        assert_eq!(line.side_of(&pt(4.0, 20.0)), Side::Left);
        assert_eq!(line.side_of(&pt(5.0, 20.0)), Side::On);
        assert_eq!(line.side_of(&pt(6.0, 20.0)), Side::Right);
    }

    #[test]
    fn rejects_degenerate_lines() {
        assert!(Line::through(pt(1.0, 1.0), pt(1.0, 1.0)).is_err());
        assert!(Line::through(pt(0.0, 5.0), pt(10.0, 5.0)).is_err());
    }

    #[test]
    fn rejects_bad_distance() {
        let a = [pt(100.0, 0.0), pt(100.0, 100.0)];
        let b = [pt(200.0, 0.0), pt(200.0, 100.0)];

        assert!(Calibration::vertical(a, b, 0.0).is_err());
        assert!(Calibration::vertical(a, b, -3.0).is_err());
        assert!(Calibration::vertical(a, b, f32::NAN).is_err());
        assert!(Calibration::vertical(a, b, f32::INFINITY).is_err());
        assert!(Calibration::vertical(a, a, 10.0).is_err());
    }

    #[test]
    fn constant_distance_per_pixel() {
        let a = [pt(200.0, 0.0), pt(200.0, 100.0)];
        let b = [pt(100.0, 0.0), pt(100.0, 100.0)];
        let cal = Calibration::vertical(a, b, 10.0).unwrap();

        assert_eq!(cal.left().x_at(0.0), 100.0);
        assert_eq!(cal.right().x_at(0.0), 200.0);

        for h in [0.0, 17.0, 50.0, 359.0] {
            assert_nearly_eq!(cal.distance_per_pixel(h), 0.1, 1e-6);
        }
    }

    #[test]
    fn perspective_distance_per_pixel() {
        // Lines converge towards the top of the image: 100 px apart at y=0,
        // 200 px apart at y=100.
        let a = [pt(100.0, 0.0), pt(50.0, 100.0)];
        let b = [pt(200.0, 0.0), pt(250.0, 100.0)];
        let cal = Calibration::from_points(a, b, 10.0).unwrap();

        assert!(!cal.left().is_vertical());
        assert_nearly_eq!(cal.distance_per_pixel(0.0), 0.1, 1e-5);
        assert_nearly_eq!(cal.distance_per_pixel(100.0), 0.05, 1e-5);
        assert_nearly_eq!(cal.distance_per_pixel(50.0), 10.0 / 150.0, 1e-5);
    }

    #[test]
    fn zone_boundaries() {
        let a = [pt(100.0, 0.0), pt(100.0, 100.0)];
        let b = [pt(200.0, 0.0), pt(200.0, 100.0)];
        let cal = Calibration::vertical(a, b, 10.0).unwrap();

        assert!(!cal.contains(&pt(99.0, 50.0)));
        assert!(cal.contains(&pt(100.0, 50.0)));
        assert!(cal.contains(&pt(150.0, 50.0)));
        assert!(cal.contains(&pt(200.0, 50.0)));
        assert!(!cal.contains(&pt(201.0, 50.0)));

        assert!(cal.has_left(&pt(99.0, 50.0)));
        assert!(cal.has_left(&pt(100.0, 50.0)));
        assert!(!cal.has_left(&pt(150.0, 50.0)));
        assert!(cal.has_left(&pt(200.0, 50.0)));
        assert!(cal.has_left(&pt(201.0, 50.0)));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "speedometer-calibration-{}.json",
            std::process::id()
        ));

        let a = [pt(100.0, 0.0), pt(50.0, 100.0)];
        let b = [pt(200.0, 0.0), pt(250.0, 100.0)];
        let cal = Calibration::from_points(b, a, 12.5).unwrap();

        CalibrationFile::from(&cal).save(&path).unwrap();
        let loaded = CalibrationFile::load(&path).unwrap().calibration().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, cal);
    }
}
