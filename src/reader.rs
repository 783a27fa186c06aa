use std::io::BufRead;

use crate::error::Error;
use crate::{Detection, Frame};

/// Reads a detection dump, one frame per line: `<frame index>:<json array of detections>`.
///
/// Frame timestamps are derived from the frame index, the frame rate and the
/// wall-clock time of frame 0.
pub struct DetectionsReader<R> {
    lines: std::io::Lines<R>,
    fps: f64,
    start_time: f64,
    line_no: usize,
}

impl<R: BufRead> DetectionsReader<R> {
    pub fn new(reader: R, fps: f32, start_time: f64) -> Result<Self, Error> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "fps must be a positive number, got {}",
                fps
            )));
        }

        if !start_time.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "start time must be finite, got {}",
                start_time
            )));
        }

        Ok(Self {
            lines: reader.lines(),
            fps: fps as f64,
            start_time,
            line_no: 0,
        })
    }

    fn parse(&self, line: &str) -> Result<Frame, Error> {
        let idx = line.find(':').ok_or_else(|| {
            Error::TrackingInconsistency(format!("line {}: expected `:`", self.line_no))
        })?;

        let (index, vector) = line.split_at(idx);
        let index: u64 = index.trim().parse().map_err(|_| {
            Error::TrackingInconsistency(format!(
                "line {}: parse frame index failed",
                self.line_no
            ))
        })?;

        let detections: Vec<Detection> = serde_json::from_str(&vector[1..]).map_err(|e| {
            Error::TrackingInconsistency(format!("line {}: parse json failed: {}", self.line_no, e))
        })?;

        let timestamp = self.start_time + index as f64 / self.fps;

        Ok(Frame::new(index, timestamp, detections))
    }
}

impl<R: BufRead> Iterator for DetectionsReader<R> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(self.parse(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_frames() {
        let dump = "\
0:[]
1:[{\"x\":10,\"y\":20,\"w\":4,\"h\":6,\"c\":[12,23]}]

3:[{\"x\":0,\"y\":0,\"w\":2,\"h\":2,\"c\":[1,1]},{\"x\":5,\"y\":5,\"w\":2,\"h\":2,\"c\":[6,6]}]
";
        let frames: Vec<Frame> = DetectionsReader::new(dump.as_bytes(), 10.0, 100.0)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_empty());
        assert_eq!(frames[1].index, 1);
        assert_eq!(frames[1].detections[0], Detection::new(10.0, 20.0, 4.0, 6.0));
        assert_eq!(frames[2].len(), 2);
        assert!((frames[2].timestamp - 100.3).abs() < 1e-9);
    }

    #[test]
    fn malformed_lines_are_reported() {
        let dump = "\
0:[{\"x\":10,\"y\":20}]
no separator
x:[]
2:[]
";
        let results: Vec<_> = DetectionsReader::new(dump.as_bytes(), 10.0, 0.0)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 4);
        for r in &results[..3] {
            assert!(matches!(r, Err(Error::TrackingInconsistency(_))));
        }
        assert_eq!(results[3].as_ref().unwrap().index, 2);
    }

    #[test]
    fn rejects_bad_frame_rate() {
        for fps in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                DetectionsReader::new("0:[]".as_bytes(), fps, 0.0),
                Err(Error::InvalidConfig(_))
            ));
        }
        assert!(DetectionsReader::new("0:[]".as_bytes(), 25.0, f64::NAN).is_err());
    }
}
