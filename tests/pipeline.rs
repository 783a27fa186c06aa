use nalgebra as na;
use nearly_eq::assert_nearly_eq;

use speedometer::error::Error;
use speedometer::reader::DetectionsReader;
use speedometer::{Calibration, Detection, Frame, MeterConfig, Speedometer, TrackerConfig};

const FPS: f32 = 30.0;

fn zone() -> Calibration {
    Calibration::vertical(
        [na::Point2::new(100.0, 0.0), na::Point2::new(100.0, 360.0)],
        [na::Point2::new(200.0, 0.0), na::Point2::new(200.0, 360.0)],
        10.0,
    )
    .unwrap()
}

fn pipeline(max_point_distance: f32, max_unseen_frames: u64) -> Speedometer {
    Speedometer::new(
        TrackerConfig::new(max_point_distance, max_unseen_frames),
        zone(),
        MeterConfig::new(FPS).unwrap(),
    )
    .unwrap()
}

fn det_at(cx: f32, cy: f32) -> Detection {
    Detection::new(cx - 10.0, cy - 10.0, 20.0, 20.0)
}

fn frame(index: u64, detections: Vec<Detection>) -> Frame {
    Frame::new(index, 1_600_000_000.0 + index as f64 / FPS as f64, detections)
}

#[test]
fn two_objects_crossing_in_opposite_directions() {
    let mut speedometer = pipeline(10.0, 6);

    let mut measurements = Vec::new();
    for k in 0..70u64 {
        // A moves right 2 px per frame at y=50, B moves left 4 px per frame at y=200
        let a = det_at(90.0 + 2.0 * k as f32, 50.0);
        let b = det_at(260.0 - 4.0 * k as f32, 200.0);

        for m in speedometer.process(&frame(k, vec![a, b])) {
            measurements.push((k, m));
        }
    }

    assert_eq!(measurements.len(), 2);

    let (k, b) = &measurements[0];
    assert_eq!(*k, 40);
    assert_eq!(b.id, 2);
    assert_eq!(b.start_frame, 15);
    assert_eq!(b.end_frame, 40);
    assert_eq!(b.direction, (-1, 0));
    assert_nearly_eq!(b.real_distance, 10.0, 1e-4);
    assert_nearly_eq!(b.speed_mps, 12.0, 1e-3);
    assert_nearly_eq!(b.speed_kmh, 43.2, 1e-2);

    let (k, a) = &measurements[1];
    assert_eq!(*k, 55);
    assert_eq!(a.id, 1);
    assert_eq!(a.start_frame, 5);
    assert_eq!(a.end_frame, 55);
    assert_eq!(a.frame_diff, 50);
    assert_eq!(a.direction, (1, 0));
    assert_nearly_eq!(a.elapsed_time, 50.0 / 30.0, 1e-5);
    assert_nearly_eq!(a.speed_mps, 6.0, 1e-3);
    assert_nearly_eq!(a.speed_kmh, 21.6, 1e-2);
    assert_eq!(a.average_size, 400.0);
    assert_nearly_eq!(a.end_time - a.start_time, 50.0 / 30.0, 1e-5);

    // measured tracks were released, the objects continue as new tracks
    let ids: Vec<u32> = speedometer.tracks().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn single_frame_crossing_emits_nothing() {
    let mut speedometer = pipeline(200.0, 6);

    assert!(speedometer.process(&frame(0, vec![det_at(150.0, 50.0)])).is_empty());
    assert!(speedometer.meter().is_measuring(1));

    assert!(speedometer.process(&frame(1, vec![det_at(250.0, 50.0)])).is_empty());
    assert!(!speedometer.meter().is_measuring(1));
    assert!(speedometer.tracks().is_empty());
}

#[test]
fn track_lost_inside_zone_is_not_measured() {
    let mut speedometer = pipeline(10.0, 2);

    for k in 0..5u64 {
        speedometer.process(&frame(k, vec![det_at(120.0 + 2.0 * k as f32, 50.0)]));
    }
    assert!(speedometer.meter().is_measuring(1));

    for k in 5..9u64 {
        assert!(speedometer.process(&frame(k, vec![])).is_empty());
    }
    assert!(speedometer.tracks().is_empty());
    assert_eq!(speedometer.meter().measuring_count(), 0);
}

#[test]
fn skipped_frames_keep_state() {
    let mut speedometer = pipeline(10.0, 0);

    speedometer.process(&frame(0, vec![det_at(150.0, 50.0)]));

    let dump = "1:[{\"x\":140}]\n";
    for f in DetectionsReader::new(dump.as_bytes(), FPS, 0.0).unwrap() {
        assert!(matches!(f, Err(Error::TrackingInconsistency(_))));
        assert!(speedometer.process_checked(f).is_empty());
    }

    assert_eq!(speedometer.tracks().len(), 1);
    assert!(speedometer.meter().is_measuring(1));
}

#[test]
fn frames_out_of_order_are_skipped() {
    let mut speedometer = pipeline(200.0, 100);

    assert!(speedometer.process(&frame(50, vec![det_at(150.0, 50.0)])).is_empty());
    assert!(speedometer.process(&frame(10, vec![det_at(250.0, 50.0)])).is_empty());

    assert!(speedometer.meter().is_measuring(1));
    assert_eq!(speedometer.tracks()[0].frames(), &[50]);

    let measured = speedometer.process(&frame(80, vec![det_at(250.0, 50.0)]));
    assert_eq!(measured.len(), 1);
    assert_eq!(measured[0].frame_diff, 30);
    assert_nearly_eq!(measured[0].elapsed_time, 1.0, 1e-6);
}

#[test]
fn zero_fps_is_rejected() {
    let config = MeterConfig {
        fps: 0.0,
        min_elapsed_time: 0.4,
    };

    assert!(matches!(
        Speedometer::new(TrackerConfig::new(10.0, 6), zone(), config),
        Err(Error::InvalidConfig(_))
    ));
    assert!(MeterConfig::new(0.0).is_err());
    assert!(DetectionsReader::new(&b""[..], 0.0, 0.0).is_err());
}

#[test]
fn ids_increase_in_creation_order() {
    let mut speedometer = pipeline(5.0, 1);

    let mut created = Vec::new();
    for k in 0..20u64 {
        let dets = (0..(k % 3 + 1))
            .map(|i| det_at(20.0 * k as f32 + 7.0 * i as f32, 300.0))
            .collect();

        speedometer.process(&frame(k, dets));
        for t in speedometer.tracks() {
            if !created.contains(&t.id()) {
                created.push(t.id());
            }
            assert_eq!(t.frames().len(), t.observation_count());
            assert_eq!(t.centroids().len(), t.observation_count());
        }
    }

    assert!(created.windows(2).all(|w| w[0] < w[1]));
}
