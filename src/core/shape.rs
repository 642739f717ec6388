//! GTFS shape emission
//!
//! Turns a decoded path geometry into shapes.txt-style records with
//! 1-based sequence numbers and cumulative travelled distance.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::geo::{great_circle_distance, Coordinate, DistanceUnit};

/// One record of a GTFS shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
    /// Cumulative distance from the first point, in whole meters
    pub shape_dist_traveled: u32,
}

/// Build shape points from an ordered coordinate sequence.
///
/// Sequence numbers are 1-based and contiguous. Distance accumulates the
/// great-circle length of each segment before rounding, so per-point values
/// are non-decreasing and start at 0.
pub fn build_shape(coordinates: &[Coordinate], shape_id: &str) -> Result<Vec<ShapePoint>> {
    if coordinates.is_empty() {
        return Err(Error::EmptyShapeInput);
    }

    let mut points = Vec::with_capacity(coordinates.len());
    let mut travelled = 0.0f64;

    for (index, coordinate) in coordinates.iter().enumerate() {
        if index > 0 {
            travelled +=
                great_circle_distance(coordinates[index - 1], *coordinate, DistanceUnit::Meters);
        }
        points.push(ShapePoint {
            shape_id: shape_id.to_string(),
            shape_pt_lat: coordinate.lat,
            shape_pt_lon: coordinate.lon,
            shape_pt_sequence: (index + 1) as u32,
            shape_dist_traveled: travelled.round() as u32,
        });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_shape_empty_input() {
        assert!(matches!(
            build_shape(&[], "shape_1"),
            Err(Error::EmptyShapeInput)
        ));
    }

    #[test]
    fn test_build_shape_single_point() {
        let points = build_shape(&[Coordinate { lat: 39.47, lon: -0.38 }], "shape_1").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].shape_pt_sequence, 1);
        assert_eq!(points[0].shape_dist_traveled, 0);
        assert_eq!(points[0].shape_id, "shape_1");
    }

    #[test]
    fn test_build_shape_sequence_and_distance() {
        let coordinates = vec![
            Coordinate { lat: 0.0, lon: 0.0 },
            Coordinate { lat: 0.0, lon: 1.0 },
            Coordinate { lat: 0.0, lon: 2.0 },
        ];
        let points = build_shape(&coordinates, "shape_equator").unwrap();

        assert_eq!(points.len(), 3);
        let sequences: Vec<u32> = points.iter().map(|p| p.shape_pt_sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        // One degree of equatorial longitude is 111194.93 m
        assert_eq!(points[0].shape_dist_traveled, 0);
        assert_eq!(points[1].shape_dist_traveled, 111195);
        assert_eq!(points[2].shape_dist_traveled, 222390);
    }

    #[test]
    fn test_build_shape_accumulates_before_rounding() {
        // Two segments of ~0.44 m each: per-segment rounding would stay at 0,
        // accumulated distance rounds to 1 at the third point
        let coordinates = vec![
            Coordinate { lat: 0.0, lon: 0.0 },
            Coordinate { lat: 0.0, lon: 4.0e-6 },
            Coordinate { lat: 0.0, lon: 8.0e-6 },
        ];
        let points = build_shape(&coordinates, "shape_tiny").unwrap();

        let distances: Vec<u32> = points.iter().map(|p| p.shape_dist_traveled).collect();
        assert_eq!(distances, vec![0, 0, 1]);
    }

    #[test]
    fn test_build_shape_monotonic_distance() {
        let coordinates = vec![
            Coordinate { lat: 39.4699, lon: -0.3763 },
            Coordinate { lat: 39.3000, lon: -0.3200 },
            Coordinate { lat: 39.1500, lon: -0.2500 },
            Coordinate { lat: 38.9667, lon: -0.1833 },
        ];
        let points = build_shape(&coordinates, "shape_v_g").unwrap();

        for pair in points.windows(2) {
            assert!(pair[1].shape_dist_traveled >= pair[0].shape_dist_traveled);
            assert_eq!(pair[1].shape_pt_sequence, pair[0].shape_pt_sequence + 1);
        }
        assert!(points.last().unwrap().shape_dist_traveled > 50_000);
    }
}
