//! Geographic primitives for gtfs-forge
//!
//! Coordinate value type and great-circle distance math.

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers-to-miles conversion factor
const MILES_PER_KM: f64 = 0.621371;

/// A WGS84 latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate, validating that both components are in range
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(Error::InvalidInput(format!(
                "latitude {lat} is out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidInput(format!(
                "longitude {lon} is out of range [-180, 180]"
            )));
        }
        Ok(Self { lat, lon })
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

impl std::str::FromStr for Coordinate {
    type Err = Error;

    /// Parse a "lat,lon" pair
    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput(format!("expected 'lat,lon', got '{s}'")))?;
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid latitude '{}'", lat.trim())))?;
        let lon: f64 = lon
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid longitude '{}'", lon.trim())))?;
        Self::new(lat, lon)
    }
}

/// Unit for distance results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnit {
    #[default]
    Kilometers,
    Meters,
    Miles,
}

/// Great-circle distance between two coordinates using the haversine formula
pub fn great_circle_distance(a: Coordinate, b: Coordinate, unit: DistanceUnit) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    let km = EARTH_RADIUS_KM * c;

    match unit {
        DistanceUnit::Kilometers => km,
        DistanceUnit::Meters => km * 1000.0,
        DistanceUnit::Miles => km * MILES_PER_KM,
    }
}
