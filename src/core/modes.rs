//! Transport modes and their GTFS/routing mappings
//!
//! Maps each supported mode to its GTFS route_type code, its average
//! commercial speed and the routing profile used for path computation.

use serde::{Deserialize, Serialize};

use crate::core::error::{suggest_mode, Error, Result};

/// Supported transport modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Bus,
    #[serde(alias = "metro")]
    Subway,
    Tram,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
    Walking,
}

impl TransportMode {
    /// GTFS route_type code for this mode
    pub fn route_type(&self) -> u16 {
        match self {
            TransportMode::Tram => 0,
            TransportMode::Subway => 1,
            TransportMode::Bus => 3,
            TransportMode::Ferry => 4,
            TransportMode::CableTram => 5,
            TransportMode::AerialLift => 6,
            TransportMode::Funicular => 7,
            TransportMode::Trolleybus => 11,
            TransportMode::Monorail => 12,
            // GTFS has no walking code; treated as a bus-like surface route
            TransportMode::Walking => 3,
        }
    }

    /// Average commercial speed in km/h, used when the router reports no duration
    pub fn average_speed_kmh(&self) -> f64 {
        match self {
            TransportMode::Subway => 35.0,
            TransportMode::Tram => 20.0,
            TransportMode::Ferry => 15.0,
            TransportMode::Walking => 5.0,
            _ => 25.0,
        }
    }

    /// Routing profile used when computing the street path for this mode
    pub fn routing_profile(&self) -> RoutingProfile {
        match self {
            TransportMode::Walking => RoutingProfile::Foot,
            _ => RoutingProfile::Driving,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Bus => "bus",
            TransportMode::Subway => "subway",
            TransportMode::Tram => "tram",
            TransportMode::Ferry => "ferry",
            TransportMode::CableTram => "cable_tram",
            TransportMode::AerialLift => "aerial_lift",
            TransportMode::Funicular => "funicular",
            TransportMode::Trolleybus => "trolleybus",
            TransportMode::Monorail => "monorail",
            TransportMode::Walking => "walking",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bus" => Ok(TransportMode::Bus),
            "subway" | "metro" => Ok(TransportMode::Subway),
            "tram" => Ok(TransportMode::Tram),
            "ferry" => Ok(TransportMode::Ferry),
            "cable_tram" => Ok(TransportMode::CableTram),
            "aerial_lift" => Ok(TransportMode::AerialLift),
            "funicular" => Ok(TransportMode::Funicular),
            "trolleybus" => Ok(TransportMode::Trolleybus),
            "monorail" => Ok(TransportMode::Monorail),
            "walking" => Ok(TransportMode::Walking),
            other => match suggest_mode(other) {
                Some(suggestion) => Err(Error::InvalidInput(format!(
                    "unknown transport mode '{other}'. Did you mean '{suggestion}'?"
                ))),
                None => Err(Error::InvalidInput(format!(
                    "unknown transport mode '{other}'. Valid modes: bus, subway, tram, ferry, \
                     cable_tram, aerial_lift, funicular, trolleybus, monorail, walking"
                ))),
            },
        }
    }
}

/// Routing profile understood by the road-routing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingProfile {
    #[default]
    Driving,
    Foot,
}

impl RoutingProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingProfile::Driving => "driving",
            RoutingProfile::Foot => "foot",
        }
    }
}

impl std::fmt::Display for RoutingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoutingProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "driving" | "car" => Ok(RoutingProfile::Driving),
            "foot" | "walking" => Ok(RoutingProfile::Foot),
            other => Err(Error::InvalidInput(format!(
                "unknown routing profile '{other}' (expected 'driving' or 'foot')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_type_codes() {
        assert_eq!(TransportMode::Tram.route_type(), 0);
        assert_eq!(TransportMode::Subway.route_type(), 1);
        assert_eq!(TransportMode::Bus.route_type(), 3);
        assert_eq!(TransportMode::Ferry.route_type(), 4);
        assert_eq!(TransportMode::CableTram.route_type(), 5);
        assert_eq!(TransportMode::AerialLift.route_type(), 6);
        assert_eq!(TransportMode::Funicular.route_type(), 7);
        assert_eq!(TransportMode::Trolleybus.route_type(), 11);
        assert_eq!(TransportMode::Monorail.route_type(), 12);
        assert_eq!(TransportMode::Walking.route_type(), 3);
    }

    #[test]
    fn test_routing_profiles() {
        assert_eq!(TransportMode::Bus.routing_profile(), RoutingProfile::Driving);
        assert_eq!(TransportMode::Ferry.routing_profile(), RoutingProfile::Driving);
        assert_eq!(TransportMode::Walking.routing_profile(), RoutingProfile::Foot);
    }

    #[test]
    fn test_average_speeds() {
        assert_eq!(TransportMode::Bus.average_speed_kmh(), 25.0);
        assert_eq!(TransportMode::Subway.average_speed_kmh(), 35.0);
        assert_eq!(TransportMode::Tram.average_speed_kmh(), 20.0);
        assert_eq!(TransportMode::Ferry.average_speed_kmh(), 15.0);
        assert_eq!(TransportMode::Walking.average_speed_kmh(), 5.0);
        assert_eq!(TransportMode::Monorail.average_speed_kmh(), 25.0);
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("bus".parse::<TransportMode>().unwrap(), TransportMode::Bus);
        assert_eq!("Metro".parse::<TransportMode>().unwrap(), TransportMode::Subway);
        assert_eq!("cable_tram".parse::<TransportMode>().unwrap(), TransportMode::CableTram);
    }

    #[test]
    fn test_parse_mode_suggestion() {
        let err = "trma".parse::<TransportMode>().unwrap_err();
        assert!(err.to_string().contains("Did you mean 'tram'?"), "{err}");

        let err = "spaceship".parse::<TransportMode>().unwrap_err();
        assert!(err.to_string().contains("Valid modes"), "{err}");
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(serde_json::to_string(&TransportMode::CableTram).unwrap(), "\"cable_tram\"");
        let mode: TransportMode = serde_json::from_str("\"metro\"").unwrap();
        assert_eq!(mode, TransportMode::Subway);
    }
}
