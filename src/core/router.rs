//! Street path computation for gtfs-forge
//!
//! Talks to an OSRM-style routing service, decodes the returned polyline
//! geometry and derives travel-time estimates for transit modes.

use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::core::config::ForgeConfig;
use crate::core::error::{Error, Result};
use crate::core::geo::{great_circle_distance, Coordinate, DistanceUnit};
use crate::core::modes::{RoutingProfile, TransportMode};

/// Travel-time estimate when neither duration nor distance is usable
const FALLBACK_TRAVEL_TIME_MIN: u32 = 30;

/// Precision of the polyline geometry requested from the routing service
const GEOMETRY_PRECISION: u32 = 6;

/// A computed street path across an ordered list of waypoints
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub distance_meters: f64,
    /// Travel duration reported by the router, absent when it gave none
    pub duration_seconds: Option<f64>,
    /// Decoded path geometry, ordered from first to last waypoint
    pub coordinates: Vec<Coordinate>,
    pub legs: Vec<PathLeg>,
}

/// One leg of a path, between two consecutive waypoints
#[derive(Debug, Clone, Serialize)]
pub struct PathLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub summary: String,
}

/// Raw routing response
#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<RouteRecord>,
}

#[derive(Debug, Deserialize)]
struct RouteRecord {
    distance: f64,
    duration: f64,
    geometry: String,
    #[serde(default)]
    legs: Vec<LegRecord>,
}

#[derive(Debug, Deserialize)]
struct LegRecord {
    distance: f64,
    duration: f64,
    #[serde(default)]
    summary: String,
}

/// Estimate travel time in minutes for a computed path.
///
/// Prefers the router's duration; falls back to distance over the mode's
/// average speed; floors at 30 minutes when neither is usable. Never
/// returns zero.
pub fn estimate_travel_time(path: &PathResult, mode: TransportMode) -> u32 {
    if let Some(duration) = path.duration_seconds {
        if duration > 0.0 {
            return ((duration / 60.0).round() as u32).max(1);
        }
    }

    if path.distance_meters > 0.0 {
        let hours = path.distance_meters / 1000.0 / mode.average_speed_kmh();
        return ((hours * 60.0).round() as u32).max(1);
    }

    FALLBACK_TRAVEL_TIME_MIN
}

/// Reorder intermediate waypoints by ascending distance from the origin
pub fn optimize_waypoint_order(origin: Coordinate, waypoints: &[Coordinate]) -> Vec<Coordinate> {
    if waypoints.len() <= 1 {
        return waypoints.to_vec();
    }

    let mut with_distance: Vec<(f64, Coordinate)> = waypoints
        .iter()
        .map(|waypoint| {
            (
                great_circle_distance(origin, *waypoint, DistanceUnit::Kilometers),
                *waypoint,
            )
        })
        .collect();
    with_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    with_distance.into_iter().map(|(_, waypoint)| waypoint).collect()
}

/// Computes drivable/ridable paths through an OSRM-style routing service
pub struct PathEngine {
    client: Client,
    config: ForgeConfig,
}

impl PathEngine {
    /// Create a path engine using the given service configuration
    pub fn new(config: &ForgeConfig) -> Self {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Compute a path through the waypoints in order.
    ///
    /// Requires 2 to `max_waypoints` points. The returned geometry is the
    /// decoded full-overview polyline.
    pub async fn compute_path(
        &self,
        waypoints: &[Coordinate],
        profile: RoutingProfile,
    ) -> Result<PathResult> {
        if waypoints.len() < 2 {
            return Err(Error::InsufficientWaypoints(waypoints.len()));
        }
        if waypoints.len() > self.config.max_waypoints {
            return Err(Error::WaypointLimitExceeded {
                count: waypoints.len(),
                max: self.config.max_waypoints,
            });
        }

        // The routing service takes lon,lat pairs separated by semicolons
        let coordinate_list = waypoints
            .iter()
            .map(|c| format!("{},{}", c.lon, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = self.config.route_url(profile.as_str(), &coordinate_list);

        let params = [
            ("overview", "full"),
            ("geometries", "polyline6"),
            ("steps", "false"),
            ("alternatives", "false"),
        ];

        info!("Routing: {} waypoints, profile: {}", waypoints.len(), profile);

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            // The routing service reports an unroutable request as a 4xx
            // with a code field in the body
            if let Ok(body) = response.json::<RouteResponse>().await {
                if body.code.as_deref() == Some("NoRoute") {
                    return Err(Error::NoRouteFound);
                }
            }
            return Err(Error::UpstreamError(format!(
                "routing service returned {status}"
            )));
        }

        let body: RouteResponse = response.json().await?;
        if let Some(code) = &body.code {
            if code != "Ok" {
                return Err(Error::NoRouteFound);
            }
        }
        let route = body.routes.into_iter().next().ok_or(Error::NoRouteFound)?;

        let coordinates = decode_geometry(&route.geometry)?;
        debug!(
            "Route computed: {:.0}m, {:.0}s, {} geometry points",
            route.distance,
            route.duration,
            coordinates.len()
        );

        Ok(PathResult {
            distance_meters: route.distance,
            duration_seconds: Some(route.duration),
            coordinates,
            legs: route
                .legs
                .into_iter()
                .map(|leg| PathLeg {
                    distance_meters: leg.distance,
                    duration_seconds: leg.duration,
                    summary: leg.summary,
                })
                .collect(),
        })
    }
}

/// Decode an encoded polyline geometry into a coordinate sequence
fn decode_geometry(geometry: &str) -> Result<Vec<Coordinate>> {
    let line = polyline::decode_polyline(geometry, GEOMETRY_PRECISION)
        .map_err(|e| Error::UpstreamError(format!("malformed route geometry: {e}")))?;

    Ok(line
        .coords()
        .map(|c| Coordinate { lat: c.y, lon: c.x })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, LineString};
    use serde_json::json;
    use wiremock::matchers::{method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ForgeConfig {
        ForgeConfig {
            osrm_url: base_url.to_string(),
            ..Default::default()
        }
    }

    fn encode_test_geometry(coordinates: &[(f64, f64)]) -> String {
        let line = LineString::new(
            coordinates
                .iter()
                .map(|(lat, lon)| coord! { x: *lon, y: *lat })
                .collect(),
        );
        polyline::encode_coordinates(line, GEOMETRY_PRECISION).unwrap()
    }

    #[tokio::test]
    async fn test_compute_path_insufficient_waypoints() {
        let engine = PathEngine::new(&test_config("http://127.0.0.1:1"));
        let err = engine
            .compute_path(&[Coordinate { lat: 39.47, lon: -0.38 }], RoutingProfile::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientWaypoints(1)));
    }

    #[tokio::test]
    async fn test_compute_path_waypoint_limit() {
        let engine = PathEngine::new(&test_config("http://127.0.0.1:1"));
        let waypoints = vec![Coordinate { lat: 0.0, lon: 0.0 }; 26];
        let err = engine
            .compute_path(&waypoints, RoutingProfile::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WaypointLimitExceeded { count: 26, max: 25 }));
    }

    #[tokio::test]
    async fn test_compute_path_decodes_geometry() {
        let server = MockServer::start().await;
        let geometry =
            encode_test_geometry(&[(39.4699, -0.3763), (39.2000, -0.3000), (38.9667, -0.1833)]);

        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/driving/.*"))
            .and(query_param("geometries", "polyline6"))
            .and(query_param("overview", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "routes": [{
                    "distance": 64280.5,
                    "duration": 3841.2,
                    "geometry": geometry,
                    "legs": [
                        {"distance": 30000.0, "duration": 1800.0, "summary": "CV-500"},
                        {"distance": 34280.5, "duration": 2041.2, "summary": "N-332"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let engine = PathEngine::new(&test_config(&server.uri()));
        let waypoints = vec![
            Coordinate { lat: 39.4699, lon: -0.3763 },
            Coordinate { lat: 38.9667, lon: -0.1833 },
        ];
        let path = engine
            .compute_path(&waypoints, RoutingProfile::Driving)
            .await
            .unwrap();

        assert_eq!(path.distance_meters, 64280.5);
        assert_eq!(path.duration_seconds, Some(3841.2));
        assert_eq!(path.coordinates.len(), 3);
        assert!((path.coordinates[0].lat - 39.4699).abs() < 1e-5);
        assert!((path.coordinates[0].lon - (-0.3763)).abs() < 1e-5);
        assert!((path.coordinates[2].lat - 38.9667).abs() < 1e-5);
        assert_eq!(path.legs.len(), 2);
        assert_eq!(path.legs[0].summary, "CV-500");
    }

    #[tokio::test]
    async fn test_compute_path_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/.*"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "NoRoute",
                "message": "Impossible route between points"
            })))
            .mount(&server)
            .await;

        let engine = PathEngine::new(&test_config(&server.uri()));
        let waypoints = vec![
            Coordinate { lat: 39.47, lon: -0.38 },
            Coordinate { lat: -36.85, lon: 174.76 },
        ];
        let err = engine
            .compute_path(&waypoints, RoutingProfile::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRouteFound));
    }

    #[tokio::test]
    async fn test_compute_path_empty_routes_is_no_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/.*"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": "Ok", "routes": []})),
            )
            .mount(&server)
            .await;

        let engine = PathEngine::new(&test_config(&server.uri()));
        let waypoints = vec![
            Coordinate { lat: 39.47, lon: -0.38 },
            Coordinate { lat: 38.97, lon: -0.18 },
        ];
        let err = engine
            .compute_path(&waypoints, RoutingProfile::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRouteFound));
    }

    #[tokio::test]
    async fn test_compute_path_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/.*"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = PathEngine::new(&test_config(&server.uri()));
        let waypoints = vec![
            Coordinate { lat: 39.47, lon: -0.38 },
            Coordinate { lat: 38.97, lon: -0.18 },
        ];
        let err = engine
            .compute_path(&waypoints, RoutingProfile::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamError(_)));
    }

    #[test]
    fn test_estimate_prefers_router_duration() {
        let path = PathResult {
            distance_meters: 64000.0,
            duration_seconds: Some(1800.0),
            coordinates: vec![],
            legs: vec![],
        };
        assert_eq!(estimate_travel_time(&path, TransportMode::Bus), 30);
    }

    #[test]
    fn test_estimate_distance_fallback() {
        let path = PathResult {
            distance_meters: 30000.0,
            duration_seconds: None,
            coordinates: vec![],
            legs: vec![],
        };
        // 30 km at 25 km/h is 72 minutes
        assert_eq!(estimate_travel_time(&path, TransportMode::Bus), 72);
        // 30 km at 35 km/h rounds to 51 minutes
        assert_eq!(estimate_travel_time(&path, TransportMode::Subway), 51);
    }

    #[test]
    fn test_estimate_floor_and_minimum() {
        let unusable = PathResult {
            distance_meters: 0.0,
            duration_seconds: None,
            coordinates: vec![],
            legs: vec![],
        };
        assert_eq!(estimate_travel_time(&unusable, TransportMode::Bus), 30);

        let very_short = PathResult {
            distance_meters: 10.0,
            duration_seconds: Some(5.0),
            coordinates: vec![],
            legs: vec![],
        };
        assert_eq!(estimate_travel_time(&very_short, TransportMode::Bus), 1);
    }

    #[test]
    fn test_optimize_waypoint_order() {
        let origin = Coordinate { lat: 39.4699, lon: -0.3763 };
        let far = Coordinate { lat: 38.9667, lon: -0.1833 };
        let mid = Coordinate { lat: 39.2000, lon: -0.3000 };
        let near = Coordinate { lat: 39.4000, lon: -0.3500 };

        let ordered = optimize_waypoint_order(origin, &[far, near, mid]);
        assert_eq!(ordered, vec![near, mid, far]);

        // Zero or one waypoint passes through untouched
        assert_eq!(optimize_waypoint_order(origin, &[far]), vec![far]);
        assert!(optimize_waypoint_order(origin, &[]).is_empty());
    }
}
