//! Route synthesis orchestration
//!
//! Drives the full pipeline from a free-text route request to a
//! schedule-ready artifact: geocode the addresses, compute a street path,
//! gather advisory recommendations (with deterministic fallbacks when the
//! advisor is unavailable) and emit GTFS shape points.
//!
//! Geocoding and path computation are fatal stages. Advisory calls never
//! abort a synthesis; the artifact's provenance records whether each one
//! used live advice or a local fallback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::advisor::{
    NarrativeAdvisor, PlannedStop, ScheduleAdvice, ScheduleContext, SegmentAdvice,
    ServiceSchedule, ServiceWindow, StopAdvice, StopContext, TripPlan,
};
use crate::core::config::ForgeConfig;
use crate::core::error::{Error, Result};
use crate::core::geo::{great_circle_distance, Coordinate, DistanceUnit};
use crate::core::geocoder::{GeoResolver, GeocodeCandidate};
use crate::core::modes::{RoutingProfile, TransportMode};
use crate::core::router::{estimate_travel_time, PathEngine, PathResult};
use crate::core::shape::{build_shape, ShapePoint};

/// Coordinate used for the routing probe when the geocoding probe fails
const FALLBACK_PROBE: Coordinate = Coordinate {
    lat: 40.4168,
    lon: -3.7038,
};

fn default_frequency() -> u32 {
    30
}

fn default_capacity() -> u32 {
    50
}

fn default_short_name() -> String {
    "R1".to_string()
}

fn default_color() -> String {
    "FF0000".to_string()
}

fn default_text_color() -> String {
    "FFFFFF".to_string()
}

fn default_zone_type() -> String {
    "mixed".to_string()
}

fn default_population_density() -> String {
    "medium".to_string()
}

/// Daily service window in HH:MM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHours {
    pub start: String,
    pub end: String,
}

impl Default for ServiceHours {
    fn default() -> Self {
        Self {
            start: "06:00".to_string(),
            end: "22:00".to_string(),
        }
    }
}

/// Input aggregate describing the route to synthesize.
///
/// Only `origin` and `destination` are required; everything else has a
/// serviceable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub intermediate_stops: Vec<String>,
    /// Target headway in minutes
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default)]
    pub service_hours: ServiceHours,
    #[serde(default)]
    pub mode: TransportMode,
    /// Vehicle capacity in passengers
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub shape_id: Option<String>,
    #[serde(default = "default_short_name")]
    pub short_name: String,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_zone_type")]
    pub zone_type: String,
    #[serde(default = "default_population_density")]
    pub population_density: String,
    #[serde(default)]
    pub points_of_interest: Vec<String>,
}

impl RouteRequest {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            intermediate_stops: Vec::new(),
            frequency: default_frequency(),
            service_hours: ServiceHours::default(),
            mode: TransportMode::default(),
            capacity: default_capacity(),
            route_id: None,
            shape_id: None,
            short_name: default_short_name(),
            long_name: None,
            description: None,
            color: default_color(),
            text_color: default_text_color(),
            zone_type: default_zone_type(),
            population_density: default_population_density(),
            points_of_interest: Vec::new(),
        }
    }
}

/// GTFS routes.txt row for the synthesized route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_desc: String,
    pub route_type: u16,
    pub route_color: String,
    pub route_text_color: String,
}

/// Whether an advisory stage used live advice or a local fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub schedule_source: AdviceSource,
    pub stops_source: AdviceSource,
    /// Whether the shape geometry came from the street router
    pub street_geometry: bool,
    pub generated_at: DateTime<Utc>,
}

/// Finished synthesis output, ready for GTFS emission
#[derive(Debug, Clone, Serialize)]
pub struct RouteArtifact {
    pub route: RouteMetadata,
    pub stops: Vec<PlannedStop>,
    pub shapes: Vec<ShapePoint>,
    pub route_data: PathResult,
    pub schedule_advice: ScheduleAdvice,
    pub route_segments: Vec<SegmentAdvice>,
    pub provenance: Provenance,
}

/// An already-built route whose geometry should be recomputed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingRoute {
    pub route_id: String,
    #[serde(default)]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub mode: TransportMode,
    pub stops: Vec<PlannedStop>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImprovedRoute {
    pub route_id: String,
    pub stops: Vec<PlannedStop>,
    pub shapes: Vec<ShapePoint>,
    pub route_data: PathResult,
    pub improved_at: DateTime<Utc>,
}

/// Result of a drivability check. Produced for every input, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct RouteValidation {
    pub is_valid: bool,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub coordinates: Vec<Coordinate>,
    pub message: String,
}

/// Reachability report for the upstream services
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub geocoding_ok: bool,
    pub routing_ok: bool,
    pub probe_address: String,
    pub probe_coordinate: Option<Coordinate>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Pipeline stage reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStage {
    Geocoding,
    PathComputation,
    Advisory,
    ShapeEmission,
}

impl fmt::Display for SynthesisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynthesisStage::Geocoding => "geocoding",
            SynthesisStage::PathComputation => "path-computation",
            SynthesisStage::Advisory => "advisory",
            SynthesisStage::ShapeEmission => "shape-emission",
        };
        write!(f, "{name}")
    }
}

pub type ProgressCallback = Arc<dyn Fn(SynthesisStage) + Send + Sync>;

/// Per-call knobs for [`RouteSynthesizer::synthesize_with_options`]
#[derive(Clone, Default)]
pub struct SynthesisOptions {
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancellationToken>,
    /// Reorder intermediate stops by distance from the origin
    pub optimize_stop_order: bool,
}

/// Race a future against an optional cancellation token.
///
/// Cancellation wins ties, drops the inner future and aborts whatever
/// network call it was suspended on.
async fn run_cancellable<F>(cancel: &Option<CancellationToken>, fut: F) -> Result<F::Output>
where
    F: Future,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            output = fut => Ok(output),
        },
        None => Ok(fut.await),
    }
}

fn notify(options: &SynthesisOptions, stage: SynthesisStage) {
    if let Some(callback) = &options.progress {
        callback(stage);
    }
}

fn waypoint_label(candidate: &GeocodeCandidate) -> String {
    if candidate.display_name.is_empty() {
        candidate.coordinate.to_string()
    } else {
        candidate.display_name.clone()
    }
}

/// Sort intermediate stops by ascending distance from the origin
fn order_intermediates(
    origin: Coordinate,
    mut intermediates: Vec<GeocodeCandidate>,
) -> Vec<GeocodeCandidate> {
    intermediates.sort_by(|a, b| {
        let da = great_circle_distance(origin, a.coordinate, DistanceUnit::Kilometers);
        let db = great_circle_distance(origin, b.coordinate, DistanceUnit::Kilometers);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    intermediates
}

fn build_route_metadata(request: &RouteRequest) -> RouteMetadata {
    RouteMetadata {
        route_id: request
            .route_id
            .clone()
            .unwrap_or_else(|| format!("route_{}", Utc::now().timestamp_millis())),
        route_short_name: request.short_name.clone(),
        route_long_name: request
            .long_name
            .clone()
            .unwrap_or_else(|| format!("{} - {}", request.origin, request.destination)),
        route_desc: request
            .description
            .clone()
            .unwrap_or_else(|| "Route generated from real street data".to_string()),
        route_type: request.mode.route_type(),
        route_color: request.color.clone(),
        route_text_color: request.text_color.clone(),
    }
}

/// Deterministic schedule estimate for when the advisor is unavailable.
///
/// Assumes a 16-hour service day with a fixed two-hour peak window at
/// 5-minute spacing and the requested headway off-peak.
fn fallback_schedule_advice(path: &PathResult, request: &RouteRequest) -> ScheduleAdvice {
    let frequency = request.frequency.max(1);
    let distance_km = path.distance_meters / 1000.0;
    let duration_min = estimate_travel_time(path, request.mode);

    ScheduleAdvice {
        optimal_trips: TripPlan {
            total_trips: ((16.0 * 60.0 / f64::from(frequency)).round() as u32).max(10),
            peak_hour_trips: 4 * 60 / 5,
            off_peak_trips: (12.0 * 60.0 / f64::from(frequency)).round() as u32,
            justification: "Derived from the route's measured distance and travel time"
                .to_string(),
        },
        schedule: Some(ServiceSchedule {
            peak_hours: ServiceWindow {
                start: "07:00".to_string(),
                end: "09:00".to_string(),
                frequency: 5,
            },
            off_peak_hours: ServiceWindow {
                start: "09:00".to_string(),
                end: "22:00".to_string(),
                frequency,
            },
        }),
        recommendations: vec![
            format!("{distance_km:.1} km route with a travel time of {duration_min} minutes"),
            "Adjust frequency once real demand is known".to_string(),
        ],
    }
}

/// One stop per resolved waypoint, in waypoint order
fn fallback_stop_advice(waypoints: &[GeocodeCandidate]) -> StopAdvice {
    let stops = waypoints
        .iter()
        .enumerate()
        .map(|(index, waypoint)| PlannedStop {
            stop_id: format!("stop_{}", index + 1),
            stop_name: if waypoint.display_name.is_empty() {
                format!("Stop {}", index + 1)
            } else {
                waypoint.display_name.clone()
            },
            stop_lat: waypoint.coordinate.lat,
            stop_lon: waypoint.coordinate.lon,
            stop_sequence: (index + 1) as u32,
            justification: "Placed on a resolved route waypoint".to_string(),
        })
        .collect();

    StopAdvice {
        optimized_stops: stops,
        route_segments: Vec::new(),
        recommendations: vec!["Stops mirror the resolved waypoints".to_string()],
    }
}

/// Orchestrates geocoding, routing, advisory and shape emission
pub struct RouteSynthesizer {
    geocoder: GeoResolver,
    router: PathEngine,
    advisor: NarrativeAdvisor,
    config: ForgeConfig,
}

impl RouteSynthesizer {
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            geocoder: GeoResolver::new(config),
            router: PathEngine::new(config),
            advisor: NarrativeAdvisor::new(config),
            config: config.clone(),
        }
    }

    /// Synthesize a route with default options
    pub async fn synthesize(&self, request: &RouteRequest) -> Result<RouteArtifact> {
        self.synthesize_with_options(request, SynthesisOptions::default())
            .await
    }

    /// Synthesize a route, reporting progress and honoring cancellation.
    ///
    /// Returns no partial artifact: geocoding and path failures abort the
    /// whole synthesis, and cancellation aborts it at the next suspension
    /// point.
    pub async fn synthesize_with_options(
        &self,
        request: &RouteRequest,
        options: SynthesisOptions,
    ) -> Result<RouteArtifact> {
        info!(
            "Synthesizing route: {} -> {} ({} intermediate stops)",
            request.origin,
            request.destination,
            request.intermediate_stops.len()
        );

        notify(&options, SynthesisStage::Geocoding);
        let origin = self.resolve_address(&options, &request.origin).await?;
        let destination = self.resolve_address(&options, &request.destination).await?;
        let mut intermediates = Vec::with_capacity(request.intermediate_stops.len());
        for address in &request.intermediate_stops {
            intermediates.push(self.resolve_address(&options, address).await?);
        }
        if options.optimize_stop_order {
            intermediates = order_intermediates(origin.coordinate, intermediates);
        }

        let mut waypoints = Vec::with_capacity(intermediates.len() + 2);
        waypoints.push(origin);
        waypoints.append(&mut intermediates);
        waypoints.push(destination);

        notify(&options, SynthesisStage::PathComputation);
        let coordinates: Vec<Coordinate> = waypoints.iter().map(|w| w.coordinate).collect();
        let profile = request.mode.routing_profile();
        let path = run_cancellable(&options.cancel, self.router.compute_path(&coordinates, profile))
            .await?
            .map_err(|e| Error::PathComputationFailed(Box::new(e)))?;

        notify(&options, SynthesisStage::Advisory);
        let schedule_context = self.schedule_context(request, &path, &waypoints);
        let stop_context = self.stop_context(request, &path, &waypoints);
        let (schedule_result, stops_result) = run_cancellable(&options.cancel, async {
            futures::join!(
                self.advisor.advise_schedule(&schedule_context),
                self.advisor.advise_stops(&stop_context),
            )
        })
        .await?;

        let (schedule_advice, schedule_source) = match schedule_result {
            Ok(advice) => (advice, AdviceSource::Live),
            Err(e) => {
                warn!("Schedule advisory unavailable, using local estimate: {e}");
                (fallback_schedule_advice(&path, request), AdviceSource::Fallback)
            }
        };
        let (stop_advice, stops_source) = match stops_result {
            Ok(advice) => (advice, AdviceSource::Live),
            Err(e) => {
                warn!("Stop advisory unavailable, using waypoint stops: {e}");
                (fallback_stop_advice(&waypoints), AdviceSource::Fallback)
            }
        };

        notify(&options, SynthesisStage::ShapeEmission);
        let shape_id = request
            .shape_id
            .clone()
            .unwrap_or_else(|| format!("shape_{}", Utc::now().timestamp_millis()));
        let shapes = build_shape(&path.coordinates, &shape_id)
            .map_err(|e| Error::ShapeGenerationFailed(e.to_string()))?;

        let artifact = RouteArtifact {
            route: build_route_metadata(request),
            stops: stop_advice.optimized_stops,
            shapes,
            route_data: path,
            schedule_advice,
            route_segments: stop_advice.route_segments,
            provenance: Provenance {
                schedule_source,
                stops_source,
                // Shapes are always derived from the computed street path
                street_geometry: true,
                generated_at: Utc::now(),
            },
        };

        info!(
            "Route synthesized: {} ({} stops, {} shape points, {:.1} km)",
            artifact.route.route_id,
            artifact.stops.len(),
            artifact.shapes.len(),
            artifact.route_data.distance_meters / 1000.0
        );
        Ok(artifact)
    }

    /// Recompute geometry for an existing route's stop coordinates
    pub async fn improve_route(&self, existing: &ExistingRoute) -> Result<ImprovedRoute> {
        info!("Improving route geometry: {}", existing.route_id);

        let coordinates: Vec<Coordinate> = existing
            .stops
            .iter()
            .map(|stop| Coordinate {
                lat: stop.stop_lat,
                lon: stop.stop_lon,
            })
            .collect();

        let path = self
            .router
            .compute_path(&coordinates, existing.mode.routing_profile())
            .await
            .map_err(|e| Error::PathComputationFailed(Box::new(e)))?;

        let shape_id = existing
            .shape_id
            .clone()
            .unwrap_or_else(|| format!("shape_{}", existing.route_id));
        let shapes = build_shape(&path.coordinates, &shape_id)
            .map_err(|e| Error::ShapeGenerationFailed(e.to_string()))?;

        Ok(ImprovedRoute {
            route_id: existing.route_id.clone(),
            stops: existing.stops.clone(),
            shapes,
            route_data: path,
            improved_at: Utc::now(),
        })
    }

    /// Check that a path exists through the given waypoints.
    ///
    /// Always returns a structured result, even on upstream failure.
    pub async fn validate_route(
        &self,
        waypoints: &[Coordinate],
        profile: RoutingProfile,
    ) -> RouteValidation {
        match self.router.compute_path(waypoints, profile).await {
            Ok(path) => RouteValidation {
                is_valid: true,
                distance_meters: path.distance_meters,
                duration_seconds: path.duration_seconds.unwrap_or(0.0),
                coordinates: path.coordinates,
                message: "Route is valid and drivable".to_string(),
            },
            Err(e) => RouteValidation {
                is_valid: false,
                distance_meters: 0.0,
                duration_seconds: 0.0,
                coordinates: Vec::new(),
                message: format!("Route not drivable: {e}"),
            },
        }
    }

    /// Probe the upstream services with one cheap geocoding round trip
    /// and one short routing request
    pub async fn health_check(&self) -> HealthReport {
        let probe_address = self.config.health_probe_address.clone();
        let mut error = None;

        let probe_coordinate = match self.geocoder.resolve(&probe_address).await {
            Ok(candidate) => Some(candidate.coordinate),
            Err(e) => {
                error = Some(e.to_string());
                None
            }
        };
        let geocoding_ok = probe_coordinate.is_some();

        let anchor = probe_coordinate.unwrap_or(FALLBACK_PROBE);
        let offset = Coordinate {
            lat: anchor.lat + 0.01,
            lon: anchor.lon,
        };
        // A service that answers NoRoute is still reachable
        let routing_ok = match self
            .router
            .compute_path(&[anchor, offset], RoutingProfile::Driving)
            .await
        {
            Ok(_) | Err(Error::NoRouteFound) => true,
            Err(e) => {
                if error.is_none() {
                    error = Some(e.to_string());
                }
                false
            }
        };

        HealthReport {
            healthy: geocoding_ok && routing_ok,
            geocoding_ok,
            routing_ok,
            probe_address,
            probe_coordinate,
            error,
            checked_at: Utc::now(),
        }
    }

    async fn resolve_address(
        &self,
        options: &SynthesisOptions,
        address: &str,
    ) -> Result<GeocodeCandidate> {
        run_cancellable(&options.cancel, self.geocoder.resolve(address))
            .await?
            .map_err(|e| Error::GeocodingFailed {
                address: address.to_string(),
                source: Box::new(e),
            })
    }

    fn schedule_context(
        &self,
        request: &RouteRequest,
        path: &PathResult,
        waypoints: &[GeocodeCandidate],
    ) -> ScheduleContext {
        ScheduleContext {
            distance_km: path.distance_meters / 1000.0,
            duration_min: estimate_travel_time(path, request.mode),
            stop_names: waypoints.iter().map(waypoint_label).collect(),
            frequency: request.frequency,
            capacity: request.capacity,
            service_start: request.service_hours.start.clone(),
            service_end: request.service_hours.end.clone(),
            mode: request.mode,
        }
    }

    fn stop_context(
        &self,
        request: &RouteRequest,
        path: &PathResult,
        waypoints: &[GeocodeCandidate],
    ) -> StopContext {
        let last = waypoints.len().saturating_sub(1);
        StopContext {
            origin_name: waypoints.first().map(waypoint_label).unwrap_or_default(),
            destination_name: waypoints.get(last).map(waypoint_label).unwrap_or_default(),
            intermediate_names: waypoints[1..last].iter().map(waypoint_label).collect(),
            distance_km: path.distance_meters / 1000.0,
            duration_min: estimate_travel_time(path, request.mode),
            zone_type: request.zone_type.clone(),
            population_density: request.population_density.clone(),
            points_of_interest: request.points_of_interest.clone(),
        }
    }
}
