//! # gtfs-forge
//!
//! Synthesizes schedule-ready transit routes from free-text requests.
//! Addresses are resolved against a place-search service, the street path
//! between them is computed by an OSRM-style router, and an optional
//! text-generation advisor proposes service frequencies and stop
//! placement. Advisory failures never abort a synthesis; deterministic
//! fallbacks take over and the artifact records which path ran.
//!
//! ## Example usage
//!
//! ```no_run
//! use gtfs_forge::RouteRequest;
//!
//! # async fn demo() -> gtfs_forge::Result<()> {
//! let mut request = RouteRequest::new(
//!     "Valencia, Estación del Norte",
//!     "Gandía, Estación de Tren",
//! );
//! request.frequency = 20;
//!
//! let artifact = gtfs_forge::synthesize(&request).await?;
//! println!(
//!     "{}: {} stops, {} shape points",
//!     artifact.route.route_id,
//!     artifact.stops.len(),
//!     artifact.shapes.len(),
//! );
//! # Ok(())
//! # }
//! ```

mod core;

pub use crate::core::advisor::{
    NarrativeAdvisor, PlannedStop, ScheduleAdvice, ScheduleContext, SegmentAdvice,
    ServiceSchedule, ServiceWindow, StopAdvice, StopContext, TripPlan,
};
pub use crate::core::config::{env_config, ConfidenceWeights, ForgeConfig};
pub use crate::core::error::{Error, Result};
pub use crate::core::geo::{great_circle_distance, Coordinate, DistanceUnit};
pub use crate::core::geocoder::{GeoResolver, GeocodeCandidate, NearbyPlace, SearchFilters};
pub use crate::core::modes::{RoutingProfile, TransportMode};
pub use crate::core::router::{
    estimate_travel_time, optimize_waypoint_order, PathEngine, PathLeg, PathResult,
};
pub use crate::core::shape::{build_shape, ShapePoint};
pub use crate::core::synthesizer::{
    AdviceSource, ExistingRoute, HealthReport, ImprovedRoute, ProgressCallback, Provenance,
    RouteArtifact, RouteMetadata, RouteRequest, RouteSynthesizer, RouteValidation, ServiceHours,
    SynthesisOptions, SynthesisStage,
};

/// Synthesize a route using environment-derived configuration.
///
/// Convenience wrapper over [`RouteSynthesizer::synthesize`].
pub async fn synthesize(request: &RouteRequest) -> Result<RouteArtifact> {
    RouteSynthesizer::new(env_config()).synthesize(request).await
}

/// Synthesize a route with progress reporting and cancellation.
///
/// Convenience wrapper over [`RouteSynthesizer::synthesize_with_options`].
pub async fn synthesize_with_options(
    request: &RouteRequest,
    options: SynthesisOptions,
) -> Result<RouteArtifact> {
    RouteSynthesizer::new(env_config())
        .synthesize_with_options(request, options)
        .await
}

/// Check that a path exists through the given waypoints.
///
/// Never fails; upstream errors come back as an invalid result.
pub async fn validate_route(
    waypoints: &[Coordinate],
    profile: RoutingProfile,
) -> RouteValidation {
    RouteSynthesizer::new(env_config())
        .validate_route(waypoints, profile)
        .await
}

/// Probe the configured upstream services and report reachability
pub async fn health_check() -> HealthReport {
    RouteSynthesizer::new(env_config()).health_check().await
}
