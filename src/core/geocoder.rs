//! Place search for gtfs-forge
//!
//! Resolves free-text addresses to coordinates against a Nominatim-style
//! service, ranks ambiguous matches with a local confidence score, and
//! supports reverse lookup and nearby/filtered search.

use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::core::config::{ConfidenceWeights, ForgeConfig};
use crate::core::error::{Error, Result};
use crate::core::geo::{great_circle_distance, Coordinate, DistanceUnit};

/// Place classes that usually identify a concrete, routable place
const PREFERRED_CLASSES: &[&str] = &["administrative", "amenity", "building", "highway"];

/// Largest candidate list a caller may request
const MAX_CANDIDATES: usize = 50;

/// One interpretation of a free-text address
#[derive(Debug, Clone, Serialize)]
pub struct GeocodeCandidate {
    pub coordinate: Coordinate,
    pub display_name: String,
    pub place_class: Option<String>,
    pub place_type: Option<String>,
    /// Upstream importance, 0 when the service omits it
    pub importance: f64,
    /// Locally computed match confidence in [0, 1]
    pub confidence: f64,
    /// 1-based position in the upstream result order
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<i64>,
    /// Address components as returned by the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<serde_json::Value>,
}

impl GeocodeCandidate {
    /// Blended ranking score combining upstream importance and local confidence
    pub fn blended_score(&self) -> f64 {
        self.importance * 0.7 + self.confidence * 0.3
    }
}

/// A place found near a center coordinate
#[derive(Debug, Clone, Serialize)]
pub struct NearbyPlace {
    pub coordinate: Coordinate,
    pub name: String,
    pub place_class: Option<String>,
    pub place_type: Option<String>,
    /// Great-circle distance from the search center, in meters
    pub distance_meters: f64,
}

/// Constraints for filtered candidate search
#[derive(Debug, Clone)]
pub struct SearchFilters {
    /// Maximum number of candidates to return
    pub limit: usize,
    /// Comma-separated ISO 3166-1 alpha-2 country codes
    pub country_codes: Option<String>,
    /// Bounding box as (lon1, lat1, lon2, lat2)
    pub viewbox: Option<[f64; 4]>,
    /// Restrict results to the viewbox instead of just boosting it
    pub bounded: bool,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            limit: 20,
            country_codes: None,
            viewbox: None,
            bounded: false,
        }
    }
}

/// Raw place record as returned by the search service
#[derive(Debug, Deserialize)]
struct PlaceRecord {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    class: Option<String>,
    #[serde(rename = "type", default)]
    place_type: Option<String>,
    #[serde(default)]
    place_id: Option<i64>,
    #[serde(default)]
    address: Option<serde_json::Value>,
}

impl PlaceRecord {
    /// Parse the service's string-typed coordinates
    fn coordinate(&self) -> Result<Coordinate> {
        let lat = self.lat.parse::<f64>().map_err(|_| {
            Error::UpstreamError(format!("malformed latitude '{}' in place result", self.lat))
        })?;
        let lon = self.lon.parse::<f64>().map_err(|_| {
            Error::UpstreamError(format!("malformed longitude '{}' in place result", self.lon))
        })?;
        Ok(Coordinate { lat, lon })
    }
}

/// Compute the local confidence score for a candidate against the query.
///
/// Starts at the base weight, rewards query tokens appearing in the display
/// name, upstream importance and concrete place classes, penalizes generic
/// administrative boundaries, and clamps to [0, 1].
fn compute_confidence(
    query: &str,
    display_name: &str,
    place_class: Option<&str>,
    place_type: Option<&str>,
    importance: f64,
    weights: &ConfidenceWeights,
) -> f64 {
    let mut confidence = weights.base;
    let display_lower = display_name.to_lowercase();

    for token in query.to_lowercase().split_whitespace() {
        if display_lower.contains(token) {
            confidence += weights.token_match;
        }
    }

    confidence += importance * weights.importance_weight;

    if let Some(class) = place_class {
        if PREFERRED_CLASSES.contains(&class) {
            confidence += weights.preferred_class_bonus;
        }
    }

    if place_class == Some("boundary") && place_type == Some("administrative") {
        confidence -= weights.boundary_penalty;
    }

    confidence.clamp(0.0, 1.0)
}

/// Resolves free-text place descriptions to and from coordinates
pub struct GeoResolver {
    client: Client,
    config: ForgeConfig,
}

impl GeoResolver {
    /// Create a resolver using the given service configuration
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

    /// Resolve an address to its single best candidate
    pub async fn resolve(&self, address: &str) -> Result<GeocodeCandidate> {
        info!("Geocoding: {address}");

        let records = self.search(address, 1).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(address.to_string()))?;
        let candidate = self.candidate_from_record(record, address, 1)?;

        debug!(
            "Geocoded '{}' to {} ({})",
            address, candidate.coordinate, candidate.display_name
        );
        Ok(candidate)
    }

    /// Resolve an address to up to `limit` candidates, best first.
    ///
    /// Candidates are ordered by the blended importance/confidence score;
    /// ties keep the upstream order.
    pub async fn resolve_candidates(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<GeocodeCandidate>> {
        if limit < 1 || limit > MAX_CANDIDATES {
            return Err(Error::InvalidInput(format!(
                "candidate limit must be between 1 and {MAX_CANDIDATES}, got {limit}"
            )));
        }

        info!("Geocoding candidates: {address} (limit: {limit})");

        let records = self.search(address, limit).await?;
        if records.is_empty() {
            return Err(Error::NotFound(address.to_string()));
        }

        let mut candidates = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| self.candidate_from_record(record, address, index + 1))
            .collect::<Result<Vec<_>>>()?;

        candidates.sort_by(|a, b| {
            b.blended_score()
                .partial_cmp(&a.blended_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(candidates)
    }

    /// Resolve a coordinate back to the closest known place
    pub async fn resolve_reverse(&self, lat: f64, lon: f64) -> Result<GeocodeCandidate> {
        let coordinate = Coordinate::new(lat, lon)?;
        info!("Reverse geocoding: {coordinate}");

        let params = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("zoom", "18".to_string()),
        ];

        let response = self
            .client
            .get(self.config.reverse_url())
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::UpstreamError(format!(
                "reverse geocoding returned {status}"
            )));
        }

        // The service reports misses as an error field in a 200 body
        let body: serde_json::Value = response.json().await?;
        if body.get("error").is_some() {
            return Err(Error::NotFound(coordinate.to_string()));
        }

        let record: PlaceRecord = serde_json::from_value(body).map_err(|e| {
            Error::UpstreamError(format!("malformed reverse geocoding response: {e}"))
        })?;
        self.candidate_from_record(record, "", 1)
    }

    /// Search for places of a category around a center, distance attached.
    ///
    /// Results keep the upstream order; an empty list is not an error.
    pub async fn search_nearby(
        &self,
        center: Coordinate,
        category: &str,
        radius_meters: f64,
        limit: usize,
    ) -> Result<Vec<NearbyPlace>> {
        info!("Nearby search: {category} within {radius_meters}m of {center}");

        let params = vec![
            ("lat", center.lat.to_string()),
            ("lon", center.lon.to_string()),
            ("amenity", category.to_string()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
            ("radius", (radius_meters / 1000.0).to_string()),
        ];

        let response = self
            .client
            .get(self.config.search_url())
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::UpstreamError(format!(
                "nearby search returned {status}"
            )));
        }

        let records: Vec<PlaceRecord> = response.json().await?;
        records
            .into_iter()
            .map(|record| {
                let coordinate = record.coordinate()?;
                Ok(NearbyPlace {
                    coordinate,
                    name: record.display_name,
                    place_class: record.class,
                    place_type: record.place_type,
                    distance_meters: great_circle_distance(
                        center,
                        coordinate,
                        DistanceUnit::Meters,
                    ),
                })
            })
            .collect()
    }

    /// Candidate search constrained by country codes and/or a bounding box
    pub async fn search_filtered(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<GeocodeCandidate>> {
        if filters.limit < 1 || filters.limit > MAX_CANDIDATES {
            return Err(Error::InvalidInput(format!(
                "candidate limit must be between 1 and {MAX_CANDIDATES}, got {}",
                filters.limit
            )));
        }

        info!("Filtered search: {query}");

        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("limit", filters.limit.to_string()),
            ("addressdetails", "1".to_string()),
        ];
        if let Some(codes) = &filters.country_codes {
            params.push(("countrycodes", codes.to_lowercase()));
        }
        if let Some([lon1, lat1, lon2, lat2]) = filters.viewbox {
            params.push(("viewbox", format!("{lon1},{lat1},{lon2},{lat2}")));
        }
        if filters.bounded {
            params.push(("bounded", "1".to_string()));
        }

        let response = self
            .client
            .get(self.config.search_url())
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::UpstreamError(format!(
                "filtered search returned {status}"
            )));
        }

        let records: Vec<PlaceRecord> = response.json().await?;
        let mut candidates = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| self.candidate_from_record(record, query, index + 1))
            .collect::<Result<Vec<_>>>()?;

        candidates.sort_by(|a, b| {
            b.blended_score()
                .partial_cmp(&a.blended_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(candidates)
    }

    /// Plain address search against the place service
    async fn search(&self, address: &str, limit: usize) -> Result<Vec<PlaceRecord>> {
        let params = vec![
            ("q", address.to_string()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
            ("addressdetails", "1".to_string()),
        ];

        let response = self
            .client
            .get(self.config.search_url())
            .query(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::UpstreamError(format!(
                "place search returned {status}"
            )));
        }

        Ok(response.json().await?)
    }

    fn candidate_from_record(
        &self,
        record: PlaceRecord,
        query: &str,
        rank: usize,
    ) -> Result<GeocodeCandidate> {
        let coordinate = record.coordinate()?;
        let importance = record.importance.unwrap_or(0.0);
        let confidence = compute_confidence(
            query,
            &record.display_name,
            record.class.as_deref(),
            record.place_type.as_deref(),
            importance,
            &self.config.confidence,
        );

        Ok(GeocodeCandidate {
            coordinate,
            display_name: record.display_name,
            place_class: record.class,
            place_type: record.place_type,
            importance,
            confidence,
            rank,
            place_id: record.place_id,
            address: record.address,
        })
    }
}
