//! Error types for the gtfs-forge library
//!
//! Covers geocoding, routing, advisory and synthesis failures.

use std::fmt;

use strsim::{jaro_winkler, normalized_levenshtein};

/// Transport mode names accepted by the request parser
const MODE_NAMES: &[&str] = &[
    "bus",
    "subway",
    "tram",
    "ferry",
    "cable_tram",
    "aerial_lift",
    "funicular",
    "trolleybus",
    "monorail",
    "walking",
];

/// Minimum combined similarity for a mode suggestion
const SUGGESTION_THRESHOLD: f64 = 0.65;

/// Suggest a correction for a potentially misspelled transport mode
pub fn suggest_mode(input: &str) -> Option<&'static str> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    for &candidate in MODE_NAMES {
        // Exact match (ignoring case) needs no suggestion
        if candidate == input_lower {
            return None;
        }

        // Jaro-Winkler catches transposition/prefix typos, normalized
        // Levenshtein catches insertions and deletions
        let score = jaro_winkler(&input_lower, candidate) * 0.7
            + normalized_levenshtein(&input_lower, candidate) * 0.3;

        if score >= SUGGESTION_THRESHOLD && score > best_score {
            best_score = score;
            best_match = Some(candidate);
        }
    }

    best_match
}

/// Main error type for gtfs-forge operations
#[derive(Debug)]
pub enum Error {
    /// Malformed caller data (out-of-range coordinates, bad limits, bad mode)
    InvalidInput(String),

    /// The upstream service had no answer for the query
    NotFound(String),

    /// Network, timeout or 5xx failure from an external service
    UpstreamError(String),

    /// The routing service explicitly found no path
    NoRouteFound,

    /// Fewer than two waypoints were given to the router
    InsufficientWaypoints(usize),

    /// More waypoints than the configured maximum
    WaypointLimitExceeded { count: usize, max: usize },

    /// Shape emission was asked to work from an empty coordinate list
    EmptyShapeInput,

    /// Advisory text was unparseable or the advisory service failed; always recoverable
    AdviceUnavailable(String),

    /// A required address could not be geocoded; aborts the synthesis
    GeocodingFailed { address: String, source: Box<Error> },

    /// The street path for the route could not be computed; aborts the synthesis
    PathComputationFailed(Box<Error>),

    /// Shape points could not be derived from the computed path
    ShapeGenerationFailed(String),

    /// The caller cancelled the operation
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::NotFound(query) => {
                write!(f, "No results found for '{}'", query)
            }
            Error::UpstreamError(msg) => {
                write!(f, "Upstream service error: {}", msg)
            }
            Error::NoRouteFound => {
                write!(f, "No route found between the given waypoints")
            }
            Error::InsufficientWaypoints(count) => {
                write!(f, "At least 2 waypoints are required, got {}", count)
            }
            Error::WaypointLimitExceeded { count, max } => {
                write!(f, "Too many waypoints: {} exceeds the maximum of {}", count, max)
            }
            Error::EmptyShapeInput => {
                write!(f, "Cannot build a shape from an empty coordinate list")
            }
            Error::AdviceUnavailable(reason) => {
                write!(f, "Advice unavailable: {}", reason)
            }
            Error::GeocodingFailed { address, source } => {
                write!(f, "Geocoding failed for '{}': {}", address, source)
            }
            Error::PathComputationFailed(source) => {
                write!(f, "Path computation failed: {}", source)
            }
            Error::ShapeGenerationFailed(msg) => {
                write!(f, "Shape generation failed: {}", msg)
            }
            Error::Cancelled => {
                write!(f, "Operation cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::GeocodingFailed { source, .. } => Some(source.as_ref()),
            Error::PathComputationFailed(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamError(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Error::UpstreamError(format!("connection failed: {err}"))
        } else {
            Error::UpstreamError(err.to_string())
        }
    }
}

/// Convenience result type for gtfs-forge operations
pub type Result<T> = std::result::Result<T, Error>;
