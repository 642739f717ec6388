//! Configuration for gtfs-forge services
//!
//! One config object is built at startup (defaults, then environment
//! overrides) and passed by reference into each component constructor.

use std::time::Duration;

use once_cell::sync::Lazy;

use crate::core::modes::RoutingProfile;

/// Environment-derived configuration, read once per process
static ENV_CONFIG: Lazy<ForgeConfig> = Lazy::new(ForgeConfig::from_env);

/// The process-wide configuration snapshot built from the environment
pub fn env_config() -> &'static ForgeConfig {
    &ENV_CONFIG
}

/// Weights for the local geocoding confidence score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    /// Starting confidence before any signal is applied
    pub base: f64,
    /// Bonus per query token found in the candidate's display name
    pub token_match: f64,
    /// Multiplier applied to the upstream importance value
    pub importance_weight: f64,
    /// Bonus for place classes that usually identify concrete places
    pub preferred_class_bonus: f64,
    /// Penalty for generic administrative boundaries
    pub boundary_penalty: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            token_match: 0.1,
            importance_weight: 0.3,
            preferred_class_bonus: 0.1,
            boundary_penalty: 0.1,
        }
    }
}

/// Configuration for geocoding, routing and advisory services
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Base URL of the Nominatim-compatible place search service
    pub nominatim_url: String,

    /// Base URL of the OSRM-compatible road routing service
    pub osrm_url: String,

    /// Identifying User-Agent sent with every geo request
    pub user_agent: String,

    /// Routing profile used when a request does not imply one
    pub default_profile: RoutingProfile,

    /// Maximum number of waypoints accepted per routing request
    pub max_waypoints: usize,

    /// Per-call timeout for all network requests
    pub timeout: Duration,

    /// Base URL of the Ollama-compatible advisory service
    pub ollama_url: String,

    /// Model name sent to the advisory service
    pub ollama_model: String,

    /// Sampling temperature for advisory generation
    pub temperature: f64,

    /// Address used by the health check's geocoding probe
    pub health_probe_address: String,

    /// Confidence scoring weights for candidate ranking
    pub confidence: ConfidenceWeights,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            osrm_url: "http://router.project-osrm.org".to_string(),
            user_agent: format!("gtfs-forge/{}", env!("CARGO_PKG_VERSION")),
            default_profile: RoutingProfile::Driving,
            max_waypoints: 25,
            timeout: Duration::from_secs(30),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            temperature: 0.7,
            health_probe_address: "Madrid, España".to_string(),
            confidence: ConfidenceWeights::default(),
        }
    }
}

impl ForgeConfig {
    /// Build a configuration from defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NOMINATIM_BASE_URL") {
            config.nominatim_url = url;
        }
        if let Ok(url) = std::env::var("OSRM_BASE_URL") {
            config.osrm_url = url;
        }
        if let Ok(agent) = std::env::var("OSM_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(profile) = std::env::var("DEFAULT_ROUTING_PROFILE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.default_profile = profile;
        }
        if let Some(max) = std::env::var("MAX_WAYPOINTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_waypoints = max;
        }
        if let Some(secs) = std::env::var("ROUTING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.ollama_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.ollama_model = model;
        }
        if let Some(temperature) = std::env::var("OLLAMA_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.temperature = temperature;
        }

        config
    }

    /// Nominatim search endpoint
    pub fn search_url(&self) -> String {
        format!("{}/search", self.nominatim_url.trim_end_matches('/'))
    }

    /// Nominatim reverse lookup endpoint
    pub fn reverse_url(&self) -> String {
        format!("{}/reverse", self.nominatim_url.trim_end_matches('/'))
    }

    /// OSRM route endpoint for a profile and an encoded coordinate list
    pub fn route_url(&self, profile: &str, coordinates: &str) -> String {
        format!(
            "{}/route/v1/{}/{}",
            self.osrm_url.trim_end_matches('/'),
            profile,
            coordinates
        )
    }

    /// Ollama generate endpoint
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.ollama_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.nominatim_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.osrm_url, "http://router.project-osrm.org");
        assert_eq!(config.max_waypoints, 25);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.default_profile, RoutingProfile::Driving);
        assert!(config.user_agent.starts_with("gtfs-forge/"));
    }

    #[test]
    fn test_confidence_defaults() {
        let weights = ConfidenceWeights::default();
        assert_eq!(weights.base, 0.5);
        assert_eq!(weights.token_match, 0.1);
        assert_eq!(weights.importance_weight, 0.3);
        assert_eq!(weights.preferred_class_bonus, 0.1);
        assert_eq!(weights.boundary_penalty, 0.1);
    }

    #[test]
    fn test_endpoint_urls() {
        let mut config = ForgeConfig::default();
        config.nominatim_url = "http://localhost:8080/".to_string();
        config.osrm_url = "http://localhost:5000".to_string();
        config.ollama_url = "http://localhost:11434".to_string();

        assert_eq!(config.search_url(), "http://localhost:8080/search");
        assert_eq!(config.reverse_url(), "http://localhost:8080/reverse");
        assert_eq!(
            config.route_url("driving", "1.0,2.0;3.0,4.0"),
            "http://localhost:5000/route/v1/driving/1.0,2.0;3.0,4.0"
        );
        assert_eq!(config.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("MAX_WAYPOINTS", "12");
        std::env::set_var("ROUTING_TIMEOUT_SECS", "5");

        let config = ForgeConfig::from_env();
        assert_eq!(config.max_waypoints, 12);
        assert_eq!(config.timeout, Duration::from_secs(5));

        std::env::remove_var("MAX_WAYPOINTS");
        std::env::remove_var("ROUTING_TIMEOUT_SECS");
    }
}
