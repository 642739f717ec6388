//! Advisory text-generation collaborator
//!
//! Sends structured route context to a local text-generation service and
//! parses the JSON it embeds in its reply. Every failure here surfaces as
//! [`Error::AdviceUnavailable`] so callers can fall back to deterministic
//! estimates. One attempt per call, no retries.

use std::time::Duration;

use log::{debug, info, warn};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::config::ForgeConfig;
use crate::core::error::{Error, Result};
use crate::core::modes::TransportMode;

/// Context for a schedule/frequency advisory request
#[derive(Debug, Clone)]
pub struct ScheduleContext {
    pub distance_km: f64,
    pub duration_min: u32,
    pub stop_names: Vec<String>,
    pub frequency: u32,
    pub capacity: u32,
    pub service_start: String,
    pub service_end: String,
    pub mode: TransportMode,
}

/// Context for a stop-placement advisory request
#[derive(Debug, Clone)]
pub struct StopContext {
    pub origin_name: String,
    pub destination_name: String,
    pub intermediate_names: Vec<String>,
    pub distance_km: f64,
    pub duration_min: u32,
    pub zone_type: String,
    pub population_density: String,
    pub points_of_interest: Vec<String>,
}

/// Trip-count recommendation for one service day
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub total_trips: u32,
    pub peak_hour_trips: u32,
    pub off_peak_trips: u32,
    #[serde(default)]
    pub justification: String,
}

/// A service window with its headway in minutes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceWindow {
    pub start: String,
    pub end: String,
    pub frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSchedule {
    pub peak_hours: ServiceWindow,
    pub off_peak_hours: ServiceWindow,
}

/// Parsed schedule advisory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAdvice {
    pub optimal_trips: TripPlan,
    #[serde(default)]
    pub schedule: Option<ServiceSchedule>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// A planned stop in GTFS column naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub stop_sequence: u32,
    #[serde(default)]
    pub justification: String,
}

/// Advisory view of one inter-stop segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentAdvice {
    pub from_stop: String,
    pub to_stop: String,
    pub distance_km: f64,
    pub estimated_time_min: f64,
    #[serde(default)]
    pub demand_level: String,
}

/// Parsed stop-placement advisory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAdvice {
    #[serde(default)]
    pub optimized_stops: Vec<PlannedStop>,
    #[serde(default)]
    pub route_segments: Vec<SegmentAdvice>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Locate the JSON object embedded in free-form advisory text.
///
/// Takes everything from the first `{` to the last `}` so prose before
/// and after the object is tolerated.
fn extract_json(text: &str) -> Result<&str> {
    let start = text
        .find('{')
        .ok_or_else(|| Error::AdviceUnavailable("no JSON object in advisory response".into()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| Error::AdviceUnavailable("no JSON object in advisory response".into()))?;
    Ok(&text[start..=end])
}

/// Client for the text-generation advisory service
pub struct NarrativeAdvisor {
    client: Client,
    config: ForgeConfig,
}

impl NarrativeAdvisor {
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

    /// Ask for trip counts and service windows for a computed route
    pub async fn advise_schedule(&self, context: &ScheduleContext) -> Result<ScheduleAdvice> {
        let prompt = render_schedule_prompt(context);
        let text = self.generate(&prompt).await?;
        let advice: ScheduleAdvice = parse_advice(&text)?;

        debug!(
            "Schedule advice: {} total trips, {} peak-hour trips",
            advice.optimal_trips.total_trips, advice.optimal_trips.peak_hour_trips
        );
        Ok(advice)
    }

    /// Ask for optimized stop placement along a computed route.
    ///
    /// An advisory that proposes zero stops is treated as unavailable.
    pub async fn advise_stops(&self, context: &StopContext) -> Result<StopAdvice> {
        let prompt = render_stop_prompt(context);
        let text = self.generate(&prompt).await?;
        let advice: StopAdvice = parse_advice(&text)?;

        if advice.optimized_stops.is_empty() {
            return Err(Error::AdviceUnavailable(
                "advisory proposed no stops".into(),
            ));
        }

        debug!("Stop advice: {} stops proposed", advice.optimized_stops.len());
        Ok(advice)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.config.generate_url();
        let body = json!({
            "model": self.config.ollama_model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
            }
        });

        info!("Requesting advice from model {}", self.config.ollama_model);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::AdviceUnavailable(format!("advisory request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Advisory service returned {status}");
            return Err(Error::AdviceUnavailable(format!(
                "advisory service returned {status}"
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::AdviceUnavailable(format!("malformed advisory response: {e}")))?;

        Ok(generated.response)
    }
}

fn parse_advice<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let raw = extract_json(text)?;
    serde_json::from_str(raw)
        .map_err(|e| Error::AdviceUnavailable(format!("advisory JSON did not parse: {e}")))
}

fn render_schedule_prompt(context: &ScheduleContext) -> String {
    format!(
        r#"Analyze this street-routed transit line and plan its service:

Route data:
- Total distance: {distance:.2} km
- Estimated travel time: {duration} minutes
- Number of stops: {stops_count}
- Stops: {stops}

Service parameters:
- Target frequency: {frequency} minutes
- Vehicle capacity: {capacity} passengers
- Service hours: {start} - {end}
- Transport mode: {mode}

Respond with a JSON object of this exact shape:
{{
  "optimalTrips": {{
    "totalTrips": number,
    "peakHourTrips": number,
    "offPeakTrips": number,
    "justification": "reasoning behind the numbers"
  }},
  "schedule": {{
    "peakHours": {{"start": "HH:MM", "end": "HH:MM", "frequency": number}},
    "offPeakHours": {{"start": "HH:MM", "end": "HH:MM", "frequency": number}}
  }},
  "recommendations": ["recommendation 1", "recommendation 2"]
}}

Weigh real travel time against the target frequency, and vehicle capacity
against the demand a line of this length can expect."#,
        distance = context.distance_km,
        duration = context.duration_min,
        stops_count = context.stop_names.len(),
        stops = json!(context.stop_names),
        frequency = context.frequency,
        capacity = context.capacity,
        start = context.service_start,
        end = context.service_end,
        mode = context.mode,
    )
}

fn render_stop_prompt(context: &StopContext) -> String {
    format!(
        r#"Optimize the stop placement of this transit route using real map data:

Current route:
- Origin: {origin}
- Destination: {destination}
- Intermediate stops: {intermediate}
- Total distance: {distance:.2} km
- Total time: {duration} minutes

Urban context:
- Zone type: {zone}
- Population density: {density}
- Points of interest: {pois}

Respond with a JSON object of this exact shape:
{{
  "optimizedStops": [
    {{
      "stop_id": "string",
      "stop_name": "string",
      "stop_lat": number,
      "stop_lon": number,
      "stop_sequence": number,
      "justification": "why this stop matters"
    }}
  ],
  "routeSegments": [
    {{
      "from_stop": "string",
      "to_stop": "string",
      "distance_km": number,
      "estimated_time_min": number,
      "demand_level": "high|medium|low"
    }}
  ],
  "recommendations": ["optimization recommendation"]
}}

Keep stop spacing between 300 and 800 meters in urban areas and favor
transfer points and accessible locations."#,
        origin = context.origin_name,
        destination = context.destination_name,
        intermediate = json!(context.intermediate_names),
        distance = context.distance_km,
        duration = context.duration_min,
        zone = context.zone_type,
        density = context.population_density,
        pois = json!(context.points_of_interest),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ForgeConfig {
        ForgeConfig {
            ollama_url: base_url.to_string(),
            ..Default::default()
        }
    }

    fn schedule_context() -> ScheduleContext {
        ScheduleContext {
            distance_km: 64.3,
            duration_min: 64,
            stop_names: vec![
                "Valencia, Estación del Norte".to_string(),
                "Gandía, Estación de Tren".to_string(),
            ],
            frequency: 30,
            capacity: 50,
            service_start: "06:00".to_string(),
            service_end: "22:00".to_string(),
            mode: TransportMode::Bus,
        }
    }

    fn stop_context() -> StopContext {
        StopContext {
            origin_name: "Valencia, Estación del Norte".to_string(),
            destination_name: "Gandía, Estación de Tren".to_string(),
            intermediate_names: vec![],
            distance_km: 64.3,
            duration_min: 64,
            zone_type: "mixed".to_string(),
            population_density: "medium".to_string(),
            points_of_interest: vec![],
        }
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Here is my analysis:\n{\"a\": 1}\nHope that helps.";
        assert_eq!(extract_json(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_takes_outermost_braces() {
        let text = "intro {\"a\": {\"b\": 2}} outro";
        assert_eq!(extract_json(text).unwrap(), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(matches!(
            extract_json("no object here"),
            Err(Error::AdviceUnavailable(_))
        ));
        assert!(matches!(
            extract_json("} backwards {"),
            Err(Error::AdviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_advise_schedule_parses_embedded_json() {
        let server = MockServer::start().await;
        let reply = concat!(
            "Based on the route data, here is my plan:\n",
            "{\"optimalTrips\": {\"totalTrips\": 40, \"peakHourTrips\": 48, ",
            "\"offPeakTrips\": 24, \"justification\": \"long suburban line\"}, ",
            "\"schedule\": {\"peakHours\": {\"start\": \"07:00\", \"end\": \"09:00\", \"frequency\": 5}, ",
            "\"offPeakHours\": {\"start\": \"09:00\", \"end\": \"22:00\", \"frequency\": 30}}, ",
            "\"recommendations\": [\"add express trips\"]}\n",
            "Let me know if you need more detail."
        );

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": reply})),
            )
            .mount(&server)
            .await;

        let advisor = NarrativeAdvisor::new(&test_config(&server.uri()));
        let advice = advisor.advise_schedule(&schedule_context()).await.unwrap();

        assert_eq!(advice.optimal_trips.total_trips, 40);
        assert_eq!(advice.optimal_trips.peak_hour_trips, 48);
        let schedule = advice.schedule.unwrap();
        assert_eq!(schedule.peak_hours.frequency, 5);
        assert_eq!(advice.recommendations, vec!["add express trips"]);
    }

    #[tokio::test]
    async fn test_advise_schedule_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"response": "I think {totalTrips: lots} would work"}),
            ))
            .mount(&server)
            .await;

        let advisor = NarrativeAdvisor::new(&test_config(&server.uri()));
        let err = advisor
            .advise_schedule(&schedule_context())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_advise_stops_rejects_empty_stop_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "{\"optimizedStops\": [], \"routeSegments\": [], \"recommendations\": []}"
            })))
            .mount(&server)
            .await;

        let advisor = NarrativeAdvisor::new(&test_config(&server.uri()));
        let err = advisor.advise_stops(&stop_context()).await.unwrap_err();
        assert!(matches!(err, Error::AdviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_advise_stops_parses_gtfs_columns() {
        let server = MockServer::start().await;
        let reply = concat!(
            "{\"optimizedStops\": [",
            "{\"stop_id\": \"stop_1\", \"stop_name\": \"Estación del Norte\", ",
            "\"stop_lat\": 39.4665, \"stop_lon\": -0.3773, \"stop_sequence\": 1, ",
            "\"justification\": \"main rail terminus\"}],",
            "\"routeSegments\": [",
            "{\"from_stop\": \"stop_1\", \"to_stop\": \"stop_2\", \"distance_km\": 2.4, ",
            "\"estimated_time_min\": 6, \"demand_level\": \"high\"}],",
            "\"recommendations\": []}"
        );

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": reply})),
            )
            .mount(&server)
            .await;

        let advisor = NarrativeAdvisor::new(&test_config(&server.uri()));
        let advice = advisor.advise_stops(&stop_context()).await.unwrap();

        assert_eq!(advice.optimized_stops.len(), 1);
        assert_eq!(advice.optimized_stops[0].stop_name, "Estación del Norte");
        assert_eq!(advice.optimized_stops[0].stop_sequence, 1);
        assert_eq!(advice.route_segments[0].demand_level, "high");
    }

    #[tokio::test]
    async fn test_advisory_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let advisor = NarrativeAdvisor::new(&test_config(&server.uri()));
        let err = advisor
            .advise_schedule(&schedule_context())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_advisory_unreachable_is_unavailable() {
        let advisor = NarrativeAdvisor::new(&test_config("http://127.0.0.1:1"));
        let err = advisor
            .advise_schedule(&schedule_context())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdviceUnavailable(_)));
    }

    #[test]
    fn test_schedule_prompt_contains_context() {
        let prompt = render_schedule_prompt(&schedule_context());
        assert!(prompt.contains("64.30 km"));
        assert!(prompt.contains("Valencia, Estación del Norte"));
        assert!(prompt.contains("Target frequency: 30 minutes"));
        assert!(prompt.contains("\"optimalTrips\""));
    }
}
