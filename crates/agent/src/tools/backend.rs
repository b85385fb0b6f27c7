use std::time::Duration;

use chrono::Utc;
use safepath_core::config::BackendConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::tools::{http_client, ToolError};

const NEARBY_RADIUS_METERS: u32 = 5_000;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to `{endpoint}` failed: {message}")]
    Transport { endpoint: &'static str, message: String },
    #[error("`{endpoint}` returned status {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("could not decode `{endpoint}` response: {message}")]
    Decode { endpoint: &'static str, message: String },
    #[error("`{endpoint}` response is missing `{field}`")]
    MissingField { endpoint: &'static str, field: &'static str },
}

/// Coordinates exactly as the geocoder returned them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default)]
    pub latitude: Value,
    #[serde(default)]
    pub longitude: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: Value,
    pub longitude: Value,
    pub address: String,
}

impl GeoPoint {
    pub fn new(coordinates: Coordinates, address: impl Into<String>) -> Self {
        Self {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            address: address.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instructions: String,
    pub distance: String,
    pub duration: String,
}

/// Client for the SafePath maps, route-safety and SOS endpoints.
pub struct BackendClient {
    base_url: String,
    api_token: SecretString,
    user_id: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: SecretString,
        user_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            user_id: user_id.into(),
            http: http_client(timeout)?,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ToolError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            ToolError::Client("backend.base_url is not configured".to_string())
        })?;
        Self::new(
            base_url,
            config.api_token.clone(),
            config.user_id.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub async fn geocode(&self, address: &str) -> Result<Coordinates, BackendError> {
        self.post("/api/maps/get-latitude-longitude", &json!({ "address": address })).await
    }

    pub async fn nearby_safe_spots(&self, location: GeoPoint) -> Result<Value, BackendError> {
        const ENDPOINT: &str = "/api/maps/nearby-safe-spots";
        let body = json!({
            "current_location": location,
            "radius": NEARBY_RADIUS_METERS,
            "rank_by": "distance",
        });

        let mut response: Value = self.post(ENDPOINT, &body).await?;
        response
            .get_mut("predictions")
            .map(Value::take)
            .ok_or(BackendError::MissingField { endpoint: ENDPOINT, field: "predictions" })
    }

    pub async fn get_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Vec<RouteStep>, BackendError> {
        const ENDPOINT: &str = "/api/maps/get-route";
        let body = json!({ "origin": origin, "destination": destination });

        let response: Value = self.post(ENDPOINT, &body).await?;
        flatten_route_steps(&response)
            .ok_or(BackendError::MissingField { endpoint: ENDPOINT, field: "routes" })
    }

    pub async fn route_safety(&self, steps: &[RouteStep]) -> Result<Value, BackendError> {
        let response: Value =
            self.post("/api/llm/route-safety", &json!({ "route_steps": steps })).await?;
        Ok(response.get("safety_tips").cloned().unwrap_or_else(|| Value::String(String::new())))
    }

    pub async fn send_sos(
        &self,
        location: GeoPoint,
        message: &str,
    ) -> Result<String, BackendError> {
        let body = json!({
            "user_id": self.user_id,
            "timestamp": Utc::now().to_rfc3339(),
            "location": location,
            "message": message,
        });

        let response: Value = self.post("/api/sos/send-alert", &body).await?;
        Ok(response.get("message").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    async fn post<B, R>(&self, endpoint: &'static str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(event_name = "agent.backend.request", endpoint, "calling backend");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| BackendError::Transport { endpoint, message: error.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { endpoint, status: status.as_u16() });
        }

        response
            .json::<R>()
            .await
            .map_err(|error| BackendError::Decode { endpoint, message: error.to_string() })
    }
}

/// Steps of every leg of the first route. `None` when there is no route.
pub fn flatten_route_steps(response: &Value) -> Option<Vec<RouteStep>> {
    let first_route = response.get("routes")?.as_array()?.first()?;
    let text = |step: &Value, key: &str| {
        step.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
    };

    let steps = first_route
        .get("legs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|leg| leg.get("steps").and_then(Value::as_array).into_iter().flatten())
        .map(|step| RouteStep {
            instructions: text(step, "instructions"),
            distance: text(step, "readable_distance"),
            duration: text(step, "readable_duration"),
        })
        .collect();

    Some(steps)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{flatten_route_steps, Coordinates, GeoPoint, RouteStep};

    #[test]
    fn route_steps_are_flattened_across_legs_of_first_route() {
        let response = json!({
            "routes": [
                {
                    "legs": [
                        {"steps": [
                            {"instructions": "Head north", "readable_distance": "200 m", "readable_duration": "3 mins"}
                        ]},
                        {"steps": [
                            {"instructions": "Turn left", "readable_distance": "1.2 km"}
                        ]}
                    ]
                },
                {"legs": [{"steps": [{"instructions": "ignored"}]}]}
            ]
        });

        let steps = flatten_route_steps(&response).expect("steps");
        assert_eq!(
            steps,
            vec![
                RouteStep {
                    instructions: "Head north".into(),
                    distance: "200 m".into(),
                    duration: "3 mins".into(),
                },
                RouteStep {
                    instructions: "Turn left".into(),
                    distance: "1.2 km".into(),
                    duration: String::new(),
                },
            ]
        );
    }

    #[test]
    fn missing_or_empty_routes_yield_none() {
        assert_eq!(flatten_route_steps(&json!({})), None);
        assert_eq!(flatten_route_steps(&json!({"routes": []})), None);
        assert_eq!(flatten_route_steps(&json!({"routes": [{}]})), Some(Vec::new()));
    }

    #[test]
    fn geo_point_keeps_geocoder_values() {
        let coordinates: Coordinates =
            serde_json::from_value(json!({"latitude": 12.9, "longitude": "77.6"})).expect("coords");
        let point = GeoPoint::new(coordinates, "MG Road, Bengaluru");
        assert_eq!(
            serde_json::to_value(point).expect("json"),
            json!({"latitude": 12.9, "longitude": "77.6", "address": "MG Road, Bengaluru"})
        );
    }

    #[test]
    fn missing_coordinates_default_to_null() {
        let coordinates: Coordinates = serde_json::from_value(json!({})).expect("coords");
        assert!(coordinates.latitude.is_null());
    }
}
