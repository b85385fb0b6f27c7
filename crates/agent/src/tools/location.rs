use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::{http_client, Tool, ToolError};

const CONTEXT: &str = "Error getting current location";

/// IP-based geolocation (ipinfo.io response shape).
pub struct CurrentLocationTool {
    url: String,
    http: reqwest::Client,
}

impl CurrentLocationTool {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ToolError> {
        Ok(Self { url: url.into(), http: http_client(timeout)? })
    }

    async fn lookup(&self) -> Result<CurrentLocation, String> {
        let response = self.http.get(&self.url).send().await.map_err(|error| error.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("Failed to get location data: {}", status.as_u16()));
        }

        let payload: IpInfo = response.json().await.map_err(|error| error.to_string())?;
        CurrentLocation::from_ipinfo(payload)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IpInfo {
    ip: String,
    city: String,
    region: String,
    country: String,
    postal: String,
    loc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CurrentLocation {
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub postal: String,
    pub latitude: String,
    pub longitude: String,
    pub address: String,
}

impl CurrentLocation {
    fn from_ipinfo(info: IpInfo) -> Result<Self, String> {
        let loc = info
            .loc
            .ok_or_else(|| "Location coordinates not found in the response".to_string())?;
        let (latitude, longitude) = loc
            .split_once(',')
            .filter(|(_, longitude)| !longitude.contains(','))
            .ok_or_else(|| format!("malformed coordinates `{loc}`"))?;

        Ok(Self {
            address: format!("{}, {}, {}", info.city, info.region, info.country),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            ip: info.ip,
            city: info.city,
            region: info.region,
            country: info.country,
            postal: info.postal,
        })
    }
}

#[async_trait]
impl Tool for CurrentLocationTool {
    fn name(&self) -> &'static str {
        "Current_Location"
    }

    fn description(&self) -> &'static str {
        "Get the current location based on IP address. Useful for when you need to determine \
         the user's current location. Returns address, latitude, longitude, city and country."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        let location = self.lookup().await.map_err(|error| ToolError::request(CONTEXT, error))?;
        serde_json::to_value(location)
            .map_err(|error| ToolError::UnexpectedResponse(error.to_string()))
    }
}
