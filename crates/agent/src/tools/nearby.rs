use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::backend::{BackendClient, GeoPoint};
use crate::tools::{parse_arguments, Tool, ToolError};

const CONTEXT: &str = "Error getting nearby places";

pub struct NearbyPlacesTool {
    backend: Arc<BackendClient>,
}

impl NearbyPlacesTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[derive(Debug, Deserialize)]
struct NearbyArgs {
    location: String,
}

#[async_trait]
impl Tool for NearbyPlacesTool {
    fn name(&self) -> &'static str {
        "Nearby_Places"
    }

    fn description(&self) -> &'static str {
        "Get nearby safe places for a location. Useful for when you need to answer questions \
         about nearby safe places. This tool is only for nearby safe places and nothing else. \
         Only input location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The location to search for nearby places"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: NearbyArgs = parse_arguments(self.name(), arguments)?;

        let coordinates = self
            .backend
            .geocode(&args.location)
            .await
            .map_err(|error| ToolError::request(CONTEXT, error))?;

        self.backend
            .nearby_safe_spots(GeoPoint::new(coordinates, args.location))
            .await
            .map_err(|error| ToolError::request(CONTEXT, error))
    }
}
