use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::backend::{BackendClient, BackendError, GeoPoint};
use crate::tools::{parse_arguments, Tool, ToolError};

const CONTEXT: &str = "Error getting route";

pub struct RouteTool {
    backend: Arc<BackendClient>,
}

impl RouteTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }

    async fn plan(&self, start: String, destination: String) -> Result<Value, BackendError> {
        let origin = GeoPoint::new(self.backend.geocode(&start).await?, start);
        let target = GeoPoint::new(self.backend.geocode(&destination).await?, destination);

        let route_steps = self.backend.get_route(origin, target).await?;
        let safety_tips = self.backend.route_safety(&route_steps).await?;

        Ok(json!({ "route_steps": route_steps, "safety_tips": safety_tips }))
    }
}

#[derive(Debug, Deserialize)]
struct RouteArgs {
    start: String,
    destination: String,
}

#[async_trait]
impl Tool for RouteTool {
    fn name(&self) -> &'static str {
        "get_route"
    }

    fn description(&self) -> &'static str {
        "Get a route between two locations. Useful for when you need to find directions between \
         two places. Returns the navigation steps and safety tips for the route. Use only the \
         area and city name for start and destination."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "start": {
                    "type": "string",
                    "description": "Starting location or place name without country, state or pincode"
                },
                "destination": {
                    "type": "string",
                    "description": "Destination location or place name without country, state or pincode"
                }
            },
            "required": ["start", "destination"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: RouteArgs = parse_arguments(self.name(), arguments)?;
        self.plan(args.start, args.destination)
            .await
            .map_err(|error| ToolError::request(CONTEXT, error))
    }
}
