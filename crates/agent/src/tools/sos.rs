use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::tools::backend::{BackendClient, GeoPoint};
use crate::tools::{parse_arguments, Tool, ToolError};

const CONTEXT: &str = "Error sending SOS alert";
pub const DEFAULT_SOS_MESSAGE: &str = "Help! I am in danger.";

pub struct SosAlertTool {
    backend: Arc<BackendClient>,
}

impl SosAlertTool {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

fn default_message() -> String {
    DEFAULT_SOS_MESSAGE.to_string()
}

#[derive(Debug, Deserialize)]
struct SosArgs {
    location: String,
    #[serde(default = "default_message")]
    custom_message: String,
}

#[async_trait]
impl Tool for SosAlertTool {
    fn name(&self) -> &'static str {
        "sos_alert"
    }

    fn description(&self) -> &'static str {
        "Send an SOS alert to emergency services. Useful for when you need to send an SOS alert \
         to emergency services for the user's location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Location address or place name without country, state or pincode"
                },
                "custom_message": {
                    "type": "string",
                    "description": "Custom message to send to emergency services",
                    "default": DEFAULT_SOS_MESSAGE
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SosArgs = parse_arguments(self.name(), arguments)?;

        let coordinates = self
            .backend
            .geocode(&args.location)
            .await
            .map_err(|error| ToolError::request(CONTEXT, error))?;

        let confirmation = self
            .backend
            .send_sos(GeoPoint::new(coordinates, args.location), &args.custom_message)
            .await
            .map_err(|error| ToolError::request(CONTEXT, error))?;

        info!(event_name = "agent.tools.sos_sent", "sos alert dispatched");
        Ok(Value::String(confirmation))
    }
}
