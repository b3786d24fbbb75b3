use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::to_value;
use crate::dispatch::{Dispatcher, SendOutcome};
use crate::tools::{parse_params, schema_of, Tool};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendMessageParams {
    /// Phone number (digits, optional leading '+') or a full chat id such as a group id
    pub recipient: String,
    /// Text to send
    pub text: String,
}

pub struct SendMessageTool {
    pub dispatcher: Arc<Dispatcher>,
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a text message to a phone number or chat. Always returns {success, message}; failures are reported, never retried."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SendMessageParams>()
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let outcome = match parse_params::<SendMessageParams>(self.name(), params) {
            Ok(params) => self.dispatcher.send(&params.recipient, &params.text).await,
            Err(e) => SendOutcome {
                success: false,
                message: e.to_string(),
            },
        };
        to_value(&outcome)
    }
}
