//! OpenAI-compatible planner.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint that
//! exposes `/chat/completions`. Two modes:
//! - tool calling: capabilities are sent as `tools`; `tool_calls` in the
//!   reply become an invoke decision, plain content a final answer
//! - ReAct: capabilities are listed in the system prompt and the reply is
//!   parsed as Thought/Action/Action Input/Final Answer text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_config::{PlannerConfig, PlannerMode};
use switchboard_core::error::PlannerError;
use switchboard_core::{
    CapabilityDescriptor, PlannedInvocation, Planner, PlannerDecision, PlanningRequest,
};
use tracing::{debug, warn};

use crate::prompt;
use crate::react;

/// A planner backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatPlanner {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    mode: PlannerMode,
    system_prompt: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatPlanner {
    /// Build from configuration. Fails with `NotConfigured` when no API key
    /// is available.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, PlannerError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PlannerError::NotConfigured(
                "no API key; set SWITCHBOARD_API_KEY or OPENAI_API_KEY, or planner.api_key".into(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PlannerError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: config.provider.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            mode: config.mode,
            system_prompt: config.system_prompt.clone(),
            timeout: config.timeout(),
            client,
        })
    }

    pub fn mode(&self) -> PlannerMode {
        self.mode
    }

    /// The chat-completions request body for one planning step.
    fn request_body(&self, request: &PlanningRequest) -> serde_json::Value {
        let system = match self.mode {
            PlannerMode::ToolCalling => self
                .system_prompt
                .clone()
                .unwrap_or_else(|| prompt::TOOL_CALLING_SYSTEM_PROMPT.to_string()),
            PlannerMode::React => {
                prompt::react_system_prompt(self.system_prompt.as_deref(), &request.capabilities)
            }
        };

        let messages = vec![
            ApiMessage {
                role: "system".into(),
                content: system,
            },
            ApiMessage {
                role: "user".into(),
                content: prompt::context_message(&request.context.transcript),
            },
        ];

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        match self.mode {
            PlannerMode::ToolCalling if !request.capabilities.is_empty() => {
                body["tools"] = serde_json::json!(to_api_tools(&request.capabilities));
            }
            PlannerMode::React => {
                body["stop"] = serde_json::json!(["\nObservation:"]);
            }
            _ => {}
        }
        body
    }
}

#[async_trait]
impl Planner for OpenAiCompatPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn plan(&self, request: PlanningRequest) -> Result<PlannerDecision, PlannerError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            planner = %self.name,
            model = %self.model,
            turn = request.turn,
            cycle = request.cycle,
            capabilities = request.capabilities.len(),
            "Sending planning request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Planner endpoint returned error");
            let message = match status {
                401 | 403 => "Invalid API key or insufficient permissions".to_string(),
                429 => format!("Rate limited: {error_body}"),
                _ => error_body,
            };
            return Err(PlannerError::Provider {
                status_code: status,
                message,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| PlannerError::Malformed(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PlannerError::Malformed("No choices in response".into()))?;

        decision_from_message(self.mode, choice.message)
    }
}

impl OpenAiCompatPlanner {
    fn transport_error(&self, e: reqwest::Error) -> PlannerError {
        if e.is_timeout() {
            PlannerError::Timeout(self.timeout)
        } else {
            PlannerError::Network(e.to_string())
        }
    }
}

/// Turn one assistant message into a validated decision.
fn decision_from_message(
    mode: PlannerMode,
    message: ApiResponseMessage,
) -> Result<PlannerDecision, PlannerError> {
    let content = message.content.unwrap_or_default();

    let decision = match mode {
        PlannerMode::React => react::parse(&content)?,
        PlannerMode::ToolCalling => {
            let calls = message.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                PlannerDecision::FinalAnswer(content.trim().to_string())
            } else {
                let invocations = calls
                    .into_iter()
                    .map(|tc| {
                        let arguments = parse_arguments(&tc.function.name, &tc.function.arguments)?;
                        Ok(PlannedInvocation::new(tc.function.name, arguments))
                    })
                    .collect::<Result<Vec<_>, PlannerError>>()?;
                PlannerDecision::Invoke(invocations)
            }
        }
    };

    decision.validate()?;
    Ok(decision)
}

/// Tool-call arguments arrive as a JSON string.
fn parse_arguments(name: &str, raw: &str) -> Result<serde_json::Value, PlannerError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| {
        PlannerError::Malformed(format!("arguments for '{name}' are not valid JSON: {e}"))
    })
}

fn to_api_tools(capabilities: &[CapabilityDescriptor]) -> Vec<ApiToolDefinition> {
    capabilities
        .iter()
        .map(|c| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: c.name.clone(),
                description: c.description.clone(),
                parameters: c.parameters.clone(),
            },
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
