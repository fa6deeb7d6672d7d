use anyhow::{Context, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{
    Message, MessageRole, Provider, ProviderFuture, ProviderResponse, ProviderUsage, ToolSpec,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
pub(crate) const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const MAX_TOKENS: u32 = 8000;

#[derive(Debug, Clone)]
pub struct Claude {
    client: reqwest::Client,
    key: String,
    model: String,
    temperature: Option<f32>,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Claude {
    pub fn new(client: reqwest::Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn find_tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    fn request_body(&self, tool: &ToolSpec) -> serde_json::Value {
        let system = self
            .messages
            .iter()
            .filter(|message| matches!(message.role, MessageRole::System))
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = self
            .messages
            .iter()
            .filter(|message| matches!(message.role, MessageRole::User))
            .map(|message| {
                json!({
                    "role": "user",
                    "content": [{"type": "text", "text": message.content}]
                })
            })
            .collect::<Vec<_>>();

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
            "tools": [
                {
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters
                }
            ],
            "tool_choice": {"type": "tool", "name": tool.name}
        });
        if !system.trim().is_empty() {
            body["system"] = json!(system);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

impl Provider for Claude {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self
                .find_tool(&tool_name)
                .cloned()
                .ok_or_else(|| anyhow!("tool '{}' not registered", tool_name))?;
            let url = base_url();
            let body = self.request_body(&tool);

            let mut attempt = 0usize;
            let mut delay = RATE_LIMIT_BASE_DELAY;
            loop {
                attempt += 1;
                let response = self
                    .client
                    .post(&url)
                    .header("x-api-key", self.key.clone())
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()
                    .await
                    .with_context(|| "failed to reach Claude")?;

                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    return extract_tool_response(&text, &tool_name, &self.model);
                }
                if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
                    delay = wait_with_backoff("Claude", attempt, delay, retry_after).await;
                    continue;
                }
                return Err(anyhow!(
                    "Claude API error ({}): {}",
                    status,
                    extract_claude_error(&text).unwrap_or(text)
                ));
            }
        })
    }
}

fn base_url() -> String {
    std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse, anyhow::Error> {
    let payload: ClaudeResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Claude response JSON: {}", err))?;
    let block = payload
        .content
        .iter()
        .find(|block| block.kind == "tool_use" && block.name.as_deref() == Some(tool_name))
        .ok_or_else(|| anyhow!("no tool call returned from Claude"))?;
    let input = block
        .input
        .clone()
        .ok_or_else(|| anyhow!("Claude tool_use missing input"))?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage
            .input_tokens
            .zip(usage.output_tokens)
            .map(|(input, output)| input + output),
    });
    Ok(ProviderResponse {
        args: input,
        model,
        usage,
    })
}

fn extract_claude_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ClaudeError>,
    }

    #[derive(Deserialize)]
    struct ClaudeError {
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = error.kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
    model: Option<String>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    input: Option<serde_json::Value>,
}
