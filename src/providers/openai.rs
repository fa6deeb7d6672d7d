use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{
    Message, MessageRole, Provider, ProviderFuture, ProviderResponse, ProviderUsage, ToolSpec,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    key: String,
    model: String,
    temperature: Option<f32>,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl OpenAI {
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

    fn find_tool(&self, name: &str) -> Result<&ToolSpec> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| anyhow!("tool '{}' not registered", name))
    }
}

impl Provider for OpenAI {
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
            let tool = self.find_tool(&tool_name)?.clone();
            call_with_chat_completions(self, tool, &tool_name).await
        })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn request_body(provider: &OpenAI, tool: &ToolSpec) -> serde_json::Value {
    let messages = provider
        .messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => json!({"role": "system", "content": message.content}),
            MessageRole::User => json!({"role": "user", "content": message.content}),
        })
        .collect::<Vec<_>>();

    let mut body = json!({
        "model": provider.model,
        "messages": messages,
        "tools": [
            {
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters
                }
            }
        ],
        "tool_choice": {"type": "function", "function": {"name": tool.name}}
    });
    if let Some(temperature) = provider.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

async fn call_with_chat_completions(
    provider: OpenAI,
    tool: ToolSpec,
    tool_name: &str,
) -> Result<ProviderResponse> {
    let url = format!("{}/chat/completions", base_url());
    let body = request_body(&provider, &tool);

    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = provider
            .client
            .post(&url)
            .bearer_auth(provider.key.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| "failed to reach OpenAI")?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return extract_tool_response(&text, tool_name, &provider.model);
        }
        if is_rate_limited(status, &text) && attempt < RATE_LIMIT_MAX_RETRIES {
            delay = wait_with_backoff("OpenAI", attempt, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!(
            "OpenAI API error ({}): {}",
            status,
            extract_openai_error(&text).unwrap_or(text)
        ));
    }
}

fn extract_tool_response(
    text: &str,
    tool_name: &str,
    fallback_model: &str,
) -> Result<ProviderResponse> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ProviderResponse { args, model, usage })
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL_RESPONSE: &str = r#"{
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "message": {
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "deliver_translations",
                        "arguments": "{\"translations\":[\"Hallo\",\"Welt\"]}"
                    }
                }]
            }
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 9, "total_tokens": 129}
    }"#;

    #[test]
    fn extracts_tool_arguments_and_usage() {
        let response =
            extract_tool_response(TOOL_RESPONSE, "deliver_translations", "gpt-4o-mini").unwrap();
        assert_eq!(
            response.args,
            json!({"translations": ["Hallo", "Welt"]})
        );
        assert_eq!(response.model.as_deref(), Some("gpt-4o-mini-2024-07-18"));
        assert_eq!(response.usage.and_then(|usage| usage.total_tokens), Some(129));
    }

    #[test]
    fn rejects_other_tool_names() {
        let err = extract_tool_response(TOOL_RESPONSE, "something_else", "gpt-4o-mini")
            .unwrap_err();
        assert!(err.to_string().contains("unexpected tool name"));
    }

    #[test]
    fn formats_api_errors() {
        let body = r#"{"error":{"message":"The model does not exist","type":"invalid_request_error","code":"model_not_found"}}"#;
        assert_eq!(
            extract_openai_error(body).as_deref(),
            Some("The model does not exist | type: invalid_request_error | code: model_not_found")
        );
        assert_eq!(extract_openai_error("not json"), None);
    }

    #[test]
    fn body_forces_tool_and_carries_temperature() {
        let provider = OpenAI::new(reqwest::Client::new(), "key")
            .with_model("gpt-4o")
            .with_temperature(Some(0.2))
            .append_system_input("sys".to_string())
            .append_user_input("user".to_string());
        let tool = ToolSpec {
            name: "deliver_translations".to_string(),
            description: "d".to_string(),
            parameters: json!({"type": "object"}),
        };
        let body = request_body(&provider, &tool);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(
            body["tool_choice"]["function"]["name"],
            "deliver_translations"
        );
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }
}
