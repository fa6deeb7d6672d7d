use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod claude;
mod openai;
mod retry;

pub use claude::Claude;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAI,
    Claude,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Claude => "claude",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => openai::DEFAULT_MODEL,
            ProviderKind::Claude => claude::DEFAULT_MODEL,
        }
    }
}

/// A parsed `provider:model` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelSpec {
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// Builder-style request against a hosted model. Every call starts from a
/// clone of the configured provider, so the configured value itself never
/// accumulates messages.
pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ProviderFuture;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    OpenAI(OpenAI),
    Claude(Claude),
}

impl Provider for ProviderImpl {
    fn append_system_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_system_input(input))
            }
            ProviderImpl::Claude(provider) => {
                ProviderImpl::Claude(provider.append_system_input(input))
            }
        }
    }

    fn append_user_input(self, input: String) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => {
                ProviderImpl::OpenAI(provider.append_user_input(input))
            }
            ProviderImpl::Claude(provider) => {
                ProviderImpl::Claude(provider.append_user_input(input))
            }
        }
    }

    fn register_tool(self, tool: ToolSpec) -> Self {
        match self {
            ProviderImpl::OpenAI(provider) => ProviderImpl::OpenAI(provider.register_tool(tool)),
            ProviderImpl::Claude(provider) => ProviderImpl::Claude(provider.register_tool(tool)),
        }
    }

    fn call_tool(self, tool_name: &str) -> ProviderFuture {
        match self {
            ProviderImpl::OpenAI(provider) => provider.call_tool(tool_name),
            ProviderImpl::Claude(provider) => provider.call_tool(tool_name),
        }
    }
}

pub fn build_provider(
    client: reqwest::Client,
    spec: &ModelSpec,
    key: String,
    temperature: Option<f32>,
) -> ProviderImpl {
    match spec.provider {
        ProviderKind::OpenAI => ProviderImpl::OpenAI(
            OpenAI::new(client, key)
                .with_model(spec.model.clone())
                .with_temperature(temperature),
        ),
        ProviderKind::Claude => ProviderImpl::Claude(
            Claude::new(client, key)
                .with_model(spec.model.clone())
                .with_temperature(temperature),
        ),
    }
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }

    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Claude => get_env("ANTHROPIC_API_KEY"),
    }
    .ok_or_else(|| anyhow!("API key not found for provider {}", provider.as_str()))
}

/// Parses `provider`, `provider:` or `provider:model`. A bare provider name
/// selects that provider's default model.
pub fn parse_model_spec(model_arg: &str) -> Result<ModelSpec> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }

    let (provider_part, model_part) = raw.split_once(':').unwrap_or((raw, ""));
    let provider = provider_from_name(&provider_part.trim().to_lowercase()).ok_or_else(|| {
        anyhow!(
            "unable to infer provider from model '{}'. Use provider:model (openai:, claude:)",
            raw
        )
    })?;
    let model = model_part.trim();
    let model = if model.is_empty() {
        provider.default_model().to_string()
    } else {
        model.to_string()
    };
    Ok(ModelSpec { provider, model })
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "openai" => Some(ProviderKind::OpenAI),
        "claude" | "anthropic" => Some(ProviderKind::Claude),
        _ => None,
    }
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
