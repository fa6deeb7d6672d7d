use anyhow::{Context, Result};
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use super::{BatchRequest, Gateway, GatewayFuture};
use crate::error::GatewayError;
use crate::providers::{Provider, ToolSpec};

pub const TOOL_NAME: &str = "deliver_translations";

const SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.tera");

/// Gateway backed by a chat-completion provider that is forced to answer
/// through the `deliver_translations` tool.
#[derive(Debug, Clone)]
pub struct LlmGateway<P: Provider> {
    name: String,
    provider: P,
}

impl<P: Provider> LlmGateway<P> {
    pub fn new(name: impl Into<String>, provider: P) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    fn transport_error(&self, err: anyhow::Error) -> GatewayError {
        GatewayError::Transport {
            gateway: self.name.clone(),
            message: format!("{:#}", err),
        }
    }
}

impl<P: Provider + 'static> Gateway for LlmGateway<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate<'a>(&'a self, request: &'a BatchRequest) -> GatewayFuture<'a> {
        Box::pin(async move {
            let system_prompt =
                render_system_prompt(request, TOOL_NAME).map_err(|err| self.transport_error(err))?;
            let payload = json!({
                "target_lang": request.target_lang,
                "source_lang": request.source_lang.as_deref().unwrap_or("auto"),
                "items": request.items,
            });
            let response = self
                .provider
                .clone()
                .register_tool(tool_spec(TOOL_NAME))
                .append_system_input(system_prompt)
                .append_user_input(payload.to_string())
                .call_tool(TOOL_NAME)
                .await
                .map_err(|err| self.transport_error(err))?;
            parse_translations(&self.name, response.args)
        })
    }
}

fn tool_spec(tool_name: &str) -> ToolSpec {
    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the translated strings in input order.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "translations": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "One translation per input item, same order."
                }
            },
            "required": ["translations"]
        }),
    }
}

pub fn render_system_prompt(request: &BatchRequest, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("target_lang", request.target_lang.trim());
    context.insert(
        "source_lang",
        request
            .source_lang
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .unwrap_or("auto"),
    );
    context.insert("count", &request.items.len());
    context.insert("tool_name", tool_name);
    Tera::one_off(SYSTEM_PROMPT, &context, false).with_context(|| "failed to render system prompt")
}

/// Accepts `{"translations": [..]}` or a bare array; every entry must be a
/// string.
pub fn parse_translations(gateway: &str, args: Value) -> Result<Vec<String>, GatewayError> {
    let malformed = |message: String| GatewayError::Malformed {
        gateway: gateway.to_string(),
        message,
    };
    let values = match args {
        Value::Array(values) => values,
        Value::Object(mut map) => match map.remove("translations") {
            Some(Value::Array(values)) => values,
            Some(other) => {
                return Err(malformed(format!(
                    "translations must be an array (got {})",
                    json_kind(&other)
                )));
            }
            None => return Err(malformed("missing translations field".to_string())),
        },
        other => {
            return Err(malformed(format!(
                "expected an object or array (got {})",
                json_kind(&other)
            )));
        }
    };
    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| match value {
            Value::String(text) => Ok(text),
            other => Err(malformed(format!(
                "translation {} is {} instead of a string",
                idx,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderFuture, ProviderResponse};

    #[derive(Clone)]
    struct TestProvider {
        system: Option<String>,
        user: Option<String>,
        tools: Vec<String>,
        prefix: &'static str,
    }

    impl TestProvider {
        fn new(prefix: &'static str) -> Self {
            Self {
                system: None,
                user: None,
                tools: Vec::new(),
                prefix,
            }
        }
    }

    impl Provider for TestProvider {
        fn append_system_input(mut self, input: String) -> Self {
            self.system = Some(input);
            self
        }

        fn append_user_input(mut self, input: String) -> Self {
            self.user = Some(input);
            self
        }

        fn register_tool(mut self, tool: ToolSpec) -> Self {
            self.tools.push(tool.name);
            self
        }

        fn call_tool(self, tool_name: &str) -> ProviderFuture {
            let registered = self.tools.iter().any(|tool| tool == tool_name);
            let payload: Value =
                serde_json::from_str(self.user.as_deref().unwrap_or("{}")).unwrap_or_default();
            let translations = payload["items"]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|item| format!("{}{}", self.prefix, item.as_str().unwrap_or_default()))
                .collect::<Vec<_>>();
            let system_seen = self.system.is_some();
            Box::pin(async move {
                anyhow::ensure!(registered, "tool not registered");
                anyhow::ensure!(system_seen, "system prompt missing");
                Ok(ProviderResponse {
                    args: json!({ "translations": translations }),
                    model: Some("test".to_string()),
                    usage: None,
                })
            })
        }
    }

    fn request(items: &[&str], source_lang: Option<&str>) -> BatchRequest {
        BatchRequest {
            items: items.iter().map(|item| item.to_string()).collect(),
            target_lang: "German".to_string(),
            source_lang: source_lang.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn translates_through_tool_call() {
        let gateway = LlmGateway::new("test:model", TestProvider::new("DE:"));
        let out = gateway
            .translate(&request(&["Hello", "World"], Some("en")))
            .await
            .unwrap();
        assert_eq!(out, vec!["DE:Hello", "DE:World"]);
    }

    #[test]
    fn prompt_mentions_languages_count_and_tool() {
        let prompt = render_system_prompt(&request(&["a", "b"], Some("English")), TOOL_NAME)
            .unwrap();
        assert!(prompt.contains("from English to German."));
        assert!(prompt.contains("Return exactly 2 translations"));
        assert!(prompt.contains("`deliver_translations`"));

        let auto = render_system_prompt(&request(&["a"], None), TOOL_NAME).unwrap();
        assert!(auto.contains("in \"items\" to German."));
    }

    #[test]
    fn parses_object_and_bare_array() {
        assert_eq!(
            parse_translations("g", json!({"translations": ["a", "b"]})).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(parse_translations("g", json!(["x"])).unwrap(), vec!["x"]);
    }

    #[test]
    fn rejects_non_string_entries_and_missing_field() {
        let err = parse_translations("g", json!({"translations": ["a", 3]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "g returned a malformed response: translation 1 is a number instead of a string"
        );
        assert!(matches!(
            parse_translations("g", json!({"items": []})),
            Err(GatewayError::Malformed { .. })
        ));
        assert!(matches!(
            parse_translations("g", json!("text")),
            Err(GatewayError::Malformed { .. })
        ));
    }
}
