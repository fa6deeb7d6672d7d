use axum::http::StatusCode;
use tracing::info;

use crate::build_gateway_chain;
use crate::error::TranslateError;
use crate::pipeline::{HtmlTranslator, OutcomeStatus, TranslateRequest, TranslationOutcome};

use super::models::{TranslateHtmlRequest, TranslateHtmlResponse};
use super::state::ServerState;

const DEFAULT_TARGET_LANG: &str = "German";

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<TranslateError> for ServerError {
    fn from(err: TranslateError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ServerError::new(status, err.to_string())
    }
}

pub(crate) async fn translate_request(
    state: &ServerState,
    request: TranslateHtmlRequest,
) -> Result<TranslateHtmlResponse, ServerError> {
    let html = request
        .html
        .ok_or_else(|| ServerError::bad_request("HTML content is required in request body"))?;
    let target_lang = request
        .target_lang
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| DEFAULT_TARGET_LANG.to_string());
    let strict = request.strict.unwrap_or(false);
    info!(
        "translate-html request: {} chars to {}",
        html.len(),
        target_lang
    );

    let translate = TranslateRequest::new(html, target_lang.clone())
        .with_source_lang(request.source_lang);
    let model = request
        .model
        .as_deref()
        .map(str::trim)
        .filter(|model| !model.is_empty());
    let outcome = match model {
        Some(model) => {
            let chain = build_gateway_chain(
                &state.settings,
                &state.client,
                &[model.to_string()],
                state.key.as_deref(),
            )
            .map_err(|err| ServerError::bad_request(format!("{:#}", err)))?;
            HtmlTranslator::new(chain, state.settings.pipeline_options())
                .translate(&translate)
                .await?
        }
        None => {
            let translator = state.translator.as_ref().ok_or_else(|| {
                ServerError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "no translation gateway configured",
                )
            })?;
            translator.translate(&translate).await?
        }
    };

    if strict && !matches!(outcome.status, OutcomeStatus::Translated | OutcomeStatus::Unchanged) {
        return Err(ServerError::new(
            StatusCode::BAD_GATEWAY,
            outcome
                .fallback_reason()
                .unwrap_or_else(|| "translation gateway failed".to_string()),
        ));
    }
    Ok(response_from_outcome(outcome, target_lang))
}

fn response_from_outcome(outcome: TranslationOutcome, target_lang: String) -> TranslateHtmlResponse {
    let failed_batches = match &outcome.status {
        OutcomeStatus::Partial { failed_batches, .. } => Some(failed_batches.clone()),
        _ => None,
    };
    TranslateHtmlResponse {
        success: true,
        translated: outcome.is_translated(),
        status: outcome.status_label(),
        units: outcome.units,
        batches_processed: outcome.batches,
        target_language: target_lang,
        fallback_reason: outcome.fallback_reason(),
        failed_batches,
        translated_html: outcome.html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::GatewayChain;
    use crate::gateway::testing::StubGateway;
    use crate::settings::Settings;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn state_with(stub: StubGateway) -> ServerState {
        let settings = Settings::default();
        let chain = GatewayChain::new(Duration::from_secs(5)).with_gateway(Arc::new(stub));
        ServerState {
            translator: Some(HtmlTranslator::new(chain, settings.pipeline_options())),
            settings,
            client: reqwest::Client::new(),
            key: None,
        }
    }

    fn request(value: serde_json::Value) -> TranslateHtmlRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn translates_and_reports_counts() {
        let state = state_with(StubGateway::mapping("stub", |item| match item {
            "Hello world" => "Bonjour le monde".to_string(),
            other => other.to_uppercase(),
        }));
        let response = translate_request(
            &state,
            request(json!({
                "html": "<p>Hi</p><img alt=\"Hello world\">",
                "target_lang": "fr"
            })),
        )
        .await
        .unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "translated_html": "<p>HI</p><img alt=\"Bonjour le monde\">",
                "translated": true,
                "status": "translated",
                "units": 2,
                "batches_processed": 1,
                "target_language": "fr"
            })
        );
    }

    #[tokio::test]
    async fn missing_html_is_bad_request() {
        let state = state_with(StubGateway::mapping("stub", str::to_string));
        let err = translate_request(&state, request(json!({"target_lang": "fr"})))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = translate_request(&state, request(json!({"html": "   "})))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn target_language_defaults_to_german() {
        let state = state_with(StubGateway::mapping("stub", str::to_string));
        let response = translate_request(&state, request(json!({"html": "<p>x</p>"})))
            .await
            .unwrap();
        assert_eq!(response.target_language, "German");
    }

    #[tokio::test]
    async fn fallback_is_200_unless_strict() {
        let failing = || {
            StubGateway::new("down", |_| {
                Err(GatewayError::Transport {
                    gateway: "down".to_string(),
                    message: "connection refused".to_string(),
                })
            })
        };
        let html = "<p>Keep me</p>";

        let state = state_with(failing());
        let response = translate_request(&state, request(json!({"html": html, "target_lang": "de"})))
            .await
            .unwrap();
        assert!(!response.translated);
        assert_eq!(response.status, "fallback");
        assert_eq!(response.translated_html, html);
        assert!(
            response
                .fallback_reason
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );

        let state = state_with(failing());
        let err = translate_request(
            &state,
            request(json!({"html": html, "target_lang": "de", "strict": true})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unusable_model_override_is_bad_request() {
        let state = state_with(StubGateway::mapping("stub", str::to_string));
        let err = translate_request(
            &state,
            request(json!({"html": "<p>x</p>", "target_lang": "fr", "model": "nope:thing"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unconfigured_gateway_is_unavailable() {
        let mut state = state_with(StubGateway::mapping("stub", str::to_string));
        state.translator = None;
        let err = translate_request(&state, request(json!({"html": "<p>x</p>"})))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
