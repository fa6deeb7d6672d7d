use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateHtmlRequest {
    pub(crate) html: Option<String>,
    pub(crate) target_lang: Option<String>,
    pub(crate) source_lang: Option<String>,
    /// One `provider:model` selector replacing the configured chain.
    pub(crate) model: Option<String>,
    /// Turn gateway fallbacks into a 502 instead of a 200 with the original.
    pub(crate) strict: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateHtmlResponse {
    pub(crate) success: bool,
    pub(crate) translated_html: String,
    pub(crate) translated: bool,
    pub(crate) status: &'static str,
    pub(crate) units: usize,
    pub(crate) batches_processed: usize,
    pub(crate) target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) failed_batches: Option<Vec<usize>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) service: &'static str,
    pub(crate) gateways: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TestResponse {
    pub(crate) message: &'static str,
    pub(crate) gateway_configured: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) success: bool,
    pub(crate) error: String,
}
