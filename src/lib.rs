use anyhow::{Context, Result, anyhow};
use std::sync::Arc;

pub mod batch;
pub mod error;
pub mod gateway;
pub mod html;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod settings;

pub use batch::{Batch, BatchLimits, plan_batches};
pub use error::{GatewayError, ReassemblyError, TranslateError};
pub use gateway::{BatchRequest, Gateway, GatewayChain, GatewayFuture, LlmGateway};
pub use html::{Skeleton, TranslatableUnit, UnitKind, reassemble, skeletonize};
pub use pipeline::{
    FallbackPolicy, HtmlTranslator, OutcomeStatus, PipelineOptions, TranslateRequest,
    TranslationOutcome, translate_html,
};
pub use settings::Settings;

/// Builds the ordered gateway chain. `models` replaces the configured list
/// when non-empty; `key` overrides the environment for every entry.
///
/// Entries whose provider has no key are skipped with a warning so a partly
/// configured chain still works. An entirely unusable list is an error.
pub fn build_gateway_chain(
    settings: &Settings,
    client: &reqwest::Client,
    models: &[String],
    key: Option<&str>,
) -> Result<GatewayChain> {
    let selected = if models.is_empty() {
        settings.models.as_slice()
    } else {
        models
    };

    let mut chain = GatewayChain::new(settings.batch_timeout);
    let mut skipped = Vec::new();
    for raw in selected {
        let spec = providers::parse_model_spec(raw)
            .with_context(|| format!("invalid model selector '{}'", raw))?;
        let key = match providers::resolve_key(spec.provider, key) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!("skipping {}: {}", spec.label(), err);
                skipped.push(spec.label());
                continue;
            }
        };
        let provider = providers::build_provider(client.clone(), &spec, key, settings.temperature);
        chain = chain.with_gateway(Arc::new(LlmGateway::new(spec.label(), provider)));
    }

    if chain.is_empty() {
        return Err(anyhow!(
            "no usable gateway (checked {}; set OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass --key)",
            skipped.join(", ")
        ));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_builds_every_entry_in_order() {
        let settings = Settings::default();
        let chain = build_gateway_chain(
            &settings,
            &reqwest::Client::new(),
            &["claude:claude-3-5-haiku-latest".to_string(), "openai".to_string()],
            Some("test-key"),
        )
        .unwrap();
        assert_eq!(
            chain.gateway_names(),
            vec!["claude:claude-3-5-haiku-latest", "openai:gpt-4o-mini"]
        );
        assert_eq!(
            chain.name(),
            "claude:claude-3-5-haiku-latest -> openai:gpt-4o-mini"
        );
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = build_gateway_chain(
            &Settings::default(),
            &reqwest::Client::new(),
            &["bogus:model".to_string()],
            Some("k"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid model selector 'bogus:model'"));
    }
}
