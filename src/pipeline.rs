use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchLimits, plan_batches};
use crate::error::{GatewayError, ReassemblyError, TranslateError};
use crate::gateway::{BatchRequest, Gateway, validate_translations};
use crate::html::{Skeleton, TokenScheme, reassemble, skeletonize};

/// What to do when a batch cannot be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Return the original document untouched.
    Document,
    /// Keep the failed batches' original text and flag the result as partial.
    Batch,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub limits: BatchLimits,
    pub max_concurrent_batches: usize,
    pub document_timeout: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limits: BatchLimits::default(),
            max_concurrent_batches: 4,
            document_timeout: Duration::from_secs(600),
            fallback: FallbackPolicy::Document,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub html: String,
    pub target_lang: String,
    pub source_lang: Option<String>,
}

impl TranslateRequest {
    pub fn new(html: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            target_lang: target_lang.into(),
            source_lang: None,
        }
    }

    pub fn with_source_lang(mut self, source_lang: Option<String>) -> Self {
        self.source_lang = source_lang
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty() && !lang.eq_ignore_ascii_case("auto"));
        self
    }

    fn validate(&self) -> Result<(), TranslateError> {
        if self.html.trim().is_empty() {
            return Err(TranslateError::input("html is required"));
        }
        if self.target_lang.trim().is_empty() {
            return Err(TranslateError::input("target_lang is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum OutcomeStatus {
    /// Every unit was translated.
    Translated,
    /// Nothing translatable; the input is returned as is.
    Unchanged,
    /// Only with [`FallbackPolicy::Batch`]: the listed batches kept their
    /// original text.
    Partial {
        failed_batches: Vec<usize>,
        errors: Vec<GatewayError>,
    },
    /// The gateway failed and the original document is returned.
    FellBack(GatewayError),
}

#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub html: String,
    pub status: OutcomeStatus,
    pub units: usize,
    pub batches: usize,
}

impl TranslationOutcome {
    pub fn is_translated(&self) -> bool {
        matches!(
            self.status,
            OutcomeStatus::Translated | OutcomeStatus::Partial { .. }
        )
    }

    pub fn fallback_reason(&self) -> Option<String> {
        match &self.status {
            OutcomeStatus::FellBack(err) => Some(err.to_string()),
            OutcomeStatus::Partial { errors, .. } => Some(
                errors
                    .iter()
                    .map(|err| err.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            OutcomeStatus::Translated | OutcomeStatus::Unchanged => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Translated => "translated",
            OutcomeStatus::Unchanged => "unchanged",
            OutcomeStatus::Partial { .. } => "partial",
            OutcomeStatus::FellBack(_) => "fallback",
        }
    }
}

struct BatchOutcome {
    batch: Batch,
    result: Result<Vec<String>, GatewayError>,
}

/// Structure-preserving HTML translation over an injected gateway.
///
/// Holds no per-document state; one instance serves concurrent calls.
#[derive(Debug, Clone)]
pub struct HtmlTranslator<G: Gateway> {
    gateway: G,
    options: PipelineOptions,
}

impl<G: Gateway> HtmlTranslator<G> {
    pub fn new(gateway: G, options: PipelineOptions) -> Self {
        Self { gateway, options }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn translate(
        &self,
        request: &TranslateRequest,
    ) -> Result<TranslationOutcome, TranslateError> {
        request.validate()?;
        let mut skeleton = skeletonize(&request.html)?;
        if skeleton.units.is_empty() {
            info!("no translatable content; returning document unchanged");
            return Ok(TranslationOutcome {
                html: request.html.clone(),
                status: OutcomeStatus::Unchanged,
                units: 0,
                batches: 0,
            });
        }

        let batches = plan_batches(&skeleton.source_texts(), self.options.limits);
        let unit_count = skeleton.units.len();
        let batch_count = batches.len();
        info!(
            "translating {} units in {} batches to {} via {}",
            unit_count,
            batch_count,
            request.target_lang.trim(),
            self.gateway.name()
        );

        let dispatched = timeout(
            self.options.document_timeout,
            self.dispatch(batches, request, &skeleton.scheme),
        )
        .await;
        let outcomes = match dispatched {
            Ok(outcomes) => outcomes,
            Err(_) => {
                let err = GatewayError::DocumentTimeout(self.options.document_timeout);
                return Ok(self.fall_back(request, err, unit_count, batch_count));
            }
        };

        let mut failed_batches = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            let range = outcome.batch.range.clone();
            match outcome.result {
                Ok(translations) => {
                    for (unit, translated) in skeleton.units[range].iter_mut().zip(translations) {
                        unit.translated = Some(translated);
                    }
                }
                Err(err) => match self.options.fallback {
                    FallbackPolicy::Document => {
                        return Ok(self.fall_back(request, err, unit_count, batch_count));
                    }
                    FallbackPolicy::Batch => {
                        warn!("batch {} kept its original text: {}", outcome.batch.index, err);
                        for unit in &mut skeleton.units[range] {
                            unit.translated = Some(unit.source_text().to_string());
                        }
                        failed_batches.push(outcome.batch.index);
                        errors.push(err);
                    }
                },
            }
        }

        if failed_batches.len() == batch_count && !errors.is_empty() {
            let err = if errors.len() == 1 {
                errors.remove(0)
            } else {
                GatewayError::Exhausted(errors)
            };
            return Ok(self.fall_back(request, err, unit_count, batch_count));
        }

        let html = reassemble_checked(&skeleton).inspect_err(|err| {
            error!("reassembly failed, pipeline invariant broken: {}", err);
        })?;
        let status = if failed_batches.is_empty() {
            OutcomeStatus::Translated
        } else {
            OutcomeStatus::Partial {
                failed_batches,
                errors,
            }
        };
        Ok(TranslationOutcome {
            html,
            status,
            units: unit_count,
            batches: batch_count,
        })
    }

    /// Runs batches with bounded concurrency. Results come back in batch
    /// order. Under the document policy the first failure stops dispatch and
    /// drops whatever is still in flight.
    async fn dispatch(
        &self,
        batches: Vec<Batch>,
        request: &TranslateRequest,
        scheme: &TokenScheme,
    ) -> Vec<BatchOutcome> {
        let target_lang = request.target_lang.trim();
        let source_lang = request.source_lang.as_deref();
        let pending = batches
            .into_iter()
            .map(|batch| self.translate_batch(batch, target_lang, source_lang, scheme))
            .collect::<Vec<_>>();
        let mut stream = stream::iter(pending).buffered(self.options.max_concurrent_batches.max(1));

        let mut outcomes = Vec::new();
        while let Some(outcome) = stream.next().await {
            let failed = outcome.result.is_err();
            outcomes.push(outcome);
            if failed && self.options.fallback == FallbackPolicy::Document {
                break;
            }
        }
        outcomes
    }

    async fn translate_batch(
        &self,
        batch: Batch,
        target_lang: &str,
        source_lang: Option<&str>,
        scheme: &TokenScheme,
    ) -> BatchOutcome {
        let request = BatchRequest {
            items: batch.items.clone(),
            target_lang: target_lang.to_string(),
            source_lang: source_lang.map(str::to_string),
        };
        debug!(
            "dispatching batch {} ({} items)",
            batch.index,
            request.items.len()
        );
        let result = match self.gateway.translate(&request).await {
            Ok(translations) => {
                check_translations(self.gateway.name(), &request, translations, scheme)
            }
            Err(err) => Err(err),
        };
        BatchOutcome { batch, result }
    }

    fn fall_back(
        &self,
        request: &TranslateRequest,
        err: GatewayError,
        units: usize,
        batches: usize,
    ) -> TranslationOutcome {
        warn!("returning untranslated document: {}", err);
        TranslationOutcome {
            html: request.html.clone(),
            status: OutcomeStatus::FellBack(err),
            units,
            batches,
        }
    }
}

/// Count check plus a guard against answers that echo placeholder tokens.
fn check_translations(
    gateway: &str,
    request: &BatchRequest,
    translations: Vec<String>,
    scheme: &TokenScheme,
) -> Result<Vec<String>, GatewayError> {
    validate_translations(gateway, request, &translations)?;
    if let Some(idx) = translations
        .iter()
        .position(|translated| scheme.leaks_into(translated))
    {
        return Err(GatewayError::Malformed {
            gateway: gateway.to_string(),
            message: format!("translation {} contains a placeholder token", idx),
        });
    }
    Ok(translations)
}

fn reassemble_checked(skeleton: &Skeleton) -> Result<String, ReassemblyError> {
    let translated = skeleton
        .units
        .iter()
        .filter(|unit| unit.translated.is_some())
        .count();
    if translated != skeleton.units.len() {
        return Err(ReassemblyError::Cardinality {
            expected: skeleton.units.len(),
            actual: translated,
        });
    }
    reassemble(skeleton)
}

/// `(html, target_lang, source_lang?) -> html` with default options.
/// Gateway failures yield the input unchanged.
pub async fn translate_html<G: Gateway>(
    gateway: G,
    html: &str,
    target_lang: &str,
    source_lang: Option<&str>,
) -> Result<String, TranslateError> {
    let translator = HtmlTranslator::new(gateway, PipelineOptions::default());
    let request =
        TranslateRequest::new(html, target_lang).with_source_lang(source_lang.map(str::to_string));
    Ok(translator.translate(&request).await?.html)
}
