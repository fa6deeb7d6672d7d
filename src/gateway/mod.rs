use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::GatewayError;

mod llm;

pub use llm::{LlmGateway, TOOL_NAME, parse_translations, render_system_prompt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub items: Vec<String>,
    pub target_lang: String,
    pub source_lang: Option<String>,
}

pub type GatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<String>, GatewayError>> + Send + 'a>>;

/// Ordered strings in, same number of ordered strings out.
///
/// Implementations hold no per-call state, so one instance is shared by every
/// concurrent document.
pub trait Gateway: Send + Sync {
    fn name(&self) -> &str;
    fn translate<'a>(&'a self, request: &'a BatchRequest) -> GatewayFuture<'a>;
}

impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn translate<'a>(&'a self, request: &'a BatchRequest) -> GatewayFuture<'a> {
        (**self).translate(request)
    }
}

/// Checks the positional contract. An empty answer to a non-empty request is
/// a count mismatch like any other.
pub fn validate_translations(
    gateway: &str,
    request: &BatchRequest,
    translations: &[String],
) -> Result<(), GatewayError> {
    if translations.len() != request.items.len() {
        return Err(GatewayError::CountMismatch {
            gateway: gateway.to_string(),
            expected: request.items.len(),
            actual: translations.len(),
        });
    }
    Ok(())
}

/// Gateways tried in order until one returns a well-formed answer in time.
#[derive(Clone)]
pub struct GatewayChain {
    name: String,
    strategies: Vec<Arc<dyn Gateway>>,
    attempt_timeout: Duration,
}

impl GatewayChain {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            name: "chain".to_string(),
            strategies: Vec::new(),
            attempt_timeout,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.strategies.push(gateway);
        self.name = self
            .strategies
            .iter()
            .map(|gateway| gateway.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn gateway_names(&self) -> Vec<String> {
        self.strategies
            .iter()
            .map(|gateway| gateway.name().to_string())
            .collect()
    }

    async fn attempt(
        &self,
        gateway: &dyn Gateway,
        request: &BatchRequest,
    ) -> Result<Vec<String>, GatewayError> {
        let translations = timeout(self.attempt_timeout, gateway.translate(request))
            .await
            .map_err(|_| GatewayError::Timeout {
                gateway: gateway.name().to_string(),
                after: self.attempt_timeout,
            })??;
        validate_translations(gateway.name(), request, &translations)?;
        Ok(translations)
    }
}

impl fmt::Debug for GatewayChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayChain")
            .field("name", &self.name)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl Gateway for GatewayChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate<'a>(&'a self, request: &'a BatchRequest) -> GatewayFuture<'a> {
        Box::pin(async move {
            if self.strategies.is_empty() {
                return Err(GatewayError::NoGateways);
            }
            let mut failures = Vec::new();
            for gateway in &self.strategies {
                match self.attempt(gateway.as_ref(), request).await {
                    Ok(translations) => {
                        debug!(
                            "{} translated {} items",
                            gateway.name(),
                            translations.len()
                        );
                        return Ok(translations);
                    }
                    Err(err) => {
                        warn!("{}; trying next gateway", err);
                        failures.push(err);
                    }
                }
            }
            Err(GatewayError::Exhausted(failures))
        })
    }
}
