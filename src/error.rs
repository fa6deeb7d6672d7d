use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by [`crate::HtmlTranslator::translate`].
///
/// Gateway failures are not in here: the pipeline recovers from them by
/// falling back to the untranslated document and reports that through the
/// outcome status instead.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("failed to extract translatable content: {0}")]
    Extraction(String),

    #[error("reassembly invariant violated: {0}")]
    Reassembly(#[from] ReassemblyError),
}

impl TranslateError {
    pub fn input(message: impl Into<String>) -> Self {
        TranslateError::Input(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, TranslateError::Input(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{gateway} timed out after {:.1}s", .after.as_secs_f32())]
    Timeout { gateway: String, after: Duration },

    #[error("{gateway} request failed: {message}")]
    Transport { gateway: String, message: String },

    #[error("{gateway} returned a malformed response: {message}")]
    Malformed { gateway: String, message: String },

    #[error("{gateway} returned {actual} translations for {expected} items")]
    CountMismatch {
        gateway: String,
        expected: usize,
        actual: usize,
    },

    #[error("all gateways failed: {}", join_attempts(.0))]
    Exhausted(Vec<GatewayError>),

    #[error("no gateway configured")]
    NoGateways,

    #[error("document translation timed out after {:.1}s", .0.as_secs_f32())]
    DocumentTimeout(Duration),
}

fn join_attempts(attempts: &[GatewayError]) -> String {
    attempts
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The skeleton and the unit list drifted apart. Always a pipeline bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    #[error("placeholder {token} has no translated value")]
    Unresolved { token: String },

    #[error("placeholder {token} occurs {occurrences} times in the skeleton")]
    Occurrences { token: String, occurrences: usize },

    #[error("expected {expected} translations, got {actual}")]
    Cardinality { expected: usize, actual: usize },
}
