//! Pipeline error taxonomy.
//!
//! Per-element and per-record errors are contained to their loop iteration;
//! run-level errors propagate to the stage caller with both stores left in
//! their last fully-written state.

/// Errors raised by the acquisition pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Login did not redirect to the listing within the wait window.
    /// Fatal to a collector run; the browser session is still released.
    #[error("login did not complete within {0}ms")]
    AuthTimeout(u64),

    /// A single listing element could not be read. Recovered locally —
    /// the element is skipped and the batch continues.
    #[error("listing element could not be read: {0}")]
    ElementExtraction(String),

    /// A facet block could not be opened or matched. Recovered per
    /// category; the run continues with the remaining categories.
    #[error("facet block '{0}' failed: {1}")]
    FacetInteraction(String, String),

    /// Rate-limit-shaped inference failure. Retried with backoff; on
    /// exhaustion the record is deferred (left pending).
    #[error("transient inference failure: {0}")]
    InferenceTransient(String),

    /// Non-transient inference failure. The record is marked `error`
    /// without retry.
    #[error("inference call failed: {0}")]
    InferenceFatal(String),

    /// The enrichment response did not decode into the expected schema.
    /// The record is marked `error`.
    #[error("enrichment response did not decode: {0}")]
    SchemaParse(String),

    /// Store file I/O failure. Run-level; propagates to the stage caller.
    #[error("store I/O error: {0}")]
    Store(#[from] std::io::Error),
}

/// Convenience result type.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Whether this error should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::InferenceTransient(_))
    }
}

/// Classify an inference-call failure message as transient or fatal.
///
/// Rate-limit-shaped signatures come back as either an HTTP 429, the
/// literal "rate limit" wording, or Google's RESOURCE_EXHAUSTED status.
pub fn classify_inference_error(message: &str) -> PipelineError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("resource_exhausted")
        || lower.contains("too many requests")
    {
        PipelineError::InferenceTransient(message.to_string())
    } else {
        PipelineError::InferenceFatal(message.to_string())
    }
}
