use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::cancel::CancellationToken;
use super::retry::{Delay, RetryPolicy, TokioDelay, with_retry};
use super::stream::consume;
use crate::error::{AppError, Result, log_error};
use crate::init::Config;
use crate::models::{ActionRequest, CompletionCheckRequest, CoordinateRequest, HelpRequest};

// ============================================================================
// Capabilities & outcomes
// ============================================================================

/// Backend generation endpoints; `Display` yields the endpoint path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr, strum_macros::EnumIter,
)]
pub enum Capability {
    #[strum(serialize = "step")]
    NextAction,
    #[strum(serialize = "help")]
    Help,
    #[strum(serialize = "check")]
    CompletionCheck,
    #[strum(serialize = "coordinates")]
    Coordinates,
}

/// Result of a generation call.
///
/// `Ready` carries whatever the model produced, which may be empty.
/// `Unavailable` means the call itself failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation<T> {
    Ready(T),
    Unavailable { reason: String },
    Cancelled,
}

impl<T> Generation<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(e) => Self::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.ready().unwrap_or(default)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generation<U> {
        match self {
            Self::Ready(value) => Generation::Ready(f(value)),
            Self::Unavailable { reason } => Generation::Unavailable { reason },
            Self::Cancelled => Generation::Cancelled,
        }
    }
}

impl<T: Default> Generation<T> {
    /// Collapse failures into the empty default (`""`, `false`).
    pub fn unwrap_or_default(self) -> T {
        self.ready().unwrap_or_default()
    }
}

// ============================================================================
// Completion verdict
// ============================================================================

const COMPLETE_MARKER: &str = "\"status\": \"Yes\"";

/// Interpret the completion-check text: `{"status": "Yes"}`, possibly fenced.
pub fn is_step_complete(text: &str) -> bool {
    let clean = text.replace("```json\n", "").replace("\n```", "");

    match serde_json::from_str::<serde_json::Value>(clean.trim()) {
        Ok(verdict) => verdict.get("status").and_then(|s| s.as_str()) == Some("Yes"),
        Err(e) => {
            log::warn!("Failed to parse completion verdict ({}): {}", e, text);
            text.contains(COMPLETE_MARKER)
        }
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    config: Config,
    delay: Arc<dyn Delay>,
}

impl GenerationClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            config: config.clone(),
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry
    }

    async fn stream_text<P: Serialize + ?Sized>(
        &self,
        capability: Capability,
        payload: &P,
        progress: Option<&mpsc::UnboundedSender<String>>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = self.config.endpoint(capability.as_ref());
        log::debug!("POST {}", url);

        let request = self.http.post(&url).json(payload).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::cancelled()),
            response = request => response?,
        };
        let response = response.error_for_status()?;

        consume(response.bytes_stream(), progress, cancel).await
    }

    async fn single_attempt<P: Serialize + ?Sized>(
        &self,
        capability: Capability,
        payload: &P,
        progress: Option<&mpsc::UnboundedSender<String>>,
        cancel: &CancellationToken,
    ) -> Generation<String> {
        let result = self.stream_text(capability, payload, progress, cancel).await;
        if let Err(e) = &result {
            log_error(e);
        }
        Generation::from_result(result)
    }

    /// Next instruction toward the goal. Retried with linear backoff.
    pub async fn generate_action(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> Generation<String> {
        let capability = Capability::NextAction;
        let result = with_retry(
            capability.as_ref(),
            self.config.retry,
            self.delay.as_ref(),
            cancel,
            move |_| self.stream_text(capability, request, None, cancel),
        )
        .await;

        if let Err(e) = &result {
            if !e.is_cancelled() {
                log::error!("All retry attempts failed for {}: {}", capability, e);
            }
        }
        Generation::from_result(result)
    }

    /// Answer a user question about the current screen, streaming progress.
    pub async fn generate_help(
        &self,
        request: &HelpRequest,
        progress: Option<&mpsc::UnboundedSender<String>>,
        cancel: &CancellationToken,
    ) -> Generation<String> {
        self.single_attempt(Capability::Help, request, progress, cancel)
            .await
    }

    /// Whether the instruction was carried out between the two screenshots.
    pub async fn check_step_completion(
        &self,
        request: &CompletionCheckRequest,
        cancel: &CancellationToken,
    ) -> Generation<bool> {
        self.single_attempt(Capability::CompletionCheck, request, None, cancel)
            .await
            .map(|text| is_step_complete(&text))
    }

    /// Raw `"x,y"` text on the 0..=999 grid.
    pub async fn generate_coordinate(
        &self,
        request: &CoordinateRequest,
        cancel: &CancellationToken,
    ) -> Generation<String> {
        self.single_attempt(Capability::Coordinates, request, None, cancel)
            .await
            .map(|text| text.trim().to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
