//! Remote move validation.
//!
//! The [`Validator`] trait is the seam to the remote legality checker;
//! hosts implement it over whatever request/response transport their
//! authority exposes. [`RemoteValidationClient`] wraps a validator with
//! a deadline and sorts every result into one of three outcomes.

use std::future::Future;
use std::time::Duration;

use arcsync_protocol::{Action, ActorId, SessionSnapshot};
use serde::{Deserialize, Serialize};

/// What the validator is asked: is `action` by `actor_id` legal in
/// `session_state`?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub session_state: SessionSnapshot,
    pub action: Action,
    pub actor_id: ActorId,
}

/// The authority's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn accept() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Reads a verdict out of a raw response from the validation
    /// endpoint: a status code and a JSON `{ "valid", "reason"? }` body.
    ///
    /// # Errors
    /// - [`ValidationError::Status`] for any status outside 2xx.
    /// - [`ValidationError::Malformed`] if the body is not a verdict.
    pub fn from_response(status: u16, body: &[u8]) -> Result<Self, ValidationError> {
        if !(200..300).contains(&status) {
            return Err(ValidationError::Status(status));
        }
        serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))
    }
}

/// The validation request failed before an answer came back.
///
/// Never the same as `valid: false`.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The request could not be delivered.
    #[error("validation request failed: {0}")]
    Transport(String),

    /// The authority answered with a non-success status.
    #[error("validation service returned status {0}")]
    Status(u16),

    /// No answer within the deadline.
    #[error("validation timed out after {0:?}")]
    Timeout(Duration),

    /// The answer could not be parsed.
    #[error("malformed validation response: {0}")]
    Malformed(String),
}

/// Asks the authority whether an action is legal.
///
/// Return `Ok` with the verdict for any answer the authority actually
/// gave, including rejections, and `Err` for everything else:
/// [`ValidationError::Transport`] when the request never got an answer,
/// [`ValidationError::Status`] for a non-2xx response and
/// [`ValidationError::Malformed`] for a body that is not a verdict.
/// HTTP-style implementations can hand the raw response to
/// [`ValidationVerdict::from_response`], which sorts it that way.
/// Deadlines are enforced by [`RemoteValidationClient`].
///
/// # Example
///
/// ```rust
/// use arcsync::{ValidationError, ValidationRequest, ValidationVerdict, Validator};
///
/// struct NoPassing;
///
/// impl Validator for NoPassing {
///     async fn validate(
///         &self,
///         request: &ValidationRequest,
///     ) -> Result<ValidationVerdict, ValidationError> {
///         if request.action.kind == "pass" {
///             Ok(ValidationVerdict::reject("passing is not allowed"))
///         } else {
///             Ok(ValidationVerdict::accept())
///         }
///     }
/// }
/// ```
pub trait Validator: Send + Sync + 'static {
    fn validate(
        &self,
        request: &ValidationRequest,
    ) -> impl Future<Output = Result<ValidationVerdict, ValidationError>> + Send;
}

/// A validator that accepts everything. Useful when the authority only
/// validates on arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    async fn validate(
        &self,
        _request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError> {
        Ok(ValidationVerdict::accept())
    }
}

/// How a validation attempt ended.
#[derive(Debug)]
pub enum ValidationOutcome {
    /// `valid: true`.
    Accepted,
    /// `valid: false`. Never retried.
    Rejected(String),
    /// The request failed or timed out. Treated as neither accept nor
    /// reject: the caller queues the action and lets the authority
    /// re-validate on replay.
    Unknown(ValidationError),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A [`Validator`] with a deadline.
pub struct RemoteValidationClient<V: Validator> {
    validator: V,
    timeout: Duration,
}

impl<V: Validator> RemoteValidationClient<V> {
    pub fn new(validator: V, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// Sends `request` and classifies the result.
    pub async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        let action_id = &request.action.id;
        match tokio::time::timeout(self.timeout, self.validator.validate(request)).await {
            Ok(Ok(verdict)) if verdict.valid => {
                tracing::debug!(%action_id, "action accepted");
                ValidationOutcome::Accepted
            }
            Ok(Ok(verdict)) => {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| "rejected by authority".to_string());
                tracing::warn!(%action_id, %reason, "action rejected");
                ValidationOutcome::Rejected(reason)
            }
            Ok(Err(e)) => {
                tracing::warn!(%action_id, error = %e, "validation unavailable");
                ValidationOutcome::Unknown(e)
            }
            Err(_) => {
                tracing::warn!(
                    %action_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "validation timed out"
                );
                ValidationOutcome::Unknown(ValidationError::Timeout(self.timeout))
            }
        }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
