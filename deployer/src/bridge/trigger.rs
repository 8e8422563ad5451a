//! Firing the extraction program over HTTP and judging its answer.

use super::directive::{ERROR_PREFIX, SUCCESS_MARKER};
use std::time::Duration;

/// Issues the unauthenticated GET that runs the uploaded program.
///
/// Abstractions allow tests to simulate the remote web server without
/// network access.
#[cfg_attr(test, mockall::automock)]
pub trait ExtractionTrigger {
    /// Fetch `url` and return the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError`] for connection failures, non-success status
    /// codes, and timeouts.
    fn fire(&self, url: &str, timeout: Duration) -> Result<String, TriggerError>;
}

/// Errors arising from the extraction trigger.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    /// The program could not be rendered to local disk.
    #[error("cannot write extraction program locally: {0}")]
    Render(#[source] std::io::Error),

    /// The request failed before a response arrived.
    #[error("request to {url} failed: {reason}")]
    Http {
        /// Trigger URL.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} answered HTTP {status}")]
    Status {
        /// Trigger URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// No response within the trigger timeout.
    #[error(
        "no response from {url} within {seconds}s; the remote directory may still hold the \
         archive and the extraction program, run `sitedrop reset` before retrying"
    )]
    Timeout {
        /// Trigger URL.
        url: String,
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// The program reported a failure.
    #[error("extraction program at {url} reported: {message}")]
    Remote {
        /// Trigger URL.
        url: String,
        /// Body beginning with `Error:`.
        message: String,
    },

    /// The body carried neither the success marker nor an error message.
    #[error("unexpected response from {url}: {body:?}")]
    UnexpectedBody {
        /// Trigger URL.
        url: String,
        /// Full response body.
        body: String,
    },
}

impl TriggerError {
    /// The response body, for variants that received one.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => Some(message),
            Self::UnexpectedBody { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Decide whether `body` reports a successful extraction.
///
/// # Errors
///
/// Returns [`TriggerError::Remote`] for an `Error:` message and
/// [`TriggerError::UnexpectedBody`] for anything else lacking the marker.
pub fn interpret(url: &str, body: &str) -> Result<(), TriggerError> {
    if body.contains(SUCCESS_MARKER) {
        return Ok(());
    }
    let trimmed = body.trim();
    if trimmed.starts_with(ERROR_PREFIX) {
        return Err(TriggerError::Remote {
            url: url.to_owned(),
            message: trimmed.to_owned(),
        });
    }
    Err(TriggerError::UnexpectedBody {
        url: url.to_owned(),
        body: body.to_owned(),
    })
}

/// HTTP trigger using `ureq`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTrigger;

impl ExtractionTrigger for HttpTrigger {
    fn fire(&self, url: &str, timeout: Duration) -> Result<String, TriggerError> {
        log::debug!("GET {url} (timeout {}s)", timeout.as_secs());
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        let agent = ureq::Agent::new_with_config(config);
        let response = agent
            .get(url)
            .header("Cache-Control", "no-cache")
            .call()
            .map_err(|e| map_ureq_error(url, timeout, &e))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| map_ureq_error(url, timeout, &e))
    }
}

/// Map a ureq error to a [`TriggerError`].
fn map_ureq_error(url: &str, timeout: Duration, err: &ureq::Error) -> TriggerError {
    match err {
        ureq::Error::StatusCode(status) => TriggerError::Status {
            url: url.to_owned(),
            status: *status,
        },
        ureq::Error::Timeout(_) => TriggerError::Timeout {
            url: url.to_owned(),
            seconds: timeout.as_secs(),
        },
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => TriggerError::Timeout {
            url: url.to_owned(),
            seconds: timeout.as_secs(),
        },
        other => TriggerError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
