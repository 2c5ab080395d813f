//! Result and error types for appscout.
//!
//! Absence of an element is never an error here: locate operations return
//! `None`, an empty list or `false`. Errors describe transport trouble,
//! element state problems and misconfiguration.

use thiserror::Error;

/// Result type for appscout operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Errors that can occur while driving an automation session
#[derive(Debug, Error)]
pub enum ScoutError {
    /// HTTP-level failure talking to the Appium server
    #[error("Transport error: {message}")]
    Transport {
        /// Error message
        message: String,
    },

    /// The remote session is gone (terminated, timed out or never created)
    #[error("Session lost: {message}")]
    SessionLost {
        /// Error message
        message: String,
    },

    /// Any W3C error code without a dedicated variant
    #[error("Protocol error `{error}`: {message}")]
    Protocol {
        /// W3C error code (e.g. "invalid selector")
        error: String,
        /// Error message
        message: String,
    },

    /// Element reference no longer points at a live node
    #[error("Stale element reference: {message}")]
    StaleElement {
        /// Error message
        message: String,
    },

    /// Element exists but cannot receive the interaction
    #[error("Element not interactable: {message}")]
    NotInteractable {
        /// Error message
        message: String,
    },

    /// Single-element lookup found nothing
    #[error("No such element: {message}")]
    NoSuchElement {
        /// Error message
        message: String,
    },

    /// Context switch target does not exist (any more)
    #[error("No such context: {name}")]
    NoSuchContext {
        /// Context identifier
        name: String,
    },

    /// Every click tier failed
    #[error("Click on {target} failed after {tiers} tier(s); last error: {last_error}")]
    ClickFailed {
        /// Description of the located element
        target: String,
        /// Number of tiers attempted
        tiers: usize,
        /// Message of the last tier failure
        last_error: String,
    },

    /// A required element was not found within the timeout (screen layer)
    #[error("Element '{target}' not found within {timeout_ms}ms")]
    ElementNotFound {
        /// Search target
        target: String,
        /// Timeout used
        timeout_ms: u64,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Assertion failed inside a flow
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Fixture error (setup/teardown failed)
    #[error("Fixture error: {message}")]
    FixtureError {
        /// Error message
        message: String,
    },

    /// QR rendering or device media failure
    #[error("Media error: {message}")]
    Media {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ScoutError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a media error
    #[must_use]
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Map a W3C WebDriver error code onto a variant.
    #[must_use]
    pub fn from_w3c(error: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match error {
            "stale element reference" => Self::StaleElement { message },
            "element not interactable" | "element click intercepted" => {
                Self::NotInteractable { message }
            }
            "no such element" => Self::NoSuchElement { message },
            "invalid session id" => Self::SessionLost { message },
            "no such context" => Self::NoSuchContext { name: message },
            other => Self::Protocol {
                error: other.to_string(),
                message,
            },
        }
    }

    /// Errors after which the session cannot be used any more.
    ///
    /// Locate loops and click tiers propagate these instead of absorbing them.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost { .. } | Self::Transport { .. })
    }

    /// Errors caused by the state of one element rather than the session.
    #[must_use]
    pub const fn is_element_state(&self) -> bool {
        matches!(
            self,
            Self::StaleElement { .. } | Self::NotInteractable { .. } | Self::NoSuchElement { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_w3c_mapping() {
        assert!(matches!(
            ScoutError::from_w3c("stale element reference", "gone"),
            ScoutError::StaleElement { .. }
        ));
        assert!(matches!(
            ScoutError::from_w3c("element click intercepted", "covered"),
            ScoutError::NotInteractable { .. }
        ));
        assert!(matches!(
            ScoutError::from_w3c("invalid session id", "x"),
            ScoutError::SessionLost { .. }
        ));
        match ScoutError::from_w3c("no such context", "WEBVIEW_1") {
            ScoutError::NoSuchContext { name } => assert_eq!(name, "WEBVIEW_1"),
            other => panic!("unexpected {other:?}"),
        }
        match ScoutError::from_w3c("invalid selector", "bad") {
            ScoutError::Protocol { error, .. } => assert_eq!(error, "invalid selector"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ScoutError::transport("refused").is_fatal());
        assert!(ScoutError::from_w3c("invalid session id", "").is_fatal());
        assert!(!ScoutError::from_w3c("stale element reference", "").is_fatal());
        assert!(!ScoutError::config("x").is_fatal());
    }

    #[test]
    fn test_element_state_classification() {
        assert!(ScoutError::from_w3c("no such element", "").is_element_state());
        assert!(!ScoutError::from_w3c("unknown error", "").is_element_state());
    }

    #[test]
    fn test_not_found_message_names_target_and_timeout() {
        let err = ScoutError::ElementNotFound {
            target: "Оплатить".into(),
            timeout_ms: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("Оплатить"));
        assert!(msg.contains("10000ms"));
    }
}
