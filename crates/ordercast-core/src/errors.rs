//! Error hierarchy for the ordercast client.
//!
//! - [`ConnectionError`]: a connect attempt could not complete
//! - [`AuthError`]: the server refused the credential
//! - [`TransportError`]: the underlying socket failed or is not available
//! - [`ValidationError`]: an inbound notification payload was malformed
//! - [`DispatchError`]: a notification subscriber reported a failure
//! - [`ClientError`]: top-level enum returned across the public API
//!
//! Only [`ConnectionError`] and [`TransportError`] (via `emit`) cross the
//! public API. Auth and transport failures on an established session surface
//! as state transitions; validation and dispatch failures stay inside the
//! pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::notification::Category;

/// A connect attempt could not complete.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The credential provider had no credential for the tenant.
    #[error("missing credential for tenant {tenant_id}")]
    MissingCredential {
        /// Tenant the caller tried to connect.
        tenant_id: String,
    },
    /// The transport did not report a connect within the deadline.
    #[error("connect timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The transport reported a connect error on the first attempt.
    #[error("connect failed: {0}")]
    Transport(String),
    /// `reconnect()` was requested but no tenant is known.
    #[error("no session to reconnect")]
    NoSession,
    /// The attempt was superseded by a disconnect or another connect.
    #[error("connect attempt cancelled")]
    Cancelled,
    /// The supervisor task has stopped.
    #[error("client is shut down")]
    Closed,
}

/// The server refused the credential.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// `unauthorized` acknowledgement received.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Reason reported by the server.
        reason: String,
    },
}

/// The underlying socket failed or is not available.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live transport; nothing was sent.
    #[error("not connected")]
    NotConnected,
    /// The transport's outbound channel is closed.
    #[error("transport closed")]
    Closed,
    /// Socket-level I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),
    /// The peer sent something that does not follow the envelope format.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// An outbound payload could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An inbound notification payload was malformed.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Payload was not a JSON object.
    #[error("notification payload is not an object")]
    NotAnObject,
    /// A required field is absent or null.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A field is present but has the wrong shape or range.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// `category` is not one of the known categories.
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
}

/// A notification subscriber reported a failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("subscriber {subscriber_id} failed on order {order_id} ({category}): {message}")]
pub struct DispatchError {
    /// Token of the failing subscriber.
    pub subscriber_id: u64,
    /// Category of the notification being dispatched.
    pub category: Category,
    /// Order the notification refers to.
    pub order_id: u64,
    /// Failure text reported by the subscriber.
    pub message: String,
}

/// Top-level error returned across the public client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect attempt failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Credential refused.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Transport unavailable or failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Malformed notification.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Subscriber failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ClientError {
    /// Whether retrying the same call later can reasonably succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => matches!(
                e,
                ConnectionError::Timeout { .. } | ConnectionError::Transport(_)
            ),
            Self::Transport(e) => matches!(
                e,
                TransportError::NotConnected | TransportError::Closed | TransportError::Io(_)
            ),
            Self::Auth(_) | Self::Validation(_) | Self::Dispatch(_) => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn missing_credential_display() {
        let err = ConnectionError::MissingCredential {
            tenant_id: "tenantA".into(),
        };
        assert_eq!(err.to_string(), "missing credential for tenant tenantA");
    }

    #[test]
    fn timeout_display_in_millis() {
        let err = ConnectionError::Timeout {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "connect timed out after 30000ms");
    }

    #[test]
    fn client_error_is_transparent() {
        let err: ClientError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "not connected");
        assert_matches!(err, ClientError::Transport(TransportError::NotConnected));
    }

    #[test]
    fn auth_error_display() {
        let err = AuthError::Unauthorized {
            reason: "token expired".into(),
        };
        assert_eq!(err.to_string(), "unauthorized: token expired");
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError {
            subscriber_id: 7,
            category: Category::NewOrder,
            order_id: 42,
            message: "boom".into(),
        };
        let text = err.to_string();
        assert!(text.contains("subscriber 7"));
        assert!(text.contains("order 42"));
        assert!(text.contains("NEW_ORDER"));
    }

    #[test]
    fn encode_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: TransportError = json_err.into();
        assert_matches!(err, TransportError::Encode(_));
    }

    #[test]
    fn retryable_classification() {
        let timeout: ClientError = ConnectionError::Timeout {
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(timeout.is_retryable());

        let missing: ClientError = ConnectionError::MissingCredential {
            tenant_id: "t".into(),
        }
        .into();
        assert!(!missing.is_retryable());

        let not_connected: ClientError = TransportError::NotConnected.into();
        assert!(not_connected.is_retryable());

        let auth: ClientError = AuthError::Unauthorized { reason: "x".into() }.into();
        assert!(!auth.is_retryable());
    }
}
