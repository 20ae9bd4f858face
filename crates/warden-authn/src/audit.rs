//! Structured audit logging for authentication outcomes.
//!
//! Every authentication, login and status attempt produces exactly one
//! audit event, success or failure, before the outcome is returned to
//! the caller. Events go through an [`AuditSink`] so deployments can route
//! them to their own pipeline; the default sink writes them to the
//! tracing infrastructure as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types for authentication and login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    /// Successful authentication
    AuthenticationSuccess {
        /// Organization account
        account: String,
        /// Authenticator webservice name, e.g. `authn-jwt/raw`
        authenticator: String,
        /// Resolved identity
        username: String,
        /// Client IP the request came from
        client_ip: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },

    /// Failed authentication attempt
    AuthenticationFailure {
        /// Organization account
        account: String,
        /// Authenticator webservice name
        authenticator: String,
        /// Identity, when one was resolvable before the failure
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Client IP the request came from
        client_ip: String,
        /// Error that caused the failure
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },

    /// Successful API-key login
    LoginSuccess {
        /// Organization account
        account: String,
        /// Resolved identity
        username: String,
        /// Client IP the request came from
        client_ip: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },

    /// Failed API-key login attempt
    LoginFailure {
        /// Organization account
        account: String,
        /// Login name as presented
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Client IP the request came from
        client_ip: String,
        /// Error that caused the failure
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },

    /// Successful authenticator status check
    StatusSuccess {
        /// Organization account
        account: String,
        /// Authenticator webservice name
        authenticator: String,
        /// Requesting identity
        username: String,
        /// Client IP the request came from
        client_ip: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },

    /// Failed authenticator status check
    StatusFailure {
        /// Organization account
        account: String,
        /// Authenticator webservice name
        authenticator: String,
        /// Requesting identity, when one was given
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        /// Client IP the request came from
        client_ip: String,
        /// Error that caused the failure
        error: String,
        /// Timestamp of the event
        timestamp: DateTime<Utc>,
    },
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: AuditEvent);
}

/// Sink that writes events to the tracing infrastructure.
///
/// Success events log at INFO, failures at WARN, each with the full
/// event serialized as JSON in the `audit_event` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize audit event");
                return;
            },
        };

        match &event {
            AuditEvent::AuthenticationSuccess { account, authenticator, username, client_ip, .. } => {
                tracing::info!(
                    audit_event = %json,
                    account = %account,
                    authenticator = %authenticator,
                    username = %username,
                    client_ip = %client_ip,
                    "authentication succeeded"
                );
            },
            AuditEvent::AuthenticationFailure {
                account,
                authenticator,
                username,
                client_ip,
                error,
                ..
            } => {
                tracing::warn!(
                    audit_event = %json,
                    account = %account,
                    authenticator = %authenticator,
                    username = ?username,
                    client_ip = %client_ip,
                    error = %error,
                    "authentication failed"
                );
            },
            AuditEvent::LoginSuccess { account, username, client_ip, .. } => {
                tracing::info!(
                    audit_event = %json,
                    account = %account,
                    username = %username,
                    client_ip = %client_ip,
                    "login succeeded"
                );
            },
            AuditEvent::LoginFailure { account, username, client_ip, error, .. } => {
                tracing::warn!(
                    audit_event = %json,
                    account = %account,
                    username = ?username,
                    client_ip = %client_ip,
                    error = %error,
                    "login failed"
                );
            },
            AuditEvent::StatusSuccess { account, authenticator, username, client_ip, .. } => {
                tracing::info!(
                    audit_event = %json,
                    account = %account,
                    authenticator = %authenticator,
                    username = %username,
                    client_ip = %client_ip,
                    "status check succeeded"
                );
            },
            AuditEvent::StatusFailure {
                account,
                authenticator,
                username,
                client_ip,
                error,
                ..
            } => {
                tracing::warn!(
                    audit_event = %json,
                    account = %account,
                    authenticator = %authenticator,
                    username = ?username,
                    client_ip = %client_ip,
                    error = %error,
                    "status check failed"
                );
            },
        }
    }
}

/// Sink that collects events in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink lock").clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().expect("audit sink lock").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_event_serialization() {
        let event = AuditEvent::AuthenticationSuccess {
            account: "acme".to_string(),
            authenticator: "authn-jwt/raw".to_string(),
            username: "host/myapp/workload-1".to_string(),
            client_ip: "203.0.113.9".to_string(),
            timestamp: DateTime::from_timestamp(1234567890, 0).unwrap(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("AuthenticationSuccess"));
        assert!(json.contains("authn-jwt/raw"));
        assert!(json.contains("workload-1"));
    }

    #[test]
    fn test_failure_event_hides_absent_username() {
        let event = AuditEvent::AuthenticationFailure {
            account: "acme".to_string(),
            authenticator: "authn-azure/prod".to_string(),
            username: None,
            client_ip: "203.0.113.9".to_string(),
            error: "token expired".to_string(),
            timestamp: DateTime::from_timestamp(1234567890, 0).unwrap(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("token expired"));
        assert!(!json.contains("username"));
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let sink = TracingAuditSink;
        sink.record(AuditEvent::LoginSuccess {
            account: "acme".to_string(),
            username: "alice".to_string(),
            client_ip: "127.0.0.1".to_string(),
            timestamp: Utc::now(),
        });
        sink.record(AuditEvent::LoginFailure {
            account: "acme".to_string(),
            username: Some("alice".to_string()),
            client_ip: "127.0.0.1".to_string(),
            error: "invalid credentials".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_recording_sink_collects_in_order() {
        let sink = RecordingAuditSink::new();
        sink.record(AuditEvent::LoginSuccess {
            account: "acme".to_string(),
            username: "alice".to_string(),
            client_ip: "127.0.0.1".to_string(),
            timestamp: Utc::now(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AuditEvent::LoginSuccess { username, .. } if username == "alice"));
    }
}
