//! Wire and API types for the notification subsystem.
//!
//! The inbound callback format is deliberately loose: result metadata
//! arrives as an ordered list of name/value items whose key set varies by
//! response type, so it is modeled as a tagged lookup rather than a fixed
//! structure. Missing keys are an expected condition, not an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use pesabridge_core::OperationId;
use pesabridge_db::models::{NotificationKind, OperationStatus};

// ---------------------------------------------------------------------------
// Outbound notification payload
// ---------------------------------------------------------------------------

/// Snapshot of an operation outcome, frozen into the notification record at
/// creation and serialized verbatim as the delivery body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: NotificationKind,
    pub operation_id: Option<OperationId>,
    pub status: OperationStatus,
    pub amount: Decimal,
    pub msisdn: String,
    pub result_code: Option<i32>,
    pub result_description: Option<String>,
    pub receipt_number: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque client-supplied metadata, echoed back unchanged.
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Inbound network callback
// ---------------------------------------------------------------------------

/// A raw result callback from the payment network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkCallback {
    /// Network request correlation identifier, if echoed.
    pub network_ref: Option<String>,
    /// Session correlation identifier, if echoed.
    pub session_ref: Option<String>,
    /// Network result code; 0 means success.
    pub result_code: i32,
    #[serde(default)]
    pub result_description: String,
    /// Variable-shape result metadata.
    #[serde(default)]
    pub items: CallbackItems,
}

impl NetworkCallback {
    /// The correlation identifier to resolve by, preferring the request ref.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.network_ref
            .as_deref()
            .or(self.session_ref.as_deref())
    }
}

/// One name/value entry in a callback item list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackItem {
    pub name: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Ordered list of callback items with tolerant lookup by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackItems(pub Vec<CallbackItem>);

impl CallbackItems {
    /// Look up the first item with the given name. Absence is `None`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&serde_json::Value> {
        self.0
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    /// Look up a string-valued item.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(|v| v.as_str())
    }

    /// Look up a timestamp-valued item (RFC3339). Unparseable values are
    /// treated the same as absent ones.
    #[must_use]
    pub fn get_timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get_str(name)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Acknowledgement body returned to the payment network.
///
/// Always reports acceptance; internal failures are logged, never surfaced,
/// so the network does not enter its own retry storm.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    pub result_code: i32,
    pub result_description: String,
}

impl CallbackAck {
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_description: "Accepted".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Status query API types
// ---------------------------------------------------------------------------

/// Query parameters for listing notifications.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListNotificationsQuery {
    /// Owning client to list notifications for.
    pub client_id: Uuid,
    /// Optional status filter (pending | sent | failed | failed_permanent).
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Summary view of a notification.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub operation_id: Option<Uuid>,
    pub kind: String,
    pub status: String,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i16>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full view of a notification, including the payload snapshot and the last
/// transport response.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationDetailResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub operation_id: Option<Uuid>,
    pub kind: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub destination_url: String,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub response_code: Option<i16>,
    pub response_body: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Paginated notification listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub items: Vec<NotificationResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Status view of a payment operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct OperationResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub msisdn: String,
    pub status: String,
    pub network_ref: Option<String>,
    pub session_ref: Option<String>,
    pub result_code: Option<i32>,
    pub result_description: Option<String>,
    pub receipt_number: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(entries: &[(&str, serde_json::Value)]) -> CallbackItems {
        CallbackItems(
            entries
                .iter()
                .map(|(name, value)| CallbackItem {
                    name: (*name).to_string(),
                    value: Some(value.clone()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_lookup_present_key() {
        let items = items(&[("receipt_number", json!("RX12345"))]);
        assert_eq!(items.get_str("receipt_number"), Some("RX12345"));
    }

    #[test]
    fn test_lookup_absent_key_returns_none() {
        let items = items(&[("receipt_number", json!("RX12345"))]);
        assert!(items.lookup("completed_at").is_none());
        assert!(items.get_str("completed_at").is_none());
    }

    #[test]
    fn test_lookup_null_value_returns_none() {
        let items = CallbackItems(vec![CallbackItem {
            name: "receipt_number".to_string(),
            value: None,
        }]);
        assert!(items.lookup("receipt_number").is_none());
    }

    #[test]
    fn test_lookup_first_match_wins() {
        let items = items(&[
            ("amount", json!("10.00")),
            ("amount", json!("99.99")),
        ]);
        assert_eq!(items.get_str("amount"), Some("10.00"));
    }

    #[test]
    fn test_get_timestamp_parses_rfc3339() {
        let items = items(&[("completed_at", json!("2025-06-01T12:30:00Z"))]);
        let ts = items.get_timestamp("completed_at").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_get_timestamp_unparseable_is_none() {
        let items = items(&[("completed_at", json!("yesterday"))]);
        assert!(items.get_timestamp("completed_at").is_none());
    }

    #[test]
    fn test_callback_correlation_prefers_network_ref() {
        let cb = NetworkCallback {
            network_ref: Some("req-1".to_string()),
            session_ref: Some("sess-1".to_string()),
            result_code: 0,
            result_description: String::new(),
            items: CallbackItems::default(),
        };
        assert_eq!(cb.correlation_id(), Some("req-1"));
    }

    #[test]
    fn test_callback_correlation_falls_back_to_session_ref() {
        let cb = NetworkCallback {
            network_ref: None,
            session_ref: Some("sess-1".to_string()),
            result_code: 0,
            result_description: String::new(),
            items: CallbackItems::default(),
        };
        assert_eq!(cb.correlation_id(), Some("sess-1"));
    }

    #[test]
    fn test_callback_deserializes_without_items() {
        let cb: NetworkCallback = serde_json::from_value(json!({
            "network_ref": "req-9",
            "result_code": 1032
        }))
        .unwrap();
        assert_eq!(cb.result_code, 1032);
        assert!(cb.items.0.is_empty());
    }

    #[test]
    fn test_ack_is_always_accepted() {
        let ack = CallbackAck::accepted();
        assert_eq!(ack.result_code, 0);
        assert_eq!(ack.result_description, "Accepted");
    }
}
