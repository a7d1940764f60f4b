//! Shared fixtures and wiremock responders for notification tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_decimal::Decimal;
use wiremock::{Request, Respond, ResponseTemplate};

use pesabridge_core::OperationId;
use pesabridge_db::models::{NotificationKind, OperationStatus};
use pesabridge_notify::models::NotificationPayload;

/// A realistic push-payment result payload.
pub fn sample_payload() -> NotificationPayload {
    NotificationPayload {
        kind: NotificationKind::PushPaymentResult,
        operation_id: Some(OperationId::new()),
        status: OperationStatus::Completed,
        amount: Decimal::new(15000, 2),
        msisdn: "254712345678".to_string(),
        result_code: Some(0),
        result_description: Some("The service request is processed successfully.".to_string()),
        receipt_number: Some("RKT12XYZ9Q".to_string()),
        completed_at: None,
        metadata: serde_json::json!({"order_id": "ORD-2291"}),
    }
}

/// The exact bytes the engine would transmit for a payload.
pub fn payload_bytes(payload: &NotificationPayload) -> Vec<u8> {
    serde_json::to_vec(payload).expect("payload serializes")
}

/// An HTTP client configured like the delivery engine's, with a short
/// timeout so failure tests stay fast.
pub fn test_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client builds")
}

/// Responder that fails a fixed number of times, then succeeds.
pub struct FailThenSucceed {
    remaining_failures: AtomicUsize,
    fail_status: u16,
}

impl FailThenSucceed {
    pub fn new(failures: usize, fail_status: u16) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            fail_status,
        }
    }
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            ResponseTemplate::new(self.fail_status)
        } else {
            ResponseTemplate::new(200).set_body_string("ok")
        }
    }
}
