//! HTTP handlers: the inbound network callback endpoint and the status
//! query API.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use pesabridge_db::models::{Notification, NotificationStatus, Operation};

use crate::error::{ApiResult, NotifyError};
use crate::models::{
    CallbackAck, ListNotificationsQuery, NetworkCallback, NotificationDetailResponse,
    NotificationListResponse, NotificationResponse, OperationResponse,
};
use crate::router::NotifyState;

// ---------------------------------------------------------------------------
// Inbound callback endpoint
// ---------------------------------------------------------------------------

/// Receive an asynchronous result callback from the payment network.
///
/// The body is taken as raw bytes and parsed inside the handler: this
/// endpoint answers 200 with an acceptance body no matter what arrives,
/// including malformed JSON and invalid UTF-8 (a `String` extractor would
/// answer 400 before we could acknowledge). Rejecting would only make the
/// network re-send a payload we already know we cannot process.
#[utoipa::path(
    post,
    path = "/callbacks/payment",
    tag = "Callbacks",
    request_body = String,
    responses(
        (status = 200, description = "Callback accepted", body = CallbackAck),
    )
)]
pub async fn callback_handler(
    State(state): State<NotifyState>,
    body: Bytes,
) -> Json<CallbackAck> {
    match serde_json::from_slice::<NetworkCallback>(&body) {
        Ok(callback) => Json(state.adapter.handle(callback).await),
        Err(e) => {
            tracing::warn!(
                target: "notification_delivery",
                error = %e,
                body_len = body.len(),
                "Unparseable network callback; acknowledging anyway"
            );
            Json(CallbackAck::accepted())
        }
    }
}

// ---------------------------------------------------------------------------
// Status query handlers
// ---------------------------------------------------------------------------

/// List notifications for a client.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Paginated notification list", body = NotificationListResponse),
        (status = 400, description = "Invalid status filter"),
    )
)]
pub async fn list_notifications_handler(
    State(state): State<NotifyState>,
    Query(query): Query<ListNotificationsQuery>,
) -> ApiResult<Json<NotificationListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            NotificationStatus::parse(s)
                .ok_or_else(|| NotifyError::InvalidQuery(format!("Unknown status '{s}'")))
        })
        .transpose()?;

    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);

    let notifications =
        Notification::list_by_client(&state.pool, query.client_id, status, limit, offset).await?;
    let total = Notification::count_by_client(&state.pool, query.client_id, status).await?;

    let items = notifications
        .into_iter()
        .map(notification_to_response)
        .collect();

    Ok(Json(NotificationListResponse {
        items,
        total,
        limit,
        offset,
    }))
}

/// Get full details of a notification, including the payload snapshot and
/// the last transport response.
#[utoipa::path(
    get,
    path = "/notifications/{id}",
    tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification details", body = NotificationDetailResponse),
        (status = 404, description = "Notification not found"),
    )
)]
pub async fn get_notification_handler(
    State(state): State<NotifyState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<NotificationDetailResponse>> {
    let notification = Notification::find_by_id(&state.pool, id)
        .await?
        .ok_or(NotifyError::NotificationNotFound)?;

    Ok(Json(notification_to_detail_response(notification)))
}

/// Get the current status of a payment operation.
#[utoipa::path(
    get,
    path = "/operations/{id}",
    tag = "Operations",
    params(("id" = Uuid, Path, description = "Operation ID")),
    responses(
        (status = 200, description = "Operation status", body = OperationResponse),
        (status = 404, description = "Operation not found"),
    )
)]
pub async fn get_operation_handler(
    State(state): State<NotifyState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OperationResponse>> {
    let operation = Operation::find_by_id(&state.pool, id)
        .await?
        .ok_or(NotifyError::OperationNotFound)?;

    Ok(Json(operation_to_response(operation)))
}

// ---------------------------------------------------------------------------
// Model-to-response converters
// ---------------------------------------------------------------------------

fn notification_to_response(n: Notification) -> NotificationResponse {
    NotificationResponse {
        id: n.id,
        client_id: n.client_id,
        operation_id: n.operation_id,
        kind: n.kind.as_str().to_string(),
        status: n.status.as_str().to_string(),
        attempts: n.attempts,
        last_attempt_at: n.last_attempt_at,
        response_code: n.response_code,
        last_error: n.last_error,
        created_at: n.created_at,
    }
}

fn notification_to_detail_response(n: Notification) -> NotificationDetailResponse {
    NotificationDetailResponse {
        id: n.id,
        client_id: n.client_id,
        operation_id: n.operation_id,
        kind: n.kind.as_str().to_string(),
        status: n.status.as_str().to_string(),
        payload: n.payload,
        destination_url: n.destination_url,
        attempts: n.attempts,
        last_attempt_at: n.last_attempt_at,
        response_code: n.response_code,
        response_body: n.response_body,
        last_error: n.last_error,
        created_at: n.created_at,
        updated_at: n.updated_at,
    }
}

fn operation_to_response(op: Operation) -> OperationResponse {
    OperationResponse {
        id: op.id,
        client_id: op.client_id,
        kind: op.kind.as_str().to_string(),
        amount: op.amount,
        msisdn: op.msisdn,
        status: op.status.as_str().to_string(),
        network_ref: op.network_ref,
        session_ref: op.session_ref,
        result_code: op.result_code,
        result_description: op.result_description,
        receipt_number: op.receipt_number,
        completed_at: op.completed_at,
        created_at: op.created_at,
    }
}
