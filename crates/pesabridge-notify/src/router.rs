//! Router assembly for the notification subsystem.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;

use crate::callback::CallbackAdapter;
use crate::handlers::{
    callback_handler, get_notification_handler, get_operation_handler,
    list_notifications_handler,
};

/// Shared state for the notification routes.
#[derive(Clone)]
pub struct NotifyState {
    pub pool: PgPool,
    pub adapter: Arc<CallbackAdapter>,
}

impl NotifyState {
    pub fn new(pool: PgPool, adapter: Arc<CallbackAdapter>) -> Self {
        Self { pool, adapter }
    }
}

/// Build the notification subsystem router.
///
/// Routes:
/// - `POST /callbacks/payment` - inbound network result callback
/// - `GET /notifications` - list notifications for a client
/// - `GET /notifications/:id` - notification details
/// - `GET /operations/:id` - operation status
pub fn notify_router(state: NotifyState) -> Router {
    Router::new()
        .route("/callbacks/payment", post(callback_handler))
        .route("/notifications", get(list_notifications_handler))
        .route("/notifications/:id", get(get_notification_handler))
        .route("/operations/:id", get(get_operation_handler))
        .with_state(state)
}
