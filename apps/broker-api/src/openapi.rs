//! `OpenAPI` documentation assembly.

use utoipa::OpenApi;

use pesabridge_notify::error::ErrorResponse;
use pesabridge_notify::handlers;
use pesabridge_notify::models::{
    CallbackAck, NotificationDetailResponse, NotificationListResponse, NotificationResponse,
    OperationResponse,
};

/// `OpenAPI` documentation for the broker API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "pesabridge API",
        version = "0.3.0",
        description = "Payment broker callback ingestion and notification status API"
    ),
    tags(
        (name = "Callbacks", description = "Inbound payment network result callbacks"),
        (name = "Notifications", description = "Outbound notification status queries"),
        (name = "Operations", description = "Payment operation status queries")
    ),
    paths(
        handlers::callback_handler,
        handlers::list_notifications_handler,
        handlers::get_notification_handler,
        handlers::get_operation_handler,
    ),
    components(schemas(
        CallbackAck,
        NotificationResponse,
        NotificationDetailResponse,
        NotificationListResponse,
        OperationResponse,
        ErrorResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_includes_all_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();

        assert!(paths.contains(&"/callbacks/payment".to_string()));
        assert!(paths.contains(&"/notifications".to_string()));
        assert!(paths.contains(&"/notifications/{id}".to_string()));
        assert!(paths.contains(&"/operations/{id}".to_string()));
    }

    #[test]
    fn test_openapi_document_serializes() {
        let json = ApiDoc::openapi().to_json().expect("document serializes");
        assert!(json.contains("pesabridge API"));
    }
}
