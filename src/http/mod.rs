//! HTTP API surface.
//!
//! Thin request layer: deserialize, delegate to services/store, wrap the
//! result in the `{success, data | error}` envelope. Caller identity is
//! explicit in every request; the identity provider in front of this
//! service is out of scope.

mod routes;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::db::DbError;
use crate::services::ServiceError;
use crate::state::SharedState;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
}

/// Error half of the envelope, with the status mapped from the error class.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        });
        (self.status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Db(DbError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Db(DbError::IllegalTransition { .. }) => StatusCode::CONFLICT,
            ServiceError::Db(DbError::InvalidTimezone(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {err}");
        }
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError::from(ServiceError::Db(err))
    }
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let upload_limit = state.config.max_upload_bytes as usize + 1024 * 1024;

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/organizations", post(routes::create_organization))
        .route("/api/organizations/:slug", get(routes::organization_by_slug))
        .route("/api/users", post(routes::create_user))
        .route(
            "/api/briefs",
            post(routes::create_brief).get(routes::list_briefs),
        )
        .route(
            "/api/briefs/:id",
            get(routes::get_brief)
                .patch(routes::update_brief)
                .delete(routes::delete_brief),
        )
        .route("/api/content/generate", post(routes::generate_content))
        .route("/api/content/requests/:id", get(routes::get_request))
        .route(
            "/api/content/requests/:id/approve",
            post(routes::approve_request),
        )
        .route(
            "/api/content/requests/:id/reject",
            post(routes::reject_request),
        )
        .route(
            "/api/content/versions/:id",
            get(routes::get_version).patch(routes::edit_version),
        )
        .route(
            "/api/content/versions/:id/select",
            post(routes::select_version),
        )
        .route(
            "/api/content/versions/:id/comments",
            post(routes::create_comment).get(routes::list_comments),
        )
        .route("/api/uploads", post(routes::upload))
        .route("/api/files", get(routes::list_files))
        .route("/api/files/:id", axum::routing::delete(routes::delete_file))
        .route(
            "/api/connections",
            post(routes::create_connection).get(routes::list_connections),
        )
        .route(
            "/api/schedules",
            post(routes::create_schedule).get(routes::list_schedules),
        )
        .route("/api/schedules/upcoming", get(routes::upcoming_schedules))
        .route("/api/schedules/:id/publish", post(routes::publish_schedule))
        .route("/api/schedules/:id/fail", post(routes::fail_schedule))
        .route("/api/schedules/:id/cancel", post(routes::cancel_schedule))
        .route("/api/analytics/events", post(routes::record_event))
        .route("/api/analytics", get(routes::analytics))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
