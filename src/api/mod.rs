//! API handlers for the rental scheduling REST endpoints

pub mod availability;
pub mod bookings;
pub mod equipment;
pub mod health;
pub mod occurrences;
pub mod openapi;
pub mod series;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;

use crate::{
    error::{AppError, ErrorCode},
    models::{AvailabilityResult, TenantClaims, TenantContext},
    AppState,
};

/// Extractor resolving the acting tenant from the bearer token
pub struct TenantUser(pub TenantContext);

#[async_trait]
impl FromRequestParts<AppState> for TenantUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = TenantClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(TenantUser(claims.context()))
    }
}

/// Body of a 409 answer when the fleet cannot serve a request
#[derive(Serialize, ToSchema)]
pub struct CapacityRejection {
    pub code: u32,
    pub error: String,
    pub message: String,
    /// One entry per equipment type of the request
    pub results: Vec<AvailabilityResult>,
}

impl CapacityRejection {
    pub fn new(results: Vec<AvailabilityResult>) -> Self {
        let message = results
            .iter()
            .filter(|r| !r.available)
            .map(AvailabilityResult::message)
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            code: ErrorCode::CapacityExceeded as u32,
            error: format!("{:?}", ErrorCode::CapacityExceeded),
            message,
            results,
        }
    }
}

impl IntoResponse for CapacityRejection {
    fn into_response(self) -> Response {
        (StatusCode::CONFLICT, Json(self)).into_response()
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Inventory
        .route("/equipment", get(equipment::list_equipment))
        .route("/equipment/:id/ledger", get(equipment::get_ledger))
        // Availability
        .route("/availability/check", post(availability::check_availability))
        // Bookings
        .route("/bookings", get(bookings::list_bookings))
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/schedule", put(bookings::reschedule_booking))
        .route("/bookings/:id/install", post(bookings::install_booking))
        .route("/bookings/:id/remove", post(bookings::remove_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Recurrence series
        .route("/series/:id/expand", post(series::expand_series))
        .route("/series/:id/occurrences", get(series::list_occurrences))
        .route("/series/:id/pause", post(series::pause_series))
        .route("/series/:id/resume", post(series::resume_series))
        .route("/series/:id/cancel", post(series::cancel_series))
        // Occurrences
        .route("/occurrences/:id", get(occurrences::get_occurrence))
        .route("/occurrences/:id/install", post(occurrences::install_occurrence))
        .route("/occurrences/:id/remove", post(occurrences::remove_occurrence))
        .route("/occurrences/:id/cancel", post(occurrences::cancel_occurrence))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
