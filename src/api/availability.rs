//! Availability check endpoint

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{AvailabilityResult, BookingRequest},
};

use super::TenantUser;

/// Availability question for one equipment type
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckAvailabilityRequest {
    pub equipment_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Booking being edited, left out of the count
    pub exclude_booking_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckAvailabilityResponse {
    pub result: AvailabilityResult,
    /// Human readable summary naming the equipment and dates
    pub message: String,
}

/// Check whether a quantity of equipment is free over a date range
#[utoipa::path(
    post,
    path = "/availability/check",
    tag = "availability",
    security(("bearer_auth" = [])),
    request_body = CheckAvailabilityRequest,
    responses(
        (status = 200, description = "Availability computed", body = CheckAvailabilityResponse),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn check_availability(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Json(request): Json<CheckAvailabilityRequest>,
) -> AppResult<Json<CheckAvailabilityResponse>> {
    request.validate()?;

    let request = BookingRequest {
        equipment_id: request.equipment_id,
        quantity: request.quantity,
        start_date: request.start_date,
        end_date: request.end_date,
        exclude_booking_id: request.exclude_booking_id,
    };
    let result = state.services.availability.check(&ctx, &request).await?;

    Ok(Json(CheckAvailabilityResponse {
        message: result.message(),
        result,
    }))
}
