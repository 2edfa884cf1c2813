//! Booking endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{Booking, BookingQuery, LineItem, NewBooking, RecurrenceDescriptor, RecurrenceUnit},
    services::bookings::{Confirmation, ScheduleChange},
};

use super::{CapacityRejection, TenantUser};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineItemRequest {
    pub equipment_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

impl From<LineItemRequest> for LineItem {
    fn from(item: LineItemRequest) -> Self {
        LineItem {
            equipment_id: item.equipment_id,
            quantity: item.quantity,
        }
    }
}

/// Repeat the booking every `interval` units
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecurrenceRequest {
    pub unit: RecurrenceUnit,
    #[validate(range(min = 1, message = "Interval must be at least 1"))]
    pub interval: i32,
    /// Last day an occurrence may start on
    pub end_date: Option<NaiveDate>,
}

/// Confirm booking request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    /// Client reference from the CRM
    #[validate(length(min = 1, max = 128, message = "Client reference must be 1-128 characters"))]
    pub client_ref: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub items: Vec<LineItemRequest>,
    #[validate(nested)]
    pub recurrence: Option<RecurrenceRequest>,
}

/// Reschedule request; items are kept when omitted
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RescheduleRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub items: Option<Vec<LineItemRequest>>,
}

fn confirmation_response(confirmation: Confirmation, created: StatusCode) -> Response {
    match confirmation {
        Confirmation::Confirmed(booking) => (created, Json(booking)).into_response(),
        Confirmation::Rejected(results) => CapacityRejection::new(results).into_response(),
    }
}

/// List bookings
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(BookingQuery),
    responses(
        (status = 200, description = "Bookings", body = Vec<Booking>),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_bookings(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Query(query): Query<BookingQuery>,
) -> AppResult<Json<Vec<Booking>>> {
    let bookings = state.services.bookings.list(&ctx, &query).await?;
    Ok(Json(bookings))
}

/// Confirm a booking (optionally the template of a recurring series)
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking confirmed", body = Booking),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Not enough equipment", body = CapacityRejection)
    )
)]
pub async fn create_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Json(request): Json<CreateBookingRequest>,
) -> AppResult<Response> {
    request.validate()?;

    let recurrence = request
        .recurrence
        .map(|r| RecurrenceDescriptor::new(r.unit, r.interval, r.end_date))
        .transpose()?;
    let new_booking = NewBooking {
        client_ref: request.client_ref,
        start_date: request.start_date,
        end_date: request.end_date,
        items: request.items.into_iter().map(LineItem::from).collect(),
        recurrence,
    };

    let confirmation = state.services.bookings.confirm(&ctx, new_booking).await?;
    Ok(confirmation_response(confirmation, StatusCode::CREATED))
}

/// Get booking by ID
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking", body = Booking),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn get_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    let booking = state.services.bookings.get(&ctx, id).await?;
    Ok(Json(booking))
}

/// Move a pending booking to new dates
#[utoipa::path(
    put,
    path = "/bookings/{id}/schedule",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Booking rescheduled", body = Booking),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Not enough equipment or booking no longer pending", body = CapacityRejection)
    )
)]
pub async fn reschedule_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> AppResult<Response> {
    request.validate()?;

    let change = ScheduleChange {
        start_date: request.start_date,
        end_date: request.end_date,
        items: request
            .items
            .map(|items| items.into_iter().map(LineItem::from).collect()),
    };
    let confirmation = state.services.bookings.reschedule(&ctx, id, change).await?;
    Ok(confirmation_response(confirmation, StatusCode::OK))
}

/// Mark a booking as installed at the client
#[utoipa::path(
    post,
    path = "/bookings/{id}/install",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking installed", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn install_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.services.bookings.install(&ctx, id).await?))
}

/// Mark a booking's equipment as picked up
#[utoipa::path(
    post,
    path = "/bookings/{id}/remove",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking completed", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn remove_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.services.bookings.remove(&ctx, id).await?))
}

/// Cancel a booking, freeing its equipment
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 404, description = "Booking not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn cancel_booking(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    Ok(Json(state.services.bookings.cancel(&ctx, id).await?))
}
