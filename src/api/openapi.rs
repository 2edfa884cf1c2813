//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{availability, bookings, equipment, health, occurrences, series};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rental Scheduling API",
        version = "1.0.0",
        description = "Reservation and recurrence scheduling for equipment rental",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Equipment
        equipment::list_equipment,
        equipment::get_ledger,
        // Availability
        availability::check_availability,
        // Bookings
        bookings::list_bookings,
        bookings::create_booking,
        bookings::get_booking,
        bookings::reschedule_booking,
        bookings::install_booking,
        bookings::remove_booking,
        bookings::cancel_booking,
        // Series
        series::expand_series,
        series::list_occurrences,
        series::pause_series,
        series::resume_series,
        series::cancel_series,
        // Occurrences
        occurrences::get_occurrence,
        occurrences::install_occurrence,
        occurrences::remove_occurrence,
        occurrences::cancel_occurrence,
    ),
    components(
        schemas(
            // Equipment
            crate::models::EquipmentStock,
            crate::models::LedgerSnapshot,
            crate::models::equipment::LedgerQuery,
            // Availability
            availability::CheckAvailabilityRequest,
            availability::CheckAvailabilityResponse,
            crate::models::AvailabilityResult,
            crate::models::UnavailableReason,
            crate::models::DateRange,
            // Bookings
            bookings::CreateBookingRequest,
            bookings::RescheduleRequest,
            bookings::LineItemRequest,
            bookings::RecurrenceRequest,
            crate::models::Booking,
            crate::models::BookingQuery,
            crate::models::BookingStatus,
            crate::models::LineItem,
            // Series
            series::ExpandQuery,
            crate::services::recurrence::ExpansionReport,
            crate::models::RecurrenceDescriptor,
            crate::models::RecurrenceUnit,
            crate::models::SeriesStatus,
            crate::models::Occurrence,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::api::CapacityRejection,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "equipment", description = "Equipment inventory ledger"),
        (name = "availability", description = "Availability checks"),
        (name = "bookings", description = "Booking lifecycle"),
        (name = "series", description = "Recurrence series control and expansion"),
        (name = "occurrences", description = "Occurrence lifecycle")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
