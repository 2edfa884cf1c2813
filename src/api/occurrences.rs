//! Occurrence endpoints

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{error::AppResult, models::Occurrence, services::occurrences::OccurrenceOutcome};

use super::{CapacityRejection, TenantUser};

/// Get occurrence by ID
#[utoipa::path(
    get,
    path = "/occurrences/{id}",
    tag = "occurrences",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Occurrence ID")),
    responses(
        (status = 200, description = "Occurrence", body = Occurrence),
        (status = 404, description = "Occurrence not found")
    )
)]
pub async fn get_occurrence(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Occurrence>> {
    Ok(Json(state.services.occurrences.get(&ctx, id).await?))
}

/// Install an occurrence, committing its equipment
#[utoipa::path(
    post,
    path = "/occurrences/{id}/install",
    tag = "occurrences",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Occurrence ID")),
    responses(
        (status = 200, description = "Occurrence installed", body = Occurrence),
        (status = 404, description = "Occurrence not found"),
        (status = 409, description = "Not enough equipment or transition not allowed", body = CapacityRejection)
    )
)]
pub async fn install_occurrence(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    match state.services.occurrences.install(&ctx, id).await? {
        OccurrenceOutcome::Applied(occurrence) => Ok(Json(occurrence).into_response()),
        OccurrenceOutcome::Rejected(results) => Ok(CapacityRejection::new(results).into_response()),
    }
}

/// Mark an occurrence's equipment as picked up
#[utoipa::path(
    post,
    path = "/occurrences/{id}/remove",
    tag = "occurrences",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Occurrence ID")),
    responses(
        (status = 200, description = "Occurrence completed", body = Occurrence),
        (status = 404, description = "Occurrence not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn remove_occurrence(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Occurrence>> {
    Ok(Json(state.services.occurrences.remove(&ctx, id).await?))
}

/// Cancel a single occurrence
#[utoipa::path(
    post,
    path = "/occurrences/{id}/cancel",
    tag = "occurrences",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Occurrence ID")),
    responses(
        (status = 200, description = "Occurrence cancelled", body = Occurrence),
        (status = 404, description = "Occurrence not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn cancel_occurrence(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Occurrence>> {
    Ok(Json(state.services.occurrences.cancel(&ctx, id).await?))
}
