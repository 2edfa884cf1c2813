//! Recurrence series endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Occurrence, RecurrenceDescriptor},
    services::recurrence::ExpansionReport,
};

use super::TenantUser;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ExpandQuery {
    /// Occurrences to generate at most (defaults to the configured batch size)
    pub batch_size: Option<usize>,
}

/// Generate the next batch of occurrences of a series
#[utoipa::path(
    post,
    path = "/series/{id}/expand",
    tag = "series",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Series (template booking) ID"),
        ExpandQuery
    ),
    responses(
        (status = 200, description = "Expansion report", body = ExpansionReport),
        (status = 400, description = "Invalid batch size"),
        (status = 404, description = "Series not found")
    )
)]
pub async fn expand_series(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ExpandQuery>,
) -> AppResult<Json<ExpansionReport>> {
    let report = state.services.recurrence.expand(&ctx, id, query.batch_size).await?;
    Ok(Json(report))
}

/// List the occurrences of a series
#[utoipa::path(
    get,
    path = "/series/{id}/occurrences",
    tag = "series",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Series (template booking) ID")),
    responses(
        (status = 200, description = "Occurrences ordered by sequence", body = Vec<Occurrence>),
        (status = 404, description = "Series not found")
    )
)]
pub async fn list_occurrences(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Occurrence>>> {
    Ok(Json(state.services.series.occurrences(&ctx, id).await?))
}

/// Pause a series
#[utoipa::path(
    post,
    path = "/series/{id}/pause",
    tag = "series",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Series (template booking) ID")),
    responses(
        (status = 200, description = "Series paused", body = RecurrenceDescriptor),
        (status = 404, description = "Series not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn pause_series(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecurrenceDescriptor>> {
    Ok(Json(state.services.series.pause(&ctx, id).await?))
}

/// Resume a paused series
#[utoipa::path(
    post,
    path = "/series/{id}/resume",
    tag = "series",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Series (template booking) ID")),
    responses(
        (status = 200, description = "Series resumed", body = RecurrenceDescriptor),
        (status = 404, description = "Series not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn resume_series(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecurrenceDescriptor>> {
    Ok(Json(state.services.series.resume(&ctx, id).await?))
}

/// Cancel a series; existing occurrences are left untouched
#[utoipa::path(
    post,
    path = "/series/{id}/cancel",
    tag = "series",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Series (template booking) ID")),
    responses(
        (status = 200, description = "Series cancelled", body = RecurrenceDescriptor),
        (status = 404, description = "Series not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn cancel_series(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RecurrenceDescriptor>> {
    Ok(Json(state.services.series.cancel(&ctx, id).await?))
}
