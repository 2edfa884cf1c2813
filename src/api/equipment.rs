//! Equipment inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{equipment::LedgerQuery, EquipmentStock, LedgerSnapshot},
};

use super::TenantUser;

/// List the tenant's equipment stock
#[utoipa::path(
    get,
    path = "/equipment",
    tag = "equipment",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Equipment list", body = Vec<EquipmentStock>)
    )
)]
pub async fn list_equipment(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
) -> AppResult<Json<Vec<EquipmentStock>>> {
    let equipment = state.services.ledger.list_equipment(&ctx).await?;
    Ok(Json(equipment))
}

/// Ledger figures for one equipment type on one day
#[utoipa::path(
    get,
    path = "/equipment/{id}/ledger",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Equipment ID"),
        LedgerQuery
    ),
    responses(
        (status = 200, description = "Ledger snapshot", body = LedgerSnapshot),
        (status = 404, description = "Equipment not found")
    )
)]
pub async fn get_ledger(
    State(state): State<crate::AppState>,
    TenantUser(ctx): TenantUser,
    Path(id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> AppResult<Json<LedgerSnapshot>> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let snapshot = state.services.ledger.snapshot(&ctx, id, date).await?;
    Ok(Json(snapshot))
}
