//! Equipment stock queries on Repository

use uuid::Uuid;

use super::Repository;
use crate::{error::AppResult, models::equipment::EquipmentStock};

impl Repository {
    /// List a tenant's equipment
    pub async fn equipment_list(&self, tenant_id: Uuid) -> AppResult<Vec<EquipmentStock>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, EquipmentStock>(
            "SELECT * FROM equipment_stock WHERE tenant_id = $1 ORDER BY name",
        )
        .bind(tenant_id)
        .fetch_all(conn.get()?)
        .await?;
        Ok(rows)
    }

    /// Get equipment by ID
    pub async fn equipment_get(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
    ) -> AppResult<Option<EquipmentStock>> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, EquipmentStock>(
            "SELECT * FROM equipment_stock WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(equipment_id)
        .fetch_optional(conn.get()?)
        .await?;
        Ok(row)
    }
}
