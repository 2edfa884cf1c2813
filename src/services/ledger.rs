//! Inventory ledger

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{BookingStatus, DateRange, EquipmentStock, LedgerSnapshot, TenantContext},
    repository::SchedulingStore,
};

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn SchedulingStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    pub async fn list_equipment(&self, ctx: &TenantContext) -> AppResult<Vec<EquipmentStock>> {
        self.store.list_equipment(ctx.tenant_id).await
    }

    /// Stored counters next to the figures derived from commitments on `date`.
    /// A non-zero drift is logged; it does not fail the call.
    pub async fn snapshot(
        &self,
        ctx: &TenantContext,
        equipment_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<LedgerSnapshot> {
        let stock = self
            .store
            .fetch_equipment_stock(ctx.tenant_id, equipment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Equipment {} not found", equipment_id)))?;
        stock.check_integrity()?;

        let day = DateRange::single_day(date);
        let bookings = self
            .store
            .fetch_overlapping_bookings(ctx.tenant_id, equipment_id, day, None)
            .await?;
        let occurrences = self
            .store
            .fetch_overlapping_occurrences(ctx.tenant_id, equipment_id, day)
            .await?;

        let overflow = || AppError::DataIntegrity(format!("commitments on {} overflow", stock.name));
        let installed = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Active)
            .map(|b| b.quantity_of(equipment_id))
            .chain(occurrences.iter().map(|o| o.quantity));
        let derived = checked_total(installed).ok_or_else(overflow)?;
        let pending = checked_total(
            bookings
                .iter()
                .filter(|b| b.status == BookingStatus::PendingInstallation)
                .map(|b| b.quantity_of(equipment_id)),
        )
        .ok_or_else(overflow)?;
        let committed = derived.checked_add(pending).ok_or_else(overflow)?;
        let free = stock
            .total_quantity
            .checked_sub(stock.maintenance_quantity)
            .and_then(|q| q.checked_sub(committed))
            .ok_or_else(overflow)?;

        let snapshot = LedgerSnapshot {
            equipment_id,
            name: stock.name.clone(),
            date,
            total_quantity: stock.total_quantity,
            maintenance_quantity: stock.maintenance_quantity,
            stored_rented_quantity: stock.rented_quantity,
            derived_rented_quantity: derived,
            committed_quantity: committed,
            drift: stock.rented_quantity.checked_sub(derived).ok_or_else(overflow)?,
            free_quantity: free,
        };

        if snapshot.drift != 0 {
            tracing::warn!(
                tenant = %ctx.tenant_id,
                equipment = %equipment_id,
                "Rented counter of {} is {} but installed commitments on {} hold {}",
                snapshot.name,
                snapshot.stored_rented_quantity,
                date,
                derived
            );
        }
        Ok(snapshot)
    }
}

fn checked_total(mut quantities: impl Iterator<Item = i32>) -> Option<i32> {
    quantities.try_fold(0i32, |total, quantity| total.checked_add(quantity))
}
