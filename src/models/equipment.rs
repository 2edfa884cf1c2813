//! Equipment stock (inventory ledger) model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// One equipment type owned by a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EquipmentStock {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    /// Units owned
    pub total_quantity: i32,
    /// Units out on rentals, maintained by the inventory module
    pub rented_quantity: i32,
    /// Units in the workshop
    pub maintenance_quantity: i32,
    pub crea_date: Option<DateTime<Utc>>,
    pub modif_date: Option<DateTime<Utc>>,
}

impl EquipmentStock {
    /// Fleet-wide ceiling, independent of dates: `total - rented - maintenance`
    pub fn base_available(&self) -> AppResult<i32> {
        self.check_integrity()?;
        Ok(self.total_quantity - self.rented_quantity - self.maintenance_quantity)
    }

    pub fn check_integrity(&self) -> AppResult<()> {
        let negative = self.total_quantity < 0 || self.rented_quantity < 0 || self.maintenance_quantity < 0;
        let held = self.rented_quantity.checked_add(self.maintenance_quantity);
        if negative || held.map_or(true, |held| held > self.total_quantity) {
            return Err(AppError::DataIntegrity(format!(
                "equipment {} ({}) has total={} rented={} maintenance={}",
                self.name, self.id, self.total_quantity, self.rented_quantity, self.maintenance_quantity
            )));
        }
        Ok(())
    }
}

/// Ledger figures for one equipment type on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LedgerSnapshot {
    pub equipment_id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub total_quantity: i32,
    pub maintenance_quantity: i32,
    /// Counter as stored by the inventory module
    pub stored_rented_quantity: i32,
    /// Units held by installed bookings and occurrences covering `date`
    pub derived_rented_quantity: i32,
    /// Units held by pending or installed commitments covering `date`
    pub committed_quantity: i32,
    /// `stored - derived`; non-zero means the counter has drifted
    pub drift: i32,
    /// `total - maintenance - committed`
    pub free_quantity: i32,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LedgerQuery {
    /// Day to report on (YYYY-MM-DD); defaults to today
    pub date: Option<NaiveDate>,
}
