//! Repository layer: the storage contract of the scheduling core and its backends

pub mod bookings;
pub mod equipment;
pub mod locks;
pub mod memory;
pub mod occurrences;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{pool::PoolConnection, PgConnection, Pool, Postgres};
use std::time::Duration;
use tokio::sync::MutexGuard;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Booking, BookingQuery, BookingStatus, CommittedOccurrence, DateRange, EquipmentStock,
        LineItem, Occurrence, SeriesStatus,
    },
};

/// Serialization guard returned by [`SchedulingStore::lock_equipment`] and
/// [`SchedulingStore::lock_series`]. Held across check-then-write; ended explicitly.
#[async_trait]
pub trait StoreLock: Send + Sync {
    /// Storage for the locked section. Every read and write made while the lock is
    /// held goes through it; on Postgres it runs on the transaction owning the lock.
    fn store(&self) -> &dyn SchedulingStore;

    /// Keep the section's writes and release the lock
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// Discard the section's writes where the backend can, and release the lock
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Tenant-scoped storage used by the scheduling services.
///
/// Every method takes the resolved tenant id; a row belonging to another tenant is
/// indistinguishable from a missing row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn fetch_equipment_stock(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
    ) -> AppResult<Option<EquipmentStock>>;

    async fn list_equipment(&self, tenant_id: Uuid) -> AppResult<Vec<EquipmentStock>>;

    /// Bookings in PendingInstallation or Active that hold `equipment_id` and overlap `range`
    async fn fetch_overlapping_bookings(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<Booking>>;

    /// Installed (Active) occurrences whose template holds `equipment_id`, overlapping `range`
    async fn fetch_overlapping_occurrences(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<CommittedOccurrence>>;

    async fn fetch_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Option<Booking>>;

    async fn list_bookings(&self, tenant_id: Uuid, query: &BookingQuery) -> AppResult<Vec<Booking>>;

    async fn insert_booking(&self, booking: &Booking) -> AppResult<()>;

    async fn update_booking_schedule(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        range: DateRange,
        items: &[LineItem],
    ) -> AppResult<()>;

    /// Compare-and-set on status; fails with a concurrency conflict when `from` is stale.
    /// Stamps `installed_at` on Active and `removed_at` on Completed.
    async fn update_booking_status(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn fetch_occurrence(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
    ) -> AppResult<Option<Occurrence>>;

    /// All occurrences of a series ordered by sequence
    async fn list_occurrences(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Vec<Occurrence>>;

    /// All-or-nothing insert; a duplicate (series, sequence) is a concurrency conflict
    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> AppResult<()>;

    async fn update_occurrence_status(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Compare-and-set on the series status of a template booking
    async fn update_recurrence_status(
        &self,
        tenant_id: Uuid,
        series_id: Uuid,
        from: SeriesStatus,
        to: SeriesStatus,
    ) -> AppResult<()>;

    /// Serialize writers of the given equipment types. Ids are locked in sorted order.
    async fn lock_equipment(
        &self,
        tenant_id: Uuid,
        equipment_ids: &[Uuid],
    ) -> AppResult<Box<dyn StoreLock>>;

    /// Serialize expansions and status changes of one series
    async fn lock_series(&self, tenant_id: Uuid, series_id: Uuid) -> AppResult<Box<dyn StoreLock>>;

    async fn health_check(&self) -> AppResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Postgres-backed repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    lock_timeout: Duration,
    /// Set on the view handed out by a lock: queries run on its transaction
    /// instead of borrowing another pooled connection.
    held: Option<locks::HeldTransaction>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self {
            pool,
            lock_timeout,
            held: None,
        }
    }

    /// Connection for one repository call
    pub(crate) async fn conn(&self) -> AppResult<Conn<'_>> {
        match &self.held {
            Some(tx) => Ok(Conn::Held(tx.lock().await)),
            None => Ok(Conn::Pooled(self.pool.acquire().await?)),
        }
    }
}

/// A pooled connection, or the transaction of the lock a repository view is bound to
pub(crate) enum Conn<'a> {
    Pooled(PoolConnection<Postgres>),
    Held(MutexGuard<'a, Option<sqlx::Transaction<'static, Postgres>>>),
}

impl Conn<'_> {
    pub(crate) fn get(&mut self) -> AppResult<&mut PgConnection> {
        match self {
            Conn::Pooled(conn) => Ok(&mut **conn),
            Conn::Held(guard) => (**guard)
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or_else(|| AppError::Internal("lock transaction already ended".to_string())),
        }
    }
}

#[async_trait]
impl SchedulingStore for Repository {
    async fn fetch_equipment_stock(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
    ) -> AppResult<Option<EquipmentStock>> {
        self.equipment_get(tenant_id, equipment_id).await
    }

    async fn list_equipment(&self, tenant_id: Uuid) -> AppResult<Vec<EquipmentStock>> {
        self.equipment_list(tenant_id).await
    }

    async fn fetch_overlapping_bookings(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<Booking>> {
        self.bookings_overlapping(tenant_id, equipment_id, range, exclude_id).await
    }

    async fn fetch_overlapping_occurrences(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<CommittedOccurrence>> {
        self.occurrences_committed(tenant_id, equipment_id, range).await
    }

    async fn fetch_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Option<Booking>> {
        self.bookings_get(tenant_id, booking_id).await
    }

    async fn list_bookings(&self, tenant_id: Uuid, query: &BookingQuery) -> AppResult<Vec<Booking>> {
        self.bookings_list(tenant_id, query).await
    }

    async fn insert_booking(&self, booking: &Booking) -> AppResult<()> {
        self.bookings_insert(booking).await
    }

    async fn update_booking_schedule(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        range: DateRange,
        items: &[LineItem],
    ) -> AppResult<()> {
        self.bookings_update_schedule(tenant_id, booking_id, range, items).await
    }

    async fn update_booking_status(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.bookings_update_status(tenant_id, booking_id, from, to, at).await
    }

    async fn fetch_occurrence(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
    ) -> AppResult<Option<Occurrence>> {
        self.occurrences_get(tenant_id, occurrence_id).await
    }

    async fn list_occurrences(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Vec<Occurrence>> {
        self.occurrences_list(tenant_id, booking_id).await
    }

    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> AppResult<()> {
        self.occurrences_insert(occurrences).await
    }

    async fn update_occurrence_status(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.occurrences_update_status(tenant_id, occurrence_id, from, to, at).await
    }

    async fn update_recurrence_status(
        &self,
        tenant_id: Uuid,
        series_id: Uuid,
        from: SeriesStatus,
        to: SeriesStatus,
    ) -> AppResult<()> {
        self.bookings_update_series_status(tenant_id, series_id, from, to).await
    }

    async fn lock_equipment(
        &self,
        tenant_id: Uuid,
        equipment_ids: &[Uuid],
    ) -> AppResult<Box<dyn StoreLock>> {
        let mut keys: Vec<String> = equipment_ids
            .iter()
            .map(|id| format!("equipment:{}:{}", tenant_id, id))
            .collect();
        keys.sort();
        keys.dedup();
        self.advisory_lock(&keys).await
    }

    async fn lock_series(&self, tenant_id: Uuid, series_id: Uuid) -> AppResult<Box<dyn StoreLock>> {
        self.advisory_lock(&[format!("series:{}:{}", tenant_id, series_id)]).await
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query("SELECT 1").execute(conn.get()?).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
