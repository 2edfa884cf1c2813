//! In-memory implementation of the scheduling store.
//!
//! State lives in `HashMap`s behind a `tokio::sync::RwLock`; nothing survives a restart.
//! Used for local development (`storage.backend = "memory"`) and by the test suites.
//! Equipment and series locks are per-key async mutexes, so serialization only holds
//! within one process. Writes apply immediately; rolling back a locked section only
//! releases its lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{SchedulingStore, StoreLock};
use crate::{
    error::{AppError, AppResult},
    models::{
        Booking, BookingQuery, BookingStatus, CommittedOccurrence, DateRange, EquipmentStock,
        LineItem, Occurrence, SeriesStatus,
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    equipment: HashMap<(Uuid, Uuid), EquipmentStock>,
    bookings: HashMap<Uuid, Booking>,
    occurrences: HashMap<Uuid, Occurrence>,
}

impl MemoryState {
    fn booking_mut(&mut self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<&mut Booking> {
        self.bookings
            .get_mut(&booking_id)
            .filter(|b| b.tenant_id == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))
    }
}

/// Clones share state and locks
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    lock_timeout: Duration,
}

struct KeyedLock {
    store: MemoryStore,
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[async_trait]
impl StoreLock for KeyedLock {
    fn store(&self) -> &dyn SchedulingStore {
        &self.store
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        drop(self);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        drop(self);
        Ok(())
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Create or replace an equipment stock row
    pub async fn put_equipment(&self, stock: EquipmentStock) {
        let mut state = self.state.write().await;
        state.equipment.insert((stock.tenant_id, stock.id), stock);
    }

    async fn acquire(&self, mut keys: Vec<String>) -> AppResult<Box<dyn StoreLock>> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let mutex = {
                let mut locks = self.locks.lock().await;
                locks.entry(key.clone()).or_default().clone()
            };
            let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
                .await
                .map_err(|_| AppError::ConcurrencyConflict(format!("timed out waiting for {}", key)))?;
            guards.push(guard);
        }
        Ok(Box::new(KeyedLock {
            store: self.clone(),
            _guards: guards,
        }))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl SchedulingStore for MemoryStore {
    async fn fetch_equipment_stock(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
    ) -> AppResult<Option<EquipmentStock>> {
        let state = self.state.read().await;
        Ok(state.equipment.get(&(tenant_id, equipment_id)).cloned())
    }

    async fn list_equipment(&self, tenant_id: Uuid) -> AppResult<Vec<EquipmentStock>> {
        let state = self.state.read().await;
        let mut rows: Vec<EquipmentStock> = state
            .equipment
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn fetch_overlapping_bookings(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut rows: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .filter(|b| b.status.holds_capacity())
            .filter(|b| Some(b.id) != exclude_id)
            .filter(|b| b.quantity_of(equipment_id) > 0)
            .filter(|b| b.range().overlaps(&range))
            .cloned()
            .collect();
        rows.sort_by_key(|b| (b.start_date, b.id));
        Ok(rows)
    }

    async fn fetch_overlapping_occurrences(
        &self,
        tenant_id: Uuid,
        equipment_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<CommittedOccurrence>> {
        let state = self.state.read().await;
        let mut rows: Vec<CommittedOccurrence> = state
            .occurrences
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.status == BookingStatus::Active)
            .filter(|o| o.range().overlaps(&range))
            .filter_map(|o| {
                let quantity = state.bookings.get(&o.booking_id)?.quantity_of(equipment_id);
                (quantity > 0).then(|| CommittedOccurrence {
                    occurrence_id: o.id,
                    booking_id: o.booking_id,
                    start_date: o.start_date,
                    end_date: o.end_date,
                    quantity,
                })
            })
            .collect();
        rows.sort_by_key(|o| (o.start_date, o.occurrence_id));
        Ok(rows)
    }

    async fn fetch_booking(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .get(&booking_id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_bookings(&self, tenant_id: Uuid, query: &BookingQuery) -> AppResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut rows = Vec::new();
        for booking in state.bookings.values().filter(|b| b.tenant_id == tenant_id) {
            if query.matches(booking)? {
                rows.push(booking.clone());
            }
        }
        rows.sort_by_key(|b| (b.start_date, b.id));
        Ok(rows)
    }

    async fn insert_booking(&self, booking: &Booking) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.bookings.contains_key(&booking.id) {
            return Err(AppError::ConcurrencyConflict(format!(
                "booking {} already exists",
                booking.id
            )));
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking_schedule(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        range: DateRange,
        items: &[LineItem],
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(tenant_id, booking_id)?;
        if booking.status != BookingStatus::PendingInstallation {
            return Err(AppError::ConcurrencyConflict(format!(
                "booking {} is no longer pending installation",
                booking_id
            )));
        }
        booking.start_date = range.start;
        booking.end_date = range.end;
        booking.items = items.to_vec();
        Ok(())
    }

    async fn update_booking_status(
        &self,
        tenant_id: Uuid,
        booking_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(tenant_id, booking_id)?;
        if booking.status != from {
            return Err(AppError::ConcurrencyConflict(format!(
                "booking {} changed status concurrently",
                booking_id
            )));
        }
        booking.status = to;
        match to {
            BookingStatus::Active => booking.installed_at = Some(at),
            BookingStatus::Completed => booking.removed_at = Some(at),
            _ => {}
        }
        Ok(())
    }

    async fn fetch_occurrence(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
    ) -> AppResult<Option<Occurrence>> {
        let state = self.state.read().await;
        Ok(state
            .occurrences
            .get(&occurrence_id)
            .filter(|o| o.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_occurrences(&self, tenant_id: Uuid, booking_id: Uuid) -> AppResult<Vec<Occurrence>> {
        let state = self.state.read().await;
        let mut rows: Vec<Occurrence> = state
            .occurrences
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by_key(|o| o.sequence);
        Ok(rows)
    }

    async fn insert_occurrences(&self, occurrences: &[Occurrence]) -> AppResult<()> {
        let mut state = self.state.write().await;
        for occurrence in occurrences {
            let duplicate = state.occurrences.values().any(|o| {
                o.booking_id == occurrence.booking_id && o.sequence == occurrence.sequence
            });
            if duplicate {
                return Err(AppError::ConcurrencyConflict(format!(
                    "occurrence #{} of series {} already exists",
                    occurrence.sequence, occurrence.booking_id
                )));
            }
        }
        for occurrence in occurrences {
            state.occurrences.insert(occurrence.id, occurrence.clone());
        }
        Ok(())
    }

    async fn update_occurrence_status(
        &self,
        tenant_id: Uuid,
        occurrence_id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let occurrence = state
            .occurrences
            .get_mut(&occurrence_id)
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("Occurrence {} not found", occurrence_id)))?;
        if occurrence.status != from {
            return Err(AppError::ConcurrencyConflict(format!(
                "occurrence {} changed status concurrently",
                occurrence_id
            )));
        }
        occurrence.status = to;
        match to {
            BookingStatus::Active => occurrence.installed_at = Some(at),
            BookingStatus::Completed => occurrence.removed_at = Some(at),
            _ => {}
        }
        Ok(())
    }

    async fn update_recurrence_status(
        &self,
        tenant_id: Uuid,
        series_id: Uuid,
        from: SeriesStatus,
        to: SeriesStatus,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let booking = state.booking_mut(tenant_id, series_id)?;
        match booking.recurrence.as_mut() {
            Some(recurrence) if recurrence.status == from => {
                recurrence.status = to;
                Ok(())
            }
            Some(_) => Err(AppError::ConcurrencyConflict(format!(
                "series {} changed status concurrently",
                series_id
            ))),
            None => Err(AppError::NotFound(format!("Series {} not found", series_id))),
        }
    }

    async fn lock_equipment(
        &self,
        tenant_id: Uuid,
        equipment_ids: &[Uuid],
    ) -> AppResult<Box<dyn StoreLock>> {
        let keys = equipment_ids
            .iter()
            .map(|id| format!("equipment:{}:{}", tenant_id, id))
            .collect();
        self.acquire(keys).await
    }

    async fn lock_series(&self, tenant_id: Uuid, series_id: Uuid) -> AppResult<Box<dyn StoreLock>> {
        self.acquire(vec![format!("series:{}:{}", tenant_id, series_id)]).await
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
