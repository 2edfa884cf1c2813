//! Business logic services

pub mod availability;
pub mod bookings;
pub mod cache;
pub mod ledger;
pub mod occurrences;
pub mod recurrence;
pub mod series;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::{CacheConfig, SchedulingConfig},
    error::AppResult,
    models::{AvailabilityResult, BookingRequest, DateRange, TenantContext},
    repository::{SchedulingStore, StoreLock},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn SchedulingStore>,
    pub availability: availability::AvailabilityService,
    pub bookings: bookings::BookingsService,
    pub occurrences: occurrences::OccurrencesService,
    pub recurrence: recurrence::RecurrenceService,
    pub series: series::SeriesService,
    pub ledger: ledger::LedgerService,
}

impl Services {
    /// Create all services on top of one storage backend
    pub fn new(store: Arc<dyn SchedulingStore>, scheduling: SchedulingConfig, cache: &CacheConfig) -> Self {
        let cache = cache
            .enabled
            .then(|| Arc::new(cache::AvailabilityCache::new(cache.max_entries)));
        let availability = availability::AvailabilityService::new(store.clone(), cache);

        Self {
            availability: availability.clone(),
            bookings: bookings::BookingsService::new(store.clone(), availability.clone()),
            occurrences: occurrences::OccurrencesService::new(store.clone(), availability.clone()),
            recurrence: recurrence::RecurrenceService::new(store.clone(), availability, scheduling),
            series: series::SeriesService::new(store.clone()),
            ledger: ledger::LedgerService::new(store.clone()),
            store,
        }
    }
}

/// End a locked section: commit when it succeeded, roll back when it failed.
/// A failed commit is returned because the section's writes may be lost; a failed
/// rollback is only logged since the section's own error is the one to report.
pub(crate) async fn finish_locked<T>(lock: Box<dyn StoreLock>, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            lock.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = lock.rollback().await {
                tracing::warn!("Failed to roll back locked section: {}", rollback);
            }
            Err(e)
        }
    }
}

/// Check every equipment type of a demand over one range, bypassing the cache.
/// `store` is the view of the equipment lock held by the caller.
pub(crate) async fn check_demand(
    availability: &availability::AvailabilityService,
    store: &dyn SchedulingStore,
    ctx: &TenantContext,
    range: DateRange,
    demand: &BTreeMap<Uuid, i32>,
    exclude_booking_id: Option<Uuid>,
) -> AppResult<Vec<AvailabilityResult>> {
    let mut results = Vec::with_capacity(demand.len());
    for (equipment_id, quantity) in demand {
        let request = BookingRequest {
            equipment_id: *equipment_id,
            quantity: *quantity,
            start_date: range.start,
            end_date: range.end,
            exclude_booking_id,
        };
        results.push(availability.check_in(store, ctx, &request).await?);
    }
    Ok(results)
}
