//! Booking lifecycle service

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::{availability::AvailabilityService, check_demand, finish_locked};
use crate::{
    error::{AppError, AppResult},
    models::{
        booking::{demand_of, validate_items},
        AvailabilityResult, Booking, BookingQuery, BookingStatus, DateRange, LifecycleAction,
        LineItem, NewBooking, TenantContext,
    },
    repository::SchedulingStore,
};

/// Outcome of a write that needed capacity
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Confirmed(Booking),
    /// Nothing was written; one result per equipment type, at least one unavailable
    Rejected(Vec<AvailabilityResult>),
}

/// New dates and, optionally, new line items for a pending booking
#[derive(Debug, Clone)]
pub struct ScheduleChange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub items: Option<Vec<LineItem>>,
}

#[derive(Clone)]
pub struct BookingsService {
    store: Arc<dyn SchedulingStore>,
    availability: AvailabilityService,
}

impl BookingsService {
    pub fn new(store: Arc<dyn SchedulingStore>, availability: AvailabilityService) -> Self {
        Self { store, availability }
    }

    /// Check every line item and insert the booking under the equipment lock
    pub async fn confirm(&self, ctx: &TenantContext, new_booking: NewBooking) -> AppResult<Confirmation> {
        let booking = new_booking.into_booking(ctx.tenant_id, Utc::now())?;
        let demand = booking.demand();
        let equipment_ids: Vec<Uuid> = demand.keys().copied().collect();

        let lock = self.store.lock_equipment(ctx.tenant_id, &equipment_ids).await?;
        let outcome = self.confirm_locked(lock.store(), ctx, booking, &demand).await;
        let outcome = finish_locked(lock, outcome).await;

        if matches!(outcome, Ok(Confirmation::Confirmed(_))) {
            self.availability.invalidate(ctx.tenant_id, &equipment_ids).await;
        }
        outcome
    }

    async fn confirm_locked(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        booking: Booking,
        demand: &BTreeMap<Uuid, i32>,
    ) -> AppResult<Confirmation> {
        let results = check_demand(&self.availability, store, ctx, booking.range(), demand, None).await?;
        if results.iter().any(|r| !r.available) {
            for result in results.iter().filter(|r| !r.available) {
                tracing::warn!(tenant = %ctx.tenant_id, "Booking rejected: {}", result.message());
            }
            return Ok(Confirmation::Rejected(results));
        }

        store.insert_booking(&booking).await?;
        tracing::info!(
            tenant = %ctx.tenant_id,
            actor = %ctx.actor,
            booking = %booking.id,
            recurring = booking.is_series_template(),
            "Booking confirmed for {} ({} line item(s))",
            booking.range(),
            booking.items.len()
        );
        Ok(Confirmation::Confirmed(booking))
    }

    /// Move a pending booking to new dates, re-checking capacity without counting
    /// the booking against itself
    pub async fn reschedule(
        &self,
        ctx: &TenantContext,
        booking_id: Uuid,
        change: ScheduleChange,
    ) -> AppResult<Confirmation> {
        let booking = self.get(ctx, booking_id).await?;
        if booking.status != BookingStatus::PendingInstallation {
            return Err(AppError::InvalidTransition(format!(
                "booking {} is {} and can no longer be rescheduled",
                booking_id, booking.status
            )));
        }

        let range = DateRange::new(change.start_date, change.end_date)?;
        let items = change.items.unwrap_or_else(|| booking.items.clone());
        validate_items(&items)?;

        if let Some(recurrence) = &booking.recurrence {
            if !self.store.list_occurrences(ctx.tenant_id, booking_id).await?.is_empty() {
                return Err(AppError::InvalidTransition(format!(
                    "series {} already has occurrences anchored on its dates",
                    booking_id
                )));
            }
            if recurrence.end_date.is_some_and(|end| end < range.start) {
                return Err(AppError::Validation(format!(
                    "series end date is before the new start {}",
                    range.start
                )));
            }
        }

        let demand = demand_of(&items);
        let mut equipment_ids: Vec<Uuid> = demand.keys().copied().collect();
        equipment_ids.extend(booking.demand().keys().copied());
        equipment_ids.sort();
        equipment_ids.dedup();

        let lock = self.store.lock_equipment(ctx.tenant_id, &equipment_ids).await?;
        let outcome = self
            .reschedule_locked(lock.store(), ctx, booking_id, range, &items, &demand)
            .await;
        let outcome = finish_locked(lock, outcome).await;

        if matches!(outcome, Ok(Confirmation::Confirmed(_))) {
            self.availability.invalidate(ctx.tenant_id, &equipment_ids).await;
        }
        outcome
    }

    async fn reschedule_locked(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        booking_id: Uuid,
        range: DateRange,
        items: &[LineItem],
        demand: &BTreeMap<Uuid, i32>,
    ) -> AppResult<Confirmation> {
        let results = check_demand(&self.availability, store, ctx, range, demand, Some(booking_id)).await?;
        if results.iter().any(|r| !r.available) {
            tracing::warn!(
                tenant = %ctx.tenant_id,
                booking = %booking_id,
                "Reschedule to {} rejected",
                range
            );
            return Ok(Confirmation::Rejected(results));
        }

        store
            .update_booking_schedule(ctx.tenant_id, booking_id, range, items)
            .await?;
        tracing::info!(
            tenant = %ctx.tenant_id,
            actor = %ctx.actor,
            booking = %booking_id,
            "Booking rescheduled to {}",
            range
        );
        let booking = store
            .fetch_booking(ctx.tenant_id, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))?;
        Ok(Confirmation::Confirmed(booking))
    }

    pub async fn get(&self, ctx: &TenantContext, booking_id: Uuid) -> AppResult<Booking> {
        self.store
            .fetch_booking(ctx.tenant_id, booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", booking_id)))
    }

    pub async fn list(&self, ctx: &TenantContext, query: &BookingQuery) -> AppResult<Vec<Booking>> {
        query.range()?;
        self.store.list_bookings(ctx.tenant_id, query).await
    }

    pub async fn install(&self, ctx: &TenantContext, booking_id: Uuid) -> AppResult<Booking> {
        self.transition(ctx, booking_id, LifecycleAction::Install).await
    }

    pub async fn remove(&self, ctx: &TenantContext, booking_id: Uuid) -> AppResult<Booking> {
        self.transition(ctx, booking_id, LifecycleAction::Remove).await
    }

    pub async fn cancel(&self, ctx: &TenantContext, booking_id: Uuid) -> AppResult<Booking> {
        self.transition(ctx, booking_id, LifecycleAction::Cancel).await
    }

    /// Apply an operator action. The write is a compare-and-set on the status read
    /// here, so a concurrent transition surfaces as a conflict.
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        booking_id: Uuid,
        action: LifecycleAction,
    ) -> AppResult<Booking> {
        let mut booking = self.get(ctx, booking_id).await?;
        let from = booking.status;
        let to = from.apply(action)?;
        let now = Utc::now();

        self.store
            .update_booking_status(ctx.tenant_id, booking_id, from, to, now)
            .await?;

        booking.status = to;
        match to {
            BookingStatus::Active => booking.installed_at = Some(now),
            BookingStatus::Completed => booking.removed_at = Some(now),
            _ => {}
        }

        let equipment_ids: Vec<Uuid> = booking.demand().keys().copied().collect();
        self.availability.invalidate(ctx.tenant_id, &equipment_ids).await;

        tracing::info!(
            tenant = %ctx.tenant_id,
            actor = %ctx.actor,
            booking = %booking_id,
            "Booking moved from {} to {}",
            from,
            to
        );
        Ok(booking)
    }
}
