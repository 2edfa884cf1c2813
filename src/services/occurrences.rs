//! Occurrence lifecycle service

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{availability::AvailabilityService, check_demand, finish_locked};
use crate::{
    error::{AppError, AppResult},
    models::{
        AvailabilityResult, Booking, BookingStatus, LifecycleAction, Occurrence, TenantContext,
    },
    repository::SchedulingStore,
};

/// Outcome of an occurrence transition
#[derive(Debug, Clone, PartialEq)]
pub enum OccurrenceOutcome {
    Applied(Occurrence),
    /// Installation refused for lack of capacity; the occurrence is unchanged
    Rejected(Vec<AvailabilityResult>),
}

#[derive(Clone)]
pub struct OccurrencesService {
    store: Arc<dyn SchedulingStore>,
    availability: AvailabilityService,
}

impl OccurrencesService {
    pub fn new(store: Arc<dyn SchedulingStore>, availability: AvailabilityService) -> Self {
        Self { store, availability }
    }

    pub async fn get(&self, ctx: &TenantContext, occurrence_id: Uuid) -> AppResult<Occurrence> {
        self.store
            .fetch_occurrence(ctx.tenant_id, occurrence_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Occurrence {} not found", occurrence_id)))
    }

    /// Confirm an occurrence operationally. Pending occurrences are plans; installing
    /// one commits the template's line items over its dates, so capacity is checked
    /// under the equipment lock first.
    pub async fn install(&self, ctx: &TenantContext, occurrence_id: Uuid) -> AppResult<OccurrenceOutcome> {
        let occurrence = self.get(ctx, occurrence_id).await?;
        let to = occurrence.status.apply(LifecycleAction::Install)?;
        let template = self.template_of(ctx, &occurrence).await?;

        let demand = template.demand();
        let equipment_ids: Vec<Uuid> = demand.keys().copied().collect();

        let lock = self.store.lock_equipment(ctx.tenant_id, &equipment_ids).await?;
        let outcome = self.install_locked(lock.store(), ctx, occurrence, to, &demand).await;
        let outcome = finish_locked(lock, outcome).await;

        if matches!(outcome, Ok(OccurrenceOutcome::Applied(_))) {
            self.availability.invalidate(ctx.tenant_id, &equipment_ids).await;
        }
        outcome
    }

    async fn install_locked(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        occurrence: Occurrence,
        to: BookingStatus,
        demand: &BTreeMap<Uuid, i32>,
    ) -> AppResult<OccurrenceOutcome> {
        let results = check_demand(&self.availability, store, ctx, occurrence.range(), demand, None).await?;
        if results.iter().any(|r| !r.available) {
            tracing::warn!(
                tenant = %ctx.tenant_id,
                occurrence = %occurrence.id,
                "Installation of occurrence #{} of series {} rejected",
                occurrence.sequence,
                occurrence.booking_id
            );
            return Ok(OccurrenceOutcome::Rejected(results));
        }
        Ok(OccurrenceOutcome::Applied(apply(store, ctx, occurrence, to).await?))
    }

    pub async fn remove(&self, ctx: &TenantContext, occurrence_id: Uuid) -> AppResult<Occurrence> {
        self.release(ctx, occurrence_id, LifecycleAction::Remove).await
    }

    pub async fn cancel(&self, ctx: &TenantContext, occurrence_id: Uuid) -> AppResult<Occurrence> {
        self.release(ctx, occurrence_id, LifecycleAction::Cancel).await
    }

    /// Transitions that can only free capacity need no lock
    async fn release(
        &self,
        ctx: &TenantContext,
        occurrence_id: Uuid,
        action: LifecycleAction,
    ) -> AppResult<Occurrence> {
        let occurrence = self.get(ctx, occurrence_id).await?;
        let to = occurrence.status.apply(action)?;
        let was_installed = occurrence.status == BookingStatus::Active;
        let template = self.template_of(ctx, &occurrence).await?;

        let updated = apply(self.store.as_ref(), ctx, occurrence, to).await?;
        if was_installed {
            let equipment_ids: Vec<Uuid> = template.demand().keys().copied().collect();
            self.availability.invalidate(ctx.tenant_id, &equipment_ids).await;
        }
        Ok(updated)
    }

    async fn template_of(&self, ctx: &TenantContext, occurrence: &Occurrence) -> AppResult<Booking> {
        self.store
            .fetch_booking(ctx.tenant_id, occurrence.booking_id)
            .await?
            .ok_or_else(|| {
                AppError::DataIntegrity(format!(
                    "occurrence {} references missing booking {}",
                    occurrence.id, occurrence.booking_id
                ))
            })
    }
}

/// Compare-and-set the occurrence status and stamp the installation or removal time
async fn apply(
    store: &dyn SchedulingStore,
    ctx: &TenantContext,
    mut occurrence: Occurrence,
    to: BookingStatus,
) -> AppResult<Occurrence> {
    let from = occurrence.status;
    let now = Utc::now();
    store
        .update_occurrence_status(ctx.tenant_id, occurrence.id, from, to, now)
        .await?;

    occurrence.status = to;
    match to {
        BookingStatus::Active => occurrence.installed_at = Some(now),
        BookingStatus::Completed => occurrence.removed_at = Some(now),
        _ => {}
    }

    tracing::info!(
        tenant = %ctx.tenant_id,
        actor = %ctx.actor,
        occurrence = %occurrence.id,
        series = %occurrence.booking_id,
        "Occurrence #{} moved from {} to {}",
        occurrence.sequence,
        from,
        to
    );
    Ok(occurrence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{BookingRequest, NewBooking, RecurrenceDescriptor, RecurrenceUnit},
        repository::memory::MemoryStore,
        services::{
            bookings::Confirmation,
            test_support::{new_booking, services, stock, tenant},
            Services,
        },
    };

    fn request_over(equipment_id: Uuid, quantity: i32, occurrence: &Occurrence) -> BookingRequest {
        BookingRequest {
            equipment_id,
            quantity,
            start_date: occurrence.start_date,
            end_date: occurrence.end_date,
            exclude_booking_id: None,
        }
    }

    /// Weekly series of 2 tents over 2-day slots starting on the 1st
    async fn series_with_occurrences(services: &Services, ctx: &TenantContext, equipment_id: Uuid) -> Vec<Occurrence> {
        let mut template = new_booking(equipment_id, 2, 1, 2);
        template.recurrence = Some(RecurrenceDescriptor::new(RecurrenceUnit::Weekly, 1, None).unwrap());
        let Confirmation::Confirmed(template) = services.bookings.confirm(ctx, template).await.unwrap() else {
            panic!("template rejected");
        };
        services
            .recurrence
            .expand(ctx, template.id, Some(3))
            .await
            .unwrap()
            .generated
    }

    #[tokio::test]
    async fn test_pending_occurrences_do_not_hold_capacity() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 2, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let occurrences = series_with_occurrences(&services, &ctx, tent.id).await;
        assert_eq!(occurrences.len(), 3);

        assert!(services
            .availability
            .check(&ctx, &request_over(tent.id, 2, &occurrences[0]))
            .await
            .unwrap()
            .available);
    }

    #[tokio::test]
    async fn test_install_commits_capacity() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 3, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let occurrences = series_with_occurrences(&services, &ctx, tent.id).await;
        let first = &occurrences[0];

        let OccurrenceOutcome::Applied(installed) = services.occurrences.install(&ctx, first.id).await.unwrap() else {
            panic!("installation rejected");
        };
        assert_eq!(installed.status, BookingStatus::Active);
        assert!(installed.installed_at.is_some());

        let over_first = request_over(tent.id, 1, first);
        assert_eq!(services.availability.check(&ctx, &over_first).await.unwrap().available_quantity, 1);

        let removed = services.occurrences.remove(&ctx, first.id).await.unwrap();
        assert_eq!(removed.status, BookingStatus::Completed);
        assert_eq!(services.availability.check(&ctx, &over_first).await.unwrap().available_quantity, 3);
    }

    #[tokio::test]
    async fn test_install_rejected_when_fleet_is_taken() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 2, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let occurrences = series_with_occurrences(&services, &ctx, tent.id).await;
        let second = &occurrences[1];

        let competitor = NewBooking {
            start_date: second.start_date,
            end_date: second.end_date,
            ..new_booking(tent.id, 1, 1, 1)
        };
        assert!(matches!(
            services.bookings.confirm(&ctx, competitor).await.unwrap(),
            Confirmation::Confirmed(_)
        ));

        assert!(matches!(
            services.occurrences.install(&ctx, second.id).await.unwrap(),
            OccurrenceOutcome::Rejected(_)
        ));
        let unchanged = services.occurrences.get(&ctx, second.id).await.unwrap();
        assert_eq!(unchanged.status, BookingStatus::PendingInstallation);
    }

    #[tokio::test]
    async fn test_occurrence_state_machine_is_independent() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 4, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let occurrences = series_with_occurrences(&services, &ctx, tent.id).await;
        let cancelled = services.occurrences.cancel(&ctx, occurrences[0].id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        assert!(matches!(
            services.occurrences.install(&ctx, occurrences[0].id).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            services.occurrences.remove(&ctx, occurrences[1].id).await,
            Err(AppError::InvalidTransition(_))
        ));

        let template = services.bookings.get(&ctx, occurrences[0].booking_id).await.unwrap();
        assert_eq!(template.status, BookingStatus::PendingInstallation);
    }

    #[tokio::test]
    async fn test_unknown_occurrence() {
        let ctx = tenant();
        let services = services(Arc::new(MemoryStore::default()));
        assert!(matches!(
            services.occurrences.install(&ctx, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
