//! Recurrence expansion
//!
//! Occurrence `k` of a series starts at `anchor + k * interval` units, where the anchor
//! is the template's start date. Computing every start from the anchor keeps expansion
//! deterministic: batches of any size yield the same dates as one long pass, and a
//! month-end anchor (Jan 31) keeps clamping to each month's last day instead of
//! drifting to the 28th.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{availability::AvailabilityService, check_demand, finish_locked};
use crate::{
    config::SchedulingConfig,
    error::{AppError, AppResult},
    models::{
        AvailabilityResult, Booking, BookingStatus, Occurrence, SeriesStatus, TenantContext,
    },
    repository::SchedulingStore,
};

/// Candidates for the next batch of a series
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrencePlan {
    pub candidates: Vec<Occurrence>,
    /// No occurrence is left to generate before the series end
    pub exhausted: bool,
}

/// Result of one expansion call
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExpansionReport {
    pub series_id: Uuid,
    pub series_status: SeriesStatus,
    /// Last day an occurrence may start on
    pub series_end: Option<NaiveDate>,
    /// Occurrences created by this call, ordered by sequence
    pub generated: Vec<Occurrence>,
    /// First candidate that did not fit, when generation-time checks are enabled
    pub rejected: Vec<AvailabilityResult>,
}

/// Plan up to `max_batch` occurrences of `template`, skipping sequence numbers that
/// already exist. Gaps left by earlier batches are filled before new sequence numbers
/// past the highest existing one.
pub fn plan_occurrences(
    template: &Booking,
    existing: &BTreeSet<i32>,
    max_batch: usize,
    series_end: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<OccurrencePlan> {
    let recurrence = template.recurrence.ok_or_else(|| {
        AppError::Validation(format!("booking {} is not a recurring series", template.id))
    })?;
    recurrence.validate()?;

    let duration = u64::try_from(template.range().span_days())
        .map_err(|_| AppError::DataIntegrity(format!("booking {} ends before it starts", template.id)))?;

    let mut candidates = Vec::new();
    let mut step: u32 = 1;
    let exhausted = loop {
        let Some(start) = recurrence.step_from(template.start_date, step) else {
            break true;
        };
        if start > series_end {
            break true;
        }
        if candidates.len() == max_batch {
            break false;
        }

        let sequence = i32::try_from(step)
            .map_err(|_| AppError::Validation("series has too many occurrences".to_string()))?;
        if !existing.contains(&sequence) {
            let Some(end) = start.checked_add_days(Days::new(duration)) else {
                break true;
            };
            candidates.push(Occurrence {
                id: Uuid::new_v4(),
                tenant_id: template.tenant_id,
                booking_id: template.id,
                sequence,
                start_date: start,
                end_date: end,
                status: BookingStatus::PendingInstallation,
                installed_at: None,
                removed_at: None,
                created_at: now,
            });
        }

        step = step
            .checked_add(1)
            .ok_or_else(|| AppError::Validation("series has too many occurrences".to_string()))?;
    };

    Ok(OccurrencePlan { candidates, exhausted })
}

#[derive(Clone)]
pub struct RecurrenceService {
    store: Arc<dyn SchedulingStore>,
    availability: AvailabilityService,
    config: SchedulingConfig,
}

impl RecurrenceService {
    pub fn new(store: Arc<dyn SchedulingStore>, availability: AvailabilityService, config: SchedulingConfig) -> Self {
        Self {
            store,
            availability,
            config,
        }
    }

    /// Generate and store the next batch of occurrences of a series
    pub async fn expand(
        &self,
        ctx: &TenantContext,
        series_id: Uuid,
        batch_size: Option<usize>,
    ) -> AppResult<ExpansionReport> {
        let batch_size = batch_size.unwrap_or(self.config.default_batch_size);
        if batch_size == 0 || batch_size > self.config.max_batch_size {
            return Err(AppError::Validation(format!(
                "batch size must be between 1 and {}, got {}",
                self.config.max_batch_size, batch_size
            )));
        }

        let lock = self.store.lock_series(ctx.tenant_id, series_id).await?;
        let report = self.expand_locked(lock.store(), ctx, series_id, batch_size).await;
        finish_locked(lock, report).await
    }

    async fn expand_locked(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        series_id: Uuid,
        batch_size: usize,
    ) -> AppResult<ExpansionReport> {
        let template = store
            .fetch_booking(ctx.tenant_id, series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Series {} not found", series_id)))?;
        let recurrence = template
            .recurrence
            .ok_or_else(|| AppError::NotFound(format!("Series {} not found", series_id)))?;

        let mut report = ExpansionReport {
            series_id,
            series_status: recurrence.status,
            series_end: None,
            generated: Vec::new(),
            rejected: Vec::new(),
        };
        if recurrence.status != SeriesStatus::Active {
            tracing::debug!(series = %series_id, "Series is {:?}, nothing to expand", recurrence.status);
            return Ok(report);
        }

        let series_end = recurrence.series_end(template.end_date, self.config.default_horizon_months)?;
        report.series_end = Some(series_end);

        let existing: BTreeSet<i32> = store
            .list_occurrences(ctx.tenant_id, series_id)
            .await?
            .iter()
            .map(|o| o.sequence)
            .collect();
        let plan = plan_occurrences(&template, &existing, batch_size, series_end, Utc::now())?;

        let mut candidates = plan.candidates;
        let mut exhausted = plan.exhausted;
        if self.config.check_availability_on_expand && !candidates.is_empty() {
            let (fitting, rejected) = self.check_candidates(store, ctx, &template, candidates).await?;
            if !rejected.is_empty() {
                exhausted = false;
            }
            candidates = fitting;
            report.rejected = rejected;
        }

        if !candidates.is_empty() {
            store.insert_occurrences(&candidates).await?;
        }

        // Only an explicit end date completes a series; the default horizon just stops this batch.
        if exhausted && recurrence.end_date.is_some() {
            store
                .update_recurrence_status(ctx.tenant_id, series_id, SeriesStatus::Active, SeriesStatus::Completed)
                .await?;
            report.series_status = SeriesStatus::Completed;
        }

        tracing::info!(
            tenant = %ctx.tenant_id,
            actor = %ctx.actor,
            series = %series_id,
            generated = candidates.len(),
            status = ?report.series_status,
            "Series expanded up to {}",
            series_end
        );
        report.generated = candidates;
        Ok(report)
    }

    /// Keep candidates in order until the first one the fleet cannot serve.
    /// `store` is the series lock's view; the equipment lock is taken through it.
    async fn check_candidates(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        template: &Booking,
        candidates: Vec<Occurrence>,
    ) -> AppResult<(Vec<Occurrence>, Vec<AvailabilityResult>)> {
        let demand = template.demand();
        let equipment_ids: Vec<Uuid> = demand.keys().copied().collect();

        let lock = store.lock_equipment(ctx.tenant_id, &equipment_ids).await?;
        let outcome = self
            .fit_candidates(lock.store(), ctx, template, &demand, candidates)
            .await;
        finish_locked(lock, outcome).await
    }

    async fn fit_candidates(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        template: &Booking,
        demand: &BTreeMap<Uuid, i32>,
        candidates: Vec<Occurrence>,
    ) -> AppResult<(Vec<Occurrence>, Vec<AvailabilityResult>)> {
        let mut fitting = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in candidates {
            let results = check_demand(&self.availability, store, ctx, candidate.range(), demand, None).await?;
            if results.iter().any(|r| !r.available) {
                tracing::warn!(
                    series = %template.id,
                    "Occurrence #{} ({}) does not fit, stopping batch",
                    candidate.sequence,
                    candidate.range()
                );
                rejected = results;
                break;
            }
            fitting.push(candidate);
        }
        Ok((fitting, rejected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use crate::{
        models::{NewBooking, RecurrenceDescriptor, RecurrenceUnit, SeriesCommand},
        repository::memory::MemoryStore,
        services::{
            bookings::Confirmation,
            test_support::{new_booking, services, stock, strict_services, tenant},
            Services,
        },
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(start: NaiveDate, end: NaiveDate, recurrence: RecurrenceDescriptor) -> Booking {
        NewBooking {
            client_ref: "CRM-7".to_string(),
            start_date: start,
            end_date: end,
            items: vec![crate::models::LineItem {
                equipment_id: Uuid::new_v4(),
                quantity: 1,
            }],
            recurrence: Some(recurrence),
        }
        .into_booking(Uuid::new_v4(), Utc::now())
        .unwrap()
    }

    fn every(unit: RecurrenceUnit, interval: i32, end: Option<NaiveDate>) -> RecurrenceDescriptor {
        RecurrenceDescriptor::new(unit, interval, end).unwrap()
    }

    fn starts(plan: &OccurrencePlan) -> Vec<NaiveDate> {
        plan.candidates.iter().map(|o| o.start_date).collect()
    }

    #[test]
    fn test_biweekly_scenario() {
        let t = template(date(2025, 1, 6), date(2025, 1, 8), every(RecurrenceUnit::Weekly, 2, None));
        let end = t.recurrence.unwrap().series_end(t.end_date, 12).unwrap();
        let plan = plan_occurrences(&t, &BTreeSet::new(), 2, end, Utc::now()).unwrap();

        assert_eq!(plan.candidates.len(), 2);
        assert_eq!(plan.candidates[0].sequence, 1);
        assert_eq!(plan.candidates[0].start_date, date(2025, 1, 20));
        assert_eq!(plan.candidates[0].end_date, date(2025, 1, 22));
        assert_eq!(plan.candidates[1].start_date, date(2025, 2, 3));
        assert_eq!(plan.candidates[1].end_date, date(2025, 2, 5));
        assert!(plan.candidates.iter().all(|o| o.status == BookingStatus::PendingInstallation));
        assert!(!plan.exhausted);
    }

    #[test]
    fn test_month_end_anchor_does_not_drift() {
        let t = template(date(2024, 1, 31), date(2024, 1, 31), every(RecurrenceUnit::Monthly, 1, None));
        let plan = plan_occurrences(&t, &BTreeSet::new(), 4, date(2024, 12, 31), Utc::now()).unwrap();
        assert_eq!(
            starts(&plan),
            vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30), date(2024, 5, 31)]
        );
    }

    #[test]
    fn test_batches_match_single_pass() {
        let t = template(date(2025, 1, 31), date(2025, 2, 2), every(RecurrenceUnit::Monthly, 1, None));
        let end = date(2026, 6, 30);

        let single = plan_occurrences(&t, &BTreeSet::new(), 10, end, Utc::now()).unwrap();

        let first = plan_occurrences(&t, &BTreeSet::new(), 4, end, Utc::now()).unwrap();
        let existing: BTreeSet<i32> = first.candidates.iter().map(|o| o.sequence).collect();
        let second = plan_occurrences(&t, &existing, 6, end, Utc::now()).unwrap();

        let mut batched = starts(&first);
        batched.extend(starts(&second));
        assert_eq!(batched, starts(&single));

        let ends: Vec<NaiveDate> = single.candidates.iter().map(|o| o.end_date).collect();
        assert_eq!(ends[0], date(2025, 3, 2));
    }

    #[test]
    fn test_gaps_filled_first() {
        let t = template(date(2025, 1, 1), date(2025, 1, 1), every(RecurrenceUnit::Daily, 1, None));
        let existing: BTreeSet<i32> = [1, 2, 4].into_iter().collect();
        let plan = plan_occurrences(&t, &existing, 3, date(2025, 12, 31), Utc::now()).unwrap();
        let sequences: Vec<i32> = plan.candidates.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![3, 5, 6]);
        assert_eq!(plan.candidates[0].start_date, date(2025, 1, 4));
    }

    #[test]
    fn test_stops_at_series_end_inclusive() {
        let t = template(date(2025, 1, 1), date(2025, 1, 2), every(RecurrenceUnit::Daily, 3, None));
        let plan = plan_occurrences(&t, &BTreeSet::new(), 12, date(2025, 1, 10), Utc::now()).unwrap();
        assert_eq!(starts(&plan), vec![date(2025, 1, 4), date(2025, 1, 7), date(2025, 1, 10)]);
        assert!(plan.exhausted);
    }

    #[test]
    fn test_yearly_leap_day() {
        let t = template(date(2024, 2, 29), date(2024, 2, 29), every(RecurrenceUnit::Yearly, 1, None));
        let plan = plan_occurrences(&t, &BTreeSet::new(), 4, date(2028, 12, 31), Utc::now()).unwrap();
        assert_eq!(
            starts(&plan),
            vec![date(2025, 2, 28), date(2026, 2, 28), date(2027, 2, 28), date(2028, 2, 29)]
        );
    }

    #[test]
    fn test_invalid_interval_rejected_before_generation() {
        let mut t = template(date(2025, 1, 1), date(2025, 1, 1), every(RecurrenceUnit::Daily, 1, None));
        if let Some(r) = t.recurrence.as_mut() {
            r.interval = 0;
        }
        assert!(matches!(
            plan_occurrences(&t, &BTreeSet::new(), 3, date(2025, 2, 1), Utc::now()),
            Err(AppError::Validation(_))
        ));
    }

    async fn confirm_series(services: &Services, ctx: &TenantContext, booking: NewBooking) -> Booking {
        match services.bookings.confirm(ctx, booking).await.unwrap() {
            Confirmation::Confirmed(b) => b,
            Confirmation::Rejected(r) => panic!("template rejected: {:?}", r),
        }
    }

    #[tokio::test]
    async fn test_expand_is_idempotent_and_completes() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 3, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let mut booking = new_booking(tent.id, 1, 1, 1);
        booking.recurrence = Some(every(RecurrenceUnit::Daily, 1, Some(crate::services::test_support::day(5))));
        let series = confirm_series(&services, &ctx, booking).await;

        let first = assert_ok!(services.recurrence.expand(&ctx, series.id, Some(2)).await);
        assert_eq!(first.generated.len(), 2);
        assert_eq!(first.series_status, SeriesStatus::Active);

        let second = assert_ok!(services.recurrence.expand(&ctx, series.id, Some(10)).await);
        let sequences: Vec<i32> = second.generated.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
        assert_eq!(second.series_status, SeriesStatus::Completed);

        let third = assert_ok!(services.recurrence.expand(&ctx, series.id, None).await);
        assert!(third.generated.is_empty());

        let all = services.series.occurrences(&ctx, series.id).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_default_horizon_does_not_complete() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 3, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let mut booking = new_booking(tent.id, 1, 1, 1);
        booking.recurrence = Some(every(RecurrenceUnit::Monthly, 1, None));
        let series = confirm_series(&services, &ctx, booking).await;

        let report = services.recurrence.expand(&ctx, series.id, Some(100)).await.unwrap();
        assert_eq!(report.generated.len(), 12);
        assert_eq!(report.series_status, SeriesStatus::Active);
        assert_eq!(report.series_end, Some(date(2026, 6, 1)));
    }

    #[tokio::test]
    async fn test_paused_series_expands_to_nothing() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 3, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let mut booking = new_booking(tent.id, 1, 1, 1);
        booking.recurrence = Some(every(RecurrenceUnit::Weekly, 1, None));
        let series = confirm_series(&services, &ctx, booking).await;

        services.series.apply(&ctx, series.id, SeriesCommand::Pause).await.unwrap();
        let paused = services.recurrence.expand(&ctx, series.id, None).await.unwrap();
        assert!(paused.generated.is_empty());
        assert_eq!(paused.series_status, SeriesStatus::Paused);

        services.series.apply(&ctx, series.id, SeriesCommand::Resume).await.unwrap();
        let resumed = services.recurrence.expand(&ctx, series.id, Some(1)).await.unwrap();
        assert_eq!(resumed.generated.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_stops_at_first_misfit() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 2, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = strict_services(store);

        let mut booking = new_booking(tent.id, 2, 1, 1);
        booking.recurrence = Some(every(RecurrenceUnit::Daily, 2, None));
        let series = confirm_series(&services, &ctx, booking).await;

        // Occupies the third occurrence (day 7)
        confirm_series(&services, &ctx, new_booking(tent.id, 1, 7, 7)).await;

        let report = services.recurrence.expand(&ctx, series.id, Some(5)).await.unwrap();
        let starts: Vec<u32> = report.generated.iter().map(|o| chrono::Datelike::day(&o.start_date)).collect();
        assert_eq!(starts, vec![3, 5]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].start_date, crate::services::test_support::day(7));
    }

    #[tokio::test]
    async fn test_batch_size_bounds() {
        let ctx = tenant();
        let services = services(Arc::new(MemoryStore::default()));
        assert!(matches!(
            services.recurrence.expand(&ctx, Uuid::new_v4(), Some(0)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            services.recurrence.expand(&ctx, Uuid::new_v4(), Some(10_000)).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            services.recurrence.expand(&ctx, Uuid::new_v4(), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_booking_is_not_a_series() {
        let ctx = tenant();
        let store = Arc::new(MemoryStore::default());
        let tent = stock(&ctx, "Tent", 3, 0, 0);
        store.put_equipment(tent.clone()).await;
        let services = services(store);

        let plain = confirm_series(&services, &ctx, new_booking(tent.id, 1, 1, 1)).await;
        assert!(matches!(
            services.recurrence.expand(&ctx, plain.id, None).await,
            Err(AppError::NotFound(_))
        ));
    }
}
