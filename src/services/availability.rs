//! Availability calculator

use std::sync::Arc;

use uuid::Uuid;

use super::cache::{AvailabilityCache, CacheKey, CachedAvailability};
use crate::{
    error::AppResult,
    models::{
        AvailabilityResult, Booking, BookingRequest, CommittedOccurrence, DateRange, TenantContext,
        UnavailableReason,
    },
    repository::SchedulingStore,
};

#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    cache: Option<Arc<AvailabilityCache>>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn SchedulingStore>, cache: Option<Arc<AvailabilityCache>>) -> Self {
        Self { store, cache }
    }

    /// Answer an availability question, through the cache when one is configured.
    /// Not for use inside check-then-confirm; locked sections call [`Self::check_in`].
    pub async fn check(&self, ctx: &TenantContext, request: &BookingRequest) -> AppResult<AvailabilityResult> {
        let range = request.validate()?;
        let Some(cache) = &self.cache else {
            return self.check_uncached(ctx, request).await;
        };

        let key = CacheKey {
            tenant_id: ctx.tenant_id,
            equipment_id: request.equipment_id,
            range,
            exclude_booking_id: request.exclude_booking_id,
        };
        if let Some(hit) = cache.get(&key).await {
            return Ok(evaluate(request, hit));
        }

        let generation = cache.generation(ctx.tenant_id, request.equipment_id).await;
        let computed = compute(
            self.store.as_ref(),
            ctx,
            request.equipment_id,
            range,
            request.exclude_booking_id,
        )
        .await?;
        cache.insert(key, generation, computed.clone()).await;
        Ok(evaluate(request, computed))
    }

    /// Read straight from storage
    pub async fn check_uncached(
        &self,
        ctx: &TenantContext,
        request: &BookingRequest,
    ) -> AppResult<AvailabilityResult> {
        self.check_in(self.store.as_ref(), ctx, request).await
    }

    /// Uncached check against `store`. Callers holding an equipment lock pass the
    /// lock's view so the check reads inside the locked section.
    pub(crate) async fn check_in(
        &self,
        store: &dyn SchedulingStore,
        ctx: &TenantContext,
        request: &BookingRequest,
    ) -> AppResult<AvailabilityResult> {
        let range = request.validate()?;
        let computed = compute(store, ctx, request.equipment_id, range, request.exclude_booking_id).await?;
        let result = evaluate(request, computed);
        tracing::debug!(
            tenant = %ctx.tenant_id,
            equipment = %request.equipment_id,
            available = result.available,
            available_quantity = result.available_quantity,
            "Availability checked for {}",
            range
        );
        Ok(result)
    }

    /// Drop cached answers after a write touching these equipment types
    pub async fn invalidate(&self, tenant_id: Uuid, equipment_ids: &[Uuid]) {
        if let Some(cache) = &self.cache {
            cache.invalidate(tenant_id, equipment_ids).await;
        }
    }
}

async fn compute(
    store: &dyn SchedulingStore,
    ctx: &TenantContext,
    equipment_id: Uuid,
    range: DateRange,
    exclude_booking_id: Option<Uuid>,
) -> AppResult<CachedAvailability> {
    let Some(stock) = store.fetch_equipment_stock(ctx.tenant_id, equipment_id).await? else {
        return Ok(CachedAvailability {
            equipment_name: None,
            available_quantity: None,
        });
    };

    let base = stock.base_available()?;
    let bookings = store
        .fetch_overlapping_bookings(ctx.tenant_id, equipment_id, range, exclude_booking_id)
        .await?;
    let occurrences = store
        .fetch_overlapping_occurrences(ctx.tenant_id, equipment_id, range)
        .await?;

    Ok(CachedAvailability {
        equipment_name: Some(stock.name),
        available_quantity: Some(available_quantity(
            base,
            equipment_id,
            range,
            exclude_booking_id,
            &bookings,
            &occurrences,
        )),
    })
}

/// `base - committed`, where committed sums every pending or installed booking and every
/// installed occurrence holding `equipment_id` on a day inside `range` (inclusive bounds).
pub fn available_quantity(
    base: i32,
    equipment_id: Uuid,
    range: DateRange,
    exclude_booking_id: Option<Uuid>,
    bookings: &[Booking],
    occurrences: &[CommittedOccurrence],
) -> i32 {
    let overlapping: Vec<&Booking> = bookings
        .iter()
        .filter(|b| b.status.holds_capacity())
        .filter(|b| Some(b.id) != exclude_booking_id)
        .filter(|b| b.range().overlaps(&range))
        .collect();
    let installed: Vec<&CommittedOccurrence> = occurrences
        .iter()
        .filter(|o| DateRange { start: o.start_date, end: o.end_date }.overlaps(&range))
        .collect();

    if overlapping.is_empty() && installed.is_empty() {
        return base;
    }

    let committed = overlapping
        .iter()
        .map(|b| b.quantity_of(equipment_id))
        .chain(installed.iter().map(|o| o.quantity))
        .fold(0, |total: i32, quantity| total.saturating_add(quantity));
    base.saturating_sub(committed)
}

fn evaluate(request: &BookingRequest, computed: CachedAvailability) -> AvailabilityResult {
    let (available, available_quantity, reason) = match computed.available_quantity {
        None => (false, 0, Some(UnavailableReason::EquipmentNotFound)),
        Some(quantity) if quantity >= request.quantity => (true, quantity, None),
        Some(quantity) => (false, quantity, Some(UnavailableReason::InsufficientQuantity)),
    };

    AvailabilityResult {
        equipment_id: request.equipment_id,
        equipment_name: computed.equipment_name,
        start_date: request.start_date,
        end_date: request.end_date,
        available,
        available_quantity,
        required_quantity: request.quantity,
        reason,
    }
}
