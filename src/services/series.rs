//! Recurrence series controller

use std::sync::Arc;

use uuid::Uuid;

use super::finish_locked;
use crate::{
    error::{AppError, AppResult},
    models::{Booking, Occurrence, RecurrenceDescriptor, SeriesCommand, TenantContext},
    repository::SchedulingStore,
};

#[derive(Clone)]
pub struct SeriesService {
    store: Arc<dyn SchedulingStore>,
}

impl SeriesService {
    pub fn new(store: Arc<dyn SchedulingStore>) -> Self {
        Self { store }
    }

    /// Template booking and its recurrence descriptor
    pub async fn get(&self, ctx: &TenantContext, series_id: Uuid) -> AppResult<(Booking, RecurrenceDescriptor)> {
        find_series(self.store.as_ref(), ctx, series_id).await
    }

    pub async fn occurrences(&self, ctx: &TenantContext, series_id: Uuid) -> AppResult<Vec<Occurrence>> {
        self.get(ctx, series_id).await?;
        self.store.list_occurrences(ctx.tenant_id, series_id).await
    }

    /// Change the series status only. Existing occurrences keep their own status.
    /// Runs under the series lock, so it never interleaves with an expansion.
    pub async fn apply(
        &self,
        ctx: &TenantContext,
        series_id: Uuid,
        command: SeriesCommand,
    ) -> AppResult<RecurrenceDescriptor> {
        let lock = self.store.lock_series(ctx.tenant_id, series_id).await?;
        let outcome = apply_locked(lock.store(), ctx, series_id, command).await;
        finish_locked(lock, outcome).await
    }

    pub async fn pause(&self, ctx: &TenantContext, series_id: Uuid) -> AppResult<RecurrenceDescriptor> {
        self.apply(ctx, series_id, SeriesCommand::Pause).await
    }

    pub async fn resume(&self, ctx: &TenantContext, series_id: Uuid) -> AppResult<RecurrenceDescriptor> {
        self.apply(ctx, series_id, SeriesCommand::Resume).await
    }

    pub async fn cancel(&self, ctx: &TenantContext, series_id: Uuid) -> AppResult<RecurrenceDescriptor> {
        self.apply(ctx, series_id, SeriesCommand::Cancel).await
    }
}

async fn find_series(
    store: &dyn SchedulingStore,
    ctx: &TenantContext,
    series_id: Uuid,
) -> AppResult<(Booking, RecurrenceDescriptor)> {
    let template = store
        .fetch_booking(ctx.tenant_id, series_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Series {} not found", series_id)))?;
    let recurrence = template
        .recurrence
        .ok_or_else(|| AppError::NotFound(format!("Series {} not found", series_id)))?;
    Ok((template, recurrence))
}

async fn apply_locked(
    store: &dyn SchedulingStore,
    ctx: &TenantContext,
    series_id: Uuid,
    command: SeriesCommand,
) -> AppResult<RecurrenceDescriptor> {
    let (_, mut recurrence) = find_series(store, ctx, series_id).await?;
    let from = recurrence.status;
    let to = from.apply(command)?;

    store
        .update_recurrence_status(ctx.tenant_id, series_id, from, to)
        .await?;
    recurrence.status = to;

    tracing::info!(
        tenant = %ctx.tenant_id,
        actor = %ctx.actor,
        series = %series_id,
        "Series moved from {:?} to {:?}",
        from,
        to
    );
    Ok(recurrence)
}
