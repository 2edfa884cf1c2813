//! Recurrence descriptor and calendar stepping

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::{RecurrenceUnit, SeriesStatus};
use crate::error::{AppError, AppResult};

/// Recurrence attached to a template booking. The series id is the template booking id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurrenceDescriptor {
    pub unit: RecurrenceUnit,
    /// Every `interval` units
    pub interval: i32,
    /// Last day an occurrence may start on; defaults to a horizon after the template
    pub end_date: Option<NaiveDate>,
    pub status: SeriesStatus,
}

impl RecurrenceDescriptor {
    pub fn new(unit: RecurrenceUnit, interval: i32, end_date: Option<NaiveDate>) -> AppResult<Self> {
        let descriptor = Self {
            unit,
            interval,
            end_date,
            status: SeriesStatus::Active,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.interval <= 0 {
            return Err(AppError::Validation(format!(
                "recurrence interval must be positive, got {}",
                self.interval
            )));
        }
        Ok(())
    }

    /// Start date of the `step`-th occurrence, computed from the anchor rather than
    /// from the previous occurrence so month-end clamping never drifts.
    /// `None` when the date falls outside the calendar.
    pub fn step_from(&self, anchor: NaiveDate, step: u32) -> Option<NaiveDate> {
        let interval = u32::try_from(self.interval).ok()?;
        let n = interval.checked_mul(step)?;
        match self.unit {
            RecurrenceUnit::Daily => anchor.checked_add_days(Days::new(u64::from(n))),
            RecurrenceUnit::Weekly => anchor.checked_add_days(Days::new(u64::from(n) * 7)),
            RecurrenceUnit::Monthly => anchor.checked_add_months(Months::new(n)),
            RecurrenceUnit::Yearly => anchor.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Last allowed occurrence start: the explicit end date, or `horizon_months`
    /// after the template's end date.
    pub fn series_end(&self, template_end: NaiveDate, horizon_months: u32) -> AppResult<NaiveDate> {
        match self.end_date {
            Some(end) => Ok(end),
            None => template_end
                .checked_add_months(Months::new(horizon_months))
                .ok_or_else(|| AppError::Validation("series horizon is out of range".to_string())),
        }
    }
}
