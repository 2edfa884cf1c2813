//! Booking, occurrence and availability models

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{enums::BookingStatus, recurrence::RecurrenceDescriptor};
use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive day range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if end < start {
            return Err(AppError::Validation(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Inclusive overlap: a rental ending on day N conflicts with one starting on day N.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// `end - start` in days (0 for a single-day rental)
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Booking
// ---------------------------------------------------------------------------

/// Quantity of one equipment type within a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub equipment_id: Uuid,
    pub quantity: i32,
}

/// A confirmed reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Client reference from the surrounding CRM
    pub client_ref: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub items: Vec<LineItem>,
    /// Present when this booking is the template of a recurring series
    pub recurrence: Option<RecurrenceDescriptor>,
    pub installed_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Units of `equipment_id` committed by this booking. Saturates instead of wrapping,
    /// so an oversized row can only overstate the commitment.
    pub fn quantity_of(&self, equipment_id: Uuid) -> i32 {
        self.items
            .iter()
            .filter(|item| item.equipment_id == equipment_id)
            .fold(0, |total: i32, item| total.saturating_add(item.quantity))
    }

    /// Quantity per equipment type, ordered by equipment id
    pub fn demand(&self) -> BTreeMap<Uuid, i32> {
        demand_of(&self.items)
    }

    pub fn is_series_template(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Aggregate line items per equipment type. Ordered keys give a stable lock order.
/// Saturating, like [`Booking::quantity_of`]; [`validate_items`] rejects input that would saturate.
pub fn demand_of(items: &[LineItem]) -> BTreeMap<Uuid, i32> {
    let mut demand = BTreeMap::new();
    for item in items {
        let total: &mut i32 = demand.entry(item.equipment_id).or_insert(0);
        *total = total.saturating_add(item.quantity);
    }
    demand
}

pub fn validate_items(items: &[LineItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::Validation("a booking needs at least one line item".to_string()));
    }

    let mut demand: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "quantity for equipment {} must be positive, got {}",
                item.equipment_id, item.quantity
            )));
        }
        let total = demand.entry(item.equipment_id).or_insert(0);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            AppError::Validation(format!(
                "total quantity for equipment {} is too large",
                item.equipment_id
            ))
        })?;
    }
    Ok(())
}

/// Input for confirming a new booking
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub client_ref: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub items: Vec<LineItem>,
    pub recurrence: Option<RecurrenceDescriptor>,
}

impl NewBooking {
    /// Validate and turn into a pending booking owned by `tenant_id`
    pub fn into_booking(self, tenant_id: Uuid, now: DateTime<Utc>) -> AppResult<Booking> {
        let range = DateRange::new(self.start_date, self.end_date)?;
        validate_items(&self.items)?;
        if let Some(recurrence) = &self.recurrence {
            recurrence.validate()?;
            if let Some(series_end) = recurrence.end_date {
                if series_end < range.start {
                    return Err(AppError::Validation(format!(
                        "series end date {} is before the booking start {}",
                        series_end, range.start
                    )));
                }
            }
        }

        Ok(Booking {
            id: Uuid::new_v4(),
            tenant_id,
            client_ref: self.client_ref,
            start_date: range.start,
            end_date: range.end,
            status: BookingStatus::PendingInstallation,
            items: self.items,
            recurrence: self.recurrence,
            installed_at: None,
            removed_at: None,
            created_at: now,
        })
    }
}

/// Filters for listing bookings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub equipment_id: Option<Uuid>,
    /// Only bookings overlapping this day range (both bounds required)
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl BookingQuery {
    pub fn range(&self) -> AppResult<Option<DateRange>> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => DateRange::new(from, to).map(Some),
            (None, None) => Ok(None),
            _ => Err(AppError::Validation("both 'from' and 'to' are required".to_string())),
        }
    }

    pub fn matches(&self, booking: &Booking) -> AppResult<bool> {
        if self.status.is_some_and(|s| s != booking.status) {
            return Ok(false);
        }
        if let Some(equipment_id) = self.equipment_id {
            if booking.quantity_of(equipment_id) == 0 {
                return Ok(false);
            }
        }
        if let Some(range) = self.range()? {
            if !range.overlaps(&booking.range()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Occurrence
// ---------------------------------------------------------------------------

/// One generated instance of a recurring series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Occurrence {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Template booking (also the series id)
    pub booking_id: Uuid,
    /// 1-based, contiguous within the series
    pub sequence: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: BookingStatus,
    pub installed_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// An installed occurrence holding units of one equipment type
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct CommittedOccurrence {
    pub occurrence_id: Uuid,
    pub booking_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i32,
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// Ephemeral availability question for one equipment type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookingRequest {
    pub equipment_id: Uuid,
    pub quantity: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Booking being edited; it must not count against itself
    pub exclude_booking_id: Option<Uuid>,
}

impl BookingRequest {
    pub fn validate(&self) -> AppResult<DateRange> {
        if self.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "required quantity must be positive, got {}",
                self.quantity
            )));
        }
        DateRange::new(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    EquipmentNotFound,
    InsufficientQuantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AvailabilityResult {
    pub equipment_id: Uuid,
    pub equipment_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub available: bool,
    /// May be negative when existing commitments already exceed the fleet
    pub available_quantity: i32,
    pub required_quantity: i32,
    pub reason: Option<UnavailableReason>,
}

impl AvailabilityResult {
    pub fn message(&self) -> String {
        let name = self
            .equipment_name
            .clone()
            .unwrap_or_else(|| self.equipment_id.to_string());
        match self.reason {
            None => format!(
                "{} unit(s) of {} available from {} to {}",
                self.available_quantity, name, self.start_date, self.end_date
            ),
            Some(UnavailableReason::EquipmentNotFound) => {
                format!("equipment {} not found", self.equipment_id)
            }
            Some(UnavailableReason::InsufficientQuantity) => format!(
                "only {} unit(s) of {} available from {} to {}, {} requested",
                self.available_quantity.max(0),
                name,
                self.start_date,
                self.end_date,
                self.required_quantity
            ),
        }
    }
}
