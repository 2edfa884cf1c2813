//! Data models for the scheduling core

pub mod booking;
pub mod enums;
pub mod equipment;
pub mod recurrence;
pub mod tenant;

// Re-export commonly used types
pub use booking::{
    AvailabilityResult, Booking, BookingQuery, BookingRequest, CommittedOccurrence, DateRange,
    LineItem, NewBooking, Occurrence, UnavailableReason,
};
pub use enums::{BookingStatus, LifecycleAction, RecurrenceUnit, SeriesCommand, SeriesStatus};
pub use equipment::{EquipmentStock, LedgerSnapshot};
pub use recurrence::RecurrenceDescriptor;
pub use tenant::{TenantClaims, TenantContext};
