//! Shared scheduling enums and their state machines

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

// ---------------------------------------------------------------------------
// BookingStatus
// ---------------------------------------------------------------------------

/// Lifecycle status shared by bookings and occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum BookingStatus {
    PendingInstallation = 0,
    Active = 1,
    Completed = 2,
    Cancelled = 3,
}

/// Operator action that drives a booking or occurrence forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Equipment delivered and installed at the client
    Install,
    /// Equipment picked up
    Remove,
    Cancel,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::PendingInstallation,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether units are held by a booking in this status
    pub fn holds_capacity(self) -> bool {
        matches!(self, BookingStatus::PendingInstallation | BookingStatus::Active)
    }

    /// Apply an operator action, rejecting anything the state machine does not allow
    pub fn apply(self, action: LifecycleAction) -> AppResult<BookingStatus> {
        use BookingStatus::*;
        match (self, action) {
            (PendingInstallation, LifecycleAction::Install) => Ok(Active),
            (Active, LifecycleAction::Remove) => Ok(Completed),
            (PendingInstallation | Active, LifecycleAction::Cancel) => Ok(Cancelled),
            (from, action) => Err(AppError::InvalidTransition(format!(
                "cannot {:?} a booking that is {}",
                action, from
            ))),
        }
    }
}

impl TryFrom<i16> for BookingStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(BookingStatus::PendingInstallation),
            1 => Ok(BookingStatus::Active),
            2 => Ok(BookingStatus::Completed),
            3 => Ok(BookingStatus::Cancelled),
            other => Err(AppError::DataIntegrity(format!("unknown booking status {}", other))),
        }
    }
}

impl From<BookingStatus> for i16 {
    fn from(s: BookingStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BookingStatus::PendingInstallation => "pending installation",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

// ---------------------------------------------------------------------------
// RecurrenceUnit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum RecurrenceUnit {
    Daily = 0,
    Weekly = 1,
    Monthly = 2,
    Yearly = 3,
}

impl TryFrom<i16> for RecurrenceUnit {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RecurrenceUnit::Daily),
            1 => Ok(RecurrenceUnit::Weekly),
            2 => Ok(RecurrenceUnit::Monthly),
            3 => Ok(RecurrenceUnit::Yearly),
            other => Err(AppError::Validation(format!("unsupported recurrence unit {}", other))),
        }
    }
}

impl From<RecurrenceUnit> for i16 {
    fn from(u: RecurrenceUnit) -> Self {
        u as i16
    }
}

impl FromStr for RecurrenceUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(RecurrenceUnit::Daily),
            "weekly" => Ok(RecurrenceUnit::Weekly),
            "monthly" => Ok(RecurrenceUnit::Monthly),
            "yearly" => Ok(RecurrenceUnit::Yearly),
            other => Err(AppError::Validation(format!(
                "unsupported recurrence unit '{}' (expected daily, weekly, monthly or yearly)",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SeriesStatus
// ---------------------------------------------------------------------------

/// Status of a recurrence series, independent from its occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum SeriesStatus {
    Active = 0,
    Paused = 1,
    Cancelled = 2,
    Completed = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeriesCommand {
    Pause,
    Resume,
    Cancel,
}

impl SeriesStatus {
    pub const ALL: [SeriesStatus; 4] = [
        SeriesStatus::Active,
        SeriesStatus::Paused,
        SeriesStatus::Cancelled,
        SeriesStatus::Completed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, SeriesStatus::Cancelled | SeriesStatus::Completed)
    }

    pub fn apply(self, command: SeriesCommand) -> AppResult<SeriesStatus> {
        use SeriesStatus::*;
        match (self, command) {
            (Active, SeriesCommand::Pause) => Ok(Paused),
            (Paused, SeriesCommand::Resume) => Ok(Active),
            (Active | Paused, SeriesCommand::Cancel) => Ok(Cancelled),
            (from, command) => Err(AppError::InvalidTransition(format!(
                "cannot {:?} a series that is {:?}",
                command, from
            ))),
        }
    }
}

impl TryFrom<i16> for SeriesStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SeriesStatus::Active),
            1 => Ok(SeriesStatus::Paused),
            2 => Ok(SeriesStatus::Cancelled),
            3 => Ok(SeriesStatus::Completed),
            other => Err(AppError::DataIntegrity(format!("unknown series status {}", other))),
        }
    }
}

impl From<SeriesStatus> for i16 {
    fn from(s: SeriesStatus) -> Self {
        s as i16
    }
}
