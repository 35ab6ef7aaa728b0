//! Reservation model, state table and store-facing change types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::ReservationStatus;
use crate::error::{AppError, AppResult};

/// Events that move a reservation through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEvent {
    Approve,
    Reject,
    MarkBorrowed,
    Expire,
    RequestRenewal,
    ApproveRenewal,
    RejectRenewal,
    Return,
    Cancel,
}

impl ReservationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReservationEvent::Approve => "approve",
            ReservationEvent::Reject => "reject",
            ReservationEvent::MarkBorrowed => "mark as borrowed",
            ReservationEvent::Expire => "expire",
            ReservationEvent::RequestRenewal => "request renewal",
            ReservationEvent::ApproveRenewal => "approve renewal",
            ReservationEvent::RejectRenewal => "reject renewal",
            ReservationEvent::Return => "return",
            ReservationEvent::Cancel => "cancel",
        }
    }
}

/// The reservation state table. `None` means the event is illegal from `from`.
pub fn next_status(
    from: ReservationStatus,
    renewal_requested: bool,
    event: ReservationEvent,
) -> Option<ReservationStatus> {
    use ReservationEvent as E;
    use ReservationStatus::*;

    match (from, event) {
        (Pending, E::Approve) => Some(Approved),
        (Pending, E::Reject) => Some(Rejected),
        (Pending, E::Cancel) => Some(Cancelled),
        (Approved, E::MarkBorrowed) => Some(Borrowed),
        (Approved, E::Expire) => Some(Cancelled),
        (Approved | Borrowed, E::Cancel) => Some(Cancelled),
        (Borrowed, E::RequestRenewal) if !renewal_requested => Some(Borrowed),
        (Borrowed, E::ApproveRenewal | E::RejectRenewal) if renewal_requested => Some(Borrowed),
        (Borrowed, E::Return) => Some(Returned),
        (Pending | Approved | Borrowed | Rejected | Returned | Cancelled, _) => None,
    }
}

/// Reservation row as stored (status as text)
#[derive(Debug, Clone, FromRow)]
pub struct ReservationRow {
    id: i32,
    user_id: i32,
    book_id: i32,
    copy_id: Option<i32>,
    copy_label: Option<String>,
    status: String,
    reservation_date: DateTime<Utc>,
    approval_date: Option<DateTime<Utc>>,
    borrow_date: Option<DateTime<Utc>>,
    due_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    renewal_requested: bool,
    renewal_count: i16,
    is_walk_in: bool,
    cancellation_reason: Option<String>,
    pickup_expired: bool,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            copy_id: row.copy_id,
            copy_label: row.copy_label,
            status: row.status.parse().map_err(AppError::Internal)?,
            reservation_date: row.reservation_date,
            approval_date: row.approval_date,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            renewal_requested: row.renewal_requested,
            renewal_count: row.renewal_count,
            is_walk_in: row.is_walk_in,
            cancellation_reason: row.cancellation_reason,
            pickup_expired: row.pickup_expired,
        })
    }
}

/// One user's claim on one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    /// Set once a specific copy is held (copy-managed books only)
    pub copy_id: Option<i32>,
    pub copy_label: Option<String>,
    pub status: ReservationStatus,
    pub reservation_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub renewal_requested: bool,
    pub renewal_count: i16,
    pub is_walk_in: bool,
    pub cancellation_reason: Option<String>,
    /// Set only when the sweeper cancelled an uncollected approval
    #[serde(default)]
    pub pickup_expired: bool,
}

impl Reservation {
    /// Target status for `event`, or a state conflict naming the current status
    pub fn transition(&self, event: ReservationEvent) -> AppResult<ReservationStatus> {
        next_status(self.status, self.renewal_requested, event).ok_or(AppError::StateConflict {
            id: self.id,
            action: event.name(),
            actual: self.status,
        })
    }

    /// Guard matching the record exactly as it was read
    pub fn guard(&self) -> StatusGuard {
        StatusGuard {
            status: self.status,
            renewal_requested: Some(self.renewal_requested),
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Borrowed && self.due_date.map(|d| d < now).unwrap_or(false)
    }

    pub fn pickup_deadline(&self, window: chrono::Duration) -> Option<DateTime<Utc>> {
        match self.status {
            ReservationStatus::Approved => self.approval_date.map(|d| d + window),
            _ => None,
        }
    }
}

/// Insert payload
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub user_id: i32,
    pub book_id: i32,
    pub status: ReservationStatus,
    pub reservation_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub copy_id: Option<i32>,
    pub copy_label: Option<String>,
    pub is_walk_in: bool,
}

/// Precondition a conditional update is applied under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusGuard {
    pub status: ReservationStatus,
    /// `None` ignores the renewal flag
    pub renewal_requested: Option<bool>,
}

impl StatusGuard {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        reservation.status == self.status
            && self
                .renewal_requested
                .map(|flag| flag == reservation.renewal_requested)
                .unwrap_or(true)
    }
}

/// Fields written by a transition; `None` leaves the stored value untouched
#[derive(Debug, Clone)]
pub struct ReservationUpdate {
    pub status: ReservationStatus,
    pub approval_date: Option<DateTime<Utc>>,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub copy_id: Option<i32>,
    pub copy_label: Option<String>,
    pub renewal_requested: Option<bool>,
    pub count_renewal: bool,
    pub cancellation_reason: Option<String>,
}

impl ReservationUpdate {
    pub fn to(status: ReservationStatus) -> Self {
        Self {
            status,
            approval_date: None,
            borrow_date: None,
            due_date: None,
            return_date: None,
            copy_id: None,
            copy_label: None,
            renewal_requested: None,
            count_renewal: false,
            cancellation_reason: None,
        }
    }

    pub fn apply(&self, reservation: &mut Reservation) {
        reservation.status = self.status;
        if let Some(d) = self.approval_date {
            reservation.approval_date = Some(d);
        }
        if let Some(d) = self.borrow_date {
            reservation.borrow_date = Some(d);
        }
        if let Some(d) = self.due_date {
            reservation.due_date = Some(d);
        }
        if let Some(d) = self.return_date {
            reservation.return_date = Some(d);
        }
        if let Some(id) = self.copy_id {
            reservation.copy_id = Some(id);
        }
        if let Some(ref label) = self.copy_label {
            reservation.copy_label = Some(label.clone());
        }
        if let Some(flag) = self.renewal_requested {
            reservation.renewal_requested = flag;
        }
        if self.count_renewal {
            reservation.renewal_count += 1;
        }
        if let Some(ref reason) = self.cancellation_reason {
            reservation.cancellation_reason = Some(reason.clone());
        }
    }
}

/// Store-level listing filter
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub renewal_requested: Option<bool>,
    pub user_id: Option<i32>,
    pub due_before: Option<DateTime<Utc>>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.status.map(|s| s == r.status).unwrap_or(true)
            && self
                .renewal_requested
                .map(|f| f == r.renewal_requested)
                .unwrap_or(true)
            && self.user_id.map(|u| u == r.user_id).unwrap_or(true)
            && self
                .due_before
                .map(|cutoff| r.due_date.map(|d| d < cutoff).unwrap_or(false))
                .unwrap_or(true)
    }
}

/// Staff-facing reservation lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReservationView {
    Pending,
    Approved,
    Borrowed,
    Cancelled,
    RenewalPending,
    Overdue,
}

impl ReservationView {
    pub fn filter(self, now: DateTime<Utc>) -> ReservationFilter {
        let status = match self {
            ReservationView::Pending => ReservationStatus::Pending,
            ReservationView::Approved => ReservationStatus::Approved,
            ReservationView::Cancelled => ReservationStatus::Cancelled,
            ReservationView::Borrowed
            | ReservationView::RenewalPending
            | ReservationView::Overdue => ReservationStatus::Borrowed,
        };
        ReservationFilter {
            status: Some(status),
            renewal_requested: (self == ReservationView::RenewalPending).then_some(true),
            user_id: None,
            due_before: (self == ReservationView::Overdue).then_some(now),
        }
    }
}

/// Query parameters for reservation lists
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub view: ReservationView,
}

/// Create reservation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservation {
    /// Staff only: reserve on behalf of this user
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: Option<i32>,
    #[validate(range(min = 1, message = "book_id must be positive"))]
    pub book_id: i32,
}

/// Cancel reservation request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelReservation {
    #[validate(length(min = 1, max = 255, message = "Reason must be 1-255 characters"))]
    pub reason: Option<String>,
}

/// Walk-in checkout request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DirectBorrowRequest {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i32,
    #[validate(range(min = 1, message = "book_id must be positive"))]
    pub book_id: i32,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct EligibilityQuery {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i32,
    #[validate(range(min = 1, message = "book_id must be positive"))]
    pub book_id: i32,
}
