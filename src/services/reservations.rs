//! Reservation lifecycle service
//!
//! Every transition reads the reservation, checks the move against the state
//! table, then writes it with a compare-and-set on the status that was read.
//! Losing a race surfaces as a state conflict carrying the status found.

use std::sync::Arc;

use super::{
    allocation::CopyAllocator,
    clock::Clock,
    effects::{EffectDispatcher, NotificationKind, Operation, Transitioned},
    eligibility,
    sweeper::ExpirySweeper,
};
use crate::{
    config::LendingConfig,
    error::{AppError, AppResult, EligibilityError},
    models::{
        Actor, CreateReservation, NewReservation, Reservation, ReservationEvent, ReservationFilter,
        ReservationStatus, ReservationUpdate, ReservationView,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    lending: LendingConfig,
    dispatcher: EffectDispatcher,
    sweeper: ExpirySweeper,
}

fn entity(id: i32) -> String {
    format!("reservation:{}", id)
}

impl ReservationsService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        lending: LendingConfig,
        dispatcher: EffectDispatcher,
        sweeper: ExpirySweeper,
    ) -> Self {
        Self {
            repository,
            clock,
            lending,
            dispatcher,
            sweeper,
        }
    }

    async fn load(&self, id: i32) -> AppResult<Reservation> {
        self.repository
            .reservations
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Build the conflict error after a lost compare-and-set
    async fn conflict(&self, id: i32, event: ReservationEvent) -> AppError {
        match self.load(id).await {
            Ok(current) => AppError::StateConflict {
                id,
                action: event.name(),
                actual: current.status,
            },
            Err(e) => e,
        }
    }

    /// Get a single reservation (owner or staff)
    pub async fn get(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let reservation = self.load(id).await?;
        actor.require_owner_or_staff(reservation.user_id)?;
        Ok(reservation)
    }

    /// Staff list for one view; expired approvals are swept first
    pub async fn list(&self, actor: &Actor, view: ReservationView) -> AppResult<Vec<Reservation>> {
        actor.require_staff()?;
        self.sweeper.sweep().await?;
        let filter = view.filter(self.clock.now());
        self.repository.reservations.list(&filter).await
    }

    /// The caller's own reservations; expired approvals are swept first
    pub async fn list_mine(&self, actor: &Actor) -> AppResult<Vec<Reservation>> {
        self.sweeper.sweep().await?;
        let filter = ReservationFilter {
            user_id: Some(actor.user_id),
            ..ReservationFilter::default()
        };
        self.repository.reservations.list(&filter).await
    }

    pub async fn create(&self, actor: &Actor, request: CreateReservation) -> AppResult<Reservation> {
        let user_id = match request.user_id {
            Some(user_id) if user_id != actor.user_id => {
                actor.require_staff()?;
                user_id
            }
            _ => actor.user_id,
        };
        let op = Operation::new(
            "create_reservation",
            format!("book:{}", request.book_id),
            Some(actor.user_id),
        );
        let result = self.try_create(user_id, request.book_id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_create(&self, user_id: i32, book_id: i32) -> AppResult<Transitioned<Reservation>> {
        let facts = eligibility::ensure_eligible(&self.repository, user_id, book_id).await?;

        let reservation = self
            .repository
            .reservations
            .insert(NewReservation {
                user_id,
                book_id,
                status: ReservationStatus::Pending,
                reservation_date: self.clock.now(),
                approval_date: None,
                borrow_date: None,
                due_date: None,
                copy_id: None,
                copy_label: None,
                is_walk_in: false,
            })
            .await?;

        let (id, title) = (reservation.id, facts.book.title);
        Ok(
            Transitioned::new(reservation, format!("Reservation {} created for '{}'", id, title)).notify(
                NotificationKind::ReservationCreated,
                user_id,
                Some(id),
                format!("Your reservation for '{}' is awaiting approval", title),
            ),
        )
    }

    pub async fn approve(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("approve_reservation", entity(id), Some(actor.user_id));
        let result = self.try_approve(actor, id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_approve(&self, actor: &Actor, id: i32) -> AppResult<Transitioned<Reservation>> {
        actor.require_staff()?;
        let current = self.load(id).await?;
        let target = current.transition(ReservationEvent::Approve)?;

        let book = self
            .repository
            .books
            .get(current.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", current.book_id)))?;
        let allocator = CopyAllocator::for_book(&book);
        let books = self.repository.books.as_ref();
        let hold = allocator
            .allocate(books, book.id)
            .await?
            .ok_or(EligibilityError::NoCopiesAvailable)?;

        let now = self.clock.now();
        let update = ReservationUpdate {
            approval_date: Some(now),
            due_date: Some(now + self.lending.loan_period()),
            copy_id: hold.copy_id,
            copy_label: hold.copy_label.clone(),
            ..ReservationUpdate::to(target)
        };

        let approved = match self.repository.reservations.transition(id, current.guard(), update).await {
            Ok(Some(r)) => r,
            other => {
                if let Err(e) = allocator.release(books, book.id, hold.copy_id).await {
                    tracing::error!(reservation_id = id, book_id = book.id, "hold leaked after failed approval: {}", e);
                }
                return Err(match other {
                    Err(e) => e,
                    _ => self.conflict(id, ReservationEvent::Approve).await,
                });
            }
        };

        let copy = approved
            .copy_label
            .as_deref()
            .map(|label| format!(" (copy {})", label))
            .unwrap_or_default();
        let user_id = approved.user_id;
        Ok(
            Transitioned::new(approved, format!("Reservation {} approved for '{}'{}", id, book.title, copy))
                .notify(
                    NotificationKind::ReservationApproved,
                    user_id,
                    Some(id),
                    format!(
                        "'{}' is ready for pickup. Please collect it within {} minute(s)",
                        book.title, self.lending.pickup_window_minutes
                    ),
                ),
        )
    }

    pub async fn reject(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("reject_reservation", entity(id), Some(actor.user_id));
        let result = self.try_reject(actor, id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_reject(&self, actor: &Actor, id: i32) -> AppResult<Transitioned<Reservation>> {
        actor.require_staff()?;
        let current = self.load(id).await?;
        let target = current.transition(ReservationEvent::Reject)?;

        let rejected = self
            .repository
            .reservations
            .transition(id, current.guard(), ReservationUpdate::to(target))
            .await?;
        let Some(rejected) = rejected else {
            return Err(self.conflict(id, ReservationEvent::Reject).await);
        };

        let user_id = rejected.user_id;
        Ok(Transitioned::new(rejected, format!("Reservation {} rejected", id)).notify(
            NotificationKind::ReservationRejected,
            user_id,
            Some(id),
            "Your reservation was rejected by the library",
        ))
    }

    /// Hand the held copy over; the pickup window is re-checked first
    pub async fn mark_borrowed(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("mark_borrowed", entity(id), Some(actor.user_id));
        let result = self.try_mark_borrowed(actor, id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_mark_borrowed(&self, actor: &Actor, id: i32) -> AppResult<Transitioned<Reservation>> {
        actor.require_staff()?;
        self.sweeper.sweep().await?;

        let current = self.load(id).await?;
        if is_expired(&current) {
            return Err(AppError::PickupWindowElapsed(id));
        }
        let target = current.transition(ReservationEvent::MarkBorrowed)?;

        let now = self.clock.now();
        let update = ReservationUpdate {
            borrow_date: Some(now),
            due_date: Some(now + self.lending.loan_period()),
            ..ReservationUpdate::to(target)
        };
        let borrowed = self.repository.reservations.transition(id, current.guard(), update).await?;
        let Some(borrowed) = borrowed else {
            return Err(match self.load(id).await {
                Ok(r) if is_expired(&r) => AppError::PickupWindowElapsed(id),
                _ => self.conflict(id, ReservationEvent::MarkBorrowed).await,
            });
        };

        let allocator = CopyAllocator::for_reservation(&borrowed);
        if let Err(e) = allocator
            .mark_borrowed(self.repository.books.as_ref(), borrowed.copy_id)
            .await
        {
            tracing::warn!(reservation_id = id, copy_id = ?borrowed.copy_id, "copy not stamped as borrowed: {}", e);
        }

        let (user_id, due) = (borrowed.user_id, borrowed.due_date);
        let due = due.map(|d| d.to_rfc3339()).unwrap_or_default();
        Ok(Transitioned::new(borrowed, format!("Reservation {} checked out, due {}", id, due)).notify(
            NotificationKind::BookBorrowed,
            user_id,
            Some(id),
            format!("Book checked out. Please return it by {}", due),
        ))
    }

    /// Manual cancel; a held or checked-out copy is released.
    /// Owners may cancel pending and approved holds, a running loan is staff-only.
    pub async fn cancel(&self, actor: &Actor, id: i32, reason: Option<String>) -> AppResult<Reservation> {
        let op = Operation::new("cancel_reservation", entity(id), Some(actor.user_id));
        let result = self.try_cancel(actor, id, reason).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_cancel(
        &self,
        actor: &Actor,
        id: i32,
        reason: Option<String>,
    ) -> AppResult<Transitioned<Reservation>> {
        let current = self.load(id).await?;
        if current.status == ReservationStatus::Borrowed {
            actor.require_staff()?;
        } else {
            actor.require_owner_or_staff(current.user_id)?;
        }
        let target = current.transition(ReservationEvent::Cancel)?;

        let reason = reason.unwrap_or_else(|| {
            if actor.user_id == current.user_id {
                "Cancelled by borrower".to_string()
            } else {
                "Cancelled by library staff".to_string()
            }
        });
        let update = ReservationUpdate {
            cancellation_reason: Some(reason.clone()),
            ..ReservationUpdate::to(target)
        };
        let cancelled = self.repository.reservations.transition(id, current.guard(), update).await?;
        let Some(cancelled) = cancelled else {
            return Err(self.conflict(id, ReservationEvent::Cancel).await);
        };

        if matches!(current.status, ReservationStatus::Approved | ReservationStatus::Borrowed) {
            let allocator = CopyAllocator::for_reservation(&cancelled);
            if let Err(e) = allocator
                .release(self.repository.books.as_ref(), cancelled.book_id, cancelled.copy_id)
                .await
            {
                tracing::warn!(reservation_id = id, "hold not released after cancel: {}", e);
            }
        }

        let user_id = cancelled.user_id;
        Ok(Transitioned::new(cancelled, format!("Reservation {} cancelled: {}", id, reason)).notify(
            NotificationKind::ReservationCancelled,
            user_id,
            Some(id),
            format!("Your reservation was cancelled: {}", reason),
        ))
    }

    pub async fn request_renewal(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("request_renewal", entity(id), Some(actor.user_id));
        let result = self.try_request_renewal(actor, id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_request_renewal(&self, actor: &Actor, id: i32) -> AppResult<Transitioned<Reservation>> {
        let current = self.load(id).await?;
        actor.require_owner_or_staff(current.user_id)?;
        let target = current.transition(ReservationEvent::RequestRenewal)?;
        if current.renewal_count >= self.lending.max_renewals {
            return Err(EligibilityError::RenewalLimitReached {
                max: self.lending.max_renewals,
            }
            .into());
        }

        let update = ReservationUpdate {
            renewal_requested: Some(true),
            ..ReservationUpdate::to(target)
        };
        let requested = self.repository.reservations.transition(id, current.guard(), update).await?;
        let Some(requested) = requested else {
            return Err(self.conflict(id, ReservationEvent::RequestRenewal).await);
        };

        let user_id = requested.user_id;
        Ok(Transitioned::new(requested, format!("Renewal requested for reservation {}", id)).notify(
            NotificationKind::RenewalRequested,
            user_id,
            Some(id),
            "Your renewal request was received",
        ))
    }

    /// Extend the due date by one loan period from its current value
    pub async fn approve_renewal(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("approve_renewal", entity(id), Some(actor.user_id));
        let result = self.try_decide_renewal(actor, id, ReservationEvent::ApproveRenewal).await;
        self.dispatcher.finish(op, result).await
    }

    pub async fn reject_renewal(&self, actor: &Actor, id: i32) -> AppResult<Reservation> {
        let op = Operation::new("reject_renewal", entity(id), Some(actor.user_id));
        let result = self.try_decide_renewal(actor, id, ReservationEvent::RejectRenewal).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_decide_renewal(
        &self,
        actor: &Actor,
        id: i32,
        event: ReservationEvent,
    ) -> AppResult<Transitioned<Reservation>> {
        actor.require_staff()?;
        let current = self.load(id).await?;
        let target = current.transition(event)?;

        let approve = event == ReservationEvent::ApproveRenewal;
        let mut update = ReservationUpdate {
            renewal_requested: Some(false),
            ..ReservationUpdate::to(target)
        };
        if approve {
            let base = current.due_date.unwrap_or_else(|| self.clock.now());
            update.due_date = Some(base + self.lending.loan_period());
            update.count_renewal = true;
        }

        let decided = self.repository.reservations.transition(id, current.guard(), update).await?;
        let Some(decided) = decided else {
            return Err(self.conflict(id, event).await);
        };

        let user_id = decided.user_id;
        let (kind, detail, message) = if approve {
            let due = decided.due_date.map(|d| d.to_rfc3339()).unwrap_or_default();
            (
                NotificationKind::RenewalApproved,
                format!("Renewal approved for reservation {}, now due {}", id, due),
                format!("Your loan was renewed. New due date: {}", due),
            )
        } else {
            (
                NotificationKind::RenewalRejected,
                format!("Renewal rejected for reservation {}", id),
                "Your renewal request was rejected; the due date is unchanged".to_string(),
            )
        };
        Ok(Transitioned::new(decided, detail).notify(kind, user_id, Some(id), message))
    }
}

fn is_expired(r: &Reservation) -> bool {
    r.status == ReservationStatus::Cancelled && r.pickup_expired
}
