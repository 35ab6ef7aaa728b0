//! In-memory backend
//!
//! All five stores share one mutex, so each trait call is atomic with respect to
//! every other call, matching the conditional-update semantics of the Postgres
//! repositories. Used by tests and by the `memory` database backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{BooksStore, ClosedLoan, PenaltiesStore, ReservationsStore, ReturnsStore, UsersStore};
use crate::{
    error::{AppError, AppResult, EligibilityError},
    models::{
        Book, BookCopy, CopyStatus, NewPenalty, NewReservation, NewReturnTransaction,
        PaymentStatus, Penalty, Reservation, ReservationFilter, ReservationStatus,
        ReservationUpdate, ReturnTransaction, Role, StatusGuard, User,
    },
};

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    copies: BTreeMap<i32, BookCopy>,
    reservations: BTreeMap<i32, Reservation>,
    returns: BTreeMap<i32, ReturnTransaction>,
    penalties: BTreeMap<i32, Penalty>,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn restore_available(&mut self, book_id: i32) {
        if let Some(book) = self.books.get_mut(&book_id) {
            book.available_copies = (book.available_copies + 1).min(book.total_copies);
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, login: &str, role: Role) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: state.next_id(),
            login: login.to_string(),
            firstname: None,
            lastname: None,
            email: Some(format!("{}@campus.test", login)),
            role,
            is_restricted: false,
            restriction_reason: None,
            restricted_at: None,
            has_pending_penalties: false,
            total_pending_penalties: Decimal::ZERO,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Add a title with `copies` copies; copy-managed titles get labelled copies
    pub async fn add_book(&self, title: &str, copies: i32, copy_management: bool) -> Book {
        let mut state = self.state.lock().await;
        let book = Book {
            id: state.next_id(),
            title: title.to_string(),
            author: None,
            total_copies: copies,
            available_copies: copies,
            copy_management,
        };
        state.books.insert(book.id, book.clone());

        if copy_management {
            for n in 1..=copies {
                let copy = BookCopy {
                    id: state.next_id(),
                    book_id: book.id,
                    label: format!("B{}-C{:03}", book.id, n),
                    status: CopyStatus::Available,
                    borrow_count: 0,
                };
                state.copies.insert(copy.id, copy);
            }
        }
        book
    }

    pub async fn copies_of(&self, book_id: i32) -> Vec<BookCopy> {
        let state = self.state.lock().await;
        state
            .copies
            .values()
            .filter(|c| c.book_id == book_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReservationsStore for MemoryStore {
    async fn insert(&self, r: NewReservation) -> AppResult<Reservation> {
        let mut state = self.state.lock().await;

        if r.status.is_active()
            && state
                .reservations
                .values()
                .any(|x| x.user_id == r.user_id && x.book_id == r.book_id && x.status.is_active())
        {
            return Err(EligibilityError::DuplicateHold.into());
        }

        let reservation = Reservation {
            id: state.next_id(),
            user_id: r.user_id,
            book_id: r.book_id,
            copy_id: r.copy_id,
            copy_label: r.copy_label,
            status: r.status,
            reservation_date: r.reservation_date,
            approval_date: r.approval_date,
            borrow_date: r.borrow_date,
            due_date: r.due_date,
            return_date: None,
            renewal_requested: false,
            renewal_count: 0,
            is_walk_in: r.is_walk_in,
            cancellation_reason: None,
            pickup_expired: false,
        };
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn has_active_hold(&self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .any(|r| r.user_id == user_id && r.book_id == book_id && r.status.is_active()))
    }

    async fn transition(
        &self,
        id: i32,
        guard: StatusGuard,
        update: ReservationUpdate,
    ) -> AppResult<Option<Reservation>> {
        let mut state = self.state.lock().await;
        match state.reservations.get_mut(&id) {
            Some(r) if guard.matches(r) => {
                update.apply(r);
                Ok(Some(r.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_expired(
        &self,
        approved_before: DateTime<Utc>,
        to: ReservationStatus,
        reason: &str,
    ) -> AppResult<Vec<Reservation>> {
        let mut state = self.state.lock().await;
        let mut cancelled = Vec::new();
        for r in state.reservations.values_mut() {
            let expired = r.status == ReservationStatus::Approved
                && r.approval_date.map(|d| d < approved_before).unwrap_or(false);
            if expired {
                r.status = to;
                r.cancellation_reason = Some(reason.to_string());
                r.pickup_expired = true;
                cancelled.push(r.clone());
            }
        }
        Ok(cancelled)
    }

    async fn close_loan(
        &self,
        id: i32,
        to: ReservationStatus,
        t: NewReturnTransaction,
        penalties: Vec<NewPenalty>,
    ) -> AppResult<Option<ClosedLoan>> {
        let mut state = self.state.lock().await;

        match state.reservations.get(&id) {
            Some(r) if r.status == ReservationStatus::Borrowed => {}
            _ => return Ok(None),
        }
        if state.returns.contains_key(&id) {
            return Err(AppError::Internal(format!(
                "Return transaction already recorded for reservation {}",
                id
            )));
        }

        let transaction = ReturnTransaction {
            id: state.next_id(),
            reservation_id: t.reservation_id,
            book_id: t.book_id,
            user_id: t.user_id,
            borrow_date: t.borrow_date,
            due_date: t.due_date,
            return_date: t.return_date,
            minutes_late: t.minutes_late,
            late_fee: t.late_fee,
            condition: t.condition,
            condition_penalty: t.condition_penalty,
            total_penalty: t.total_penalty,
            payment_status: t.payment_status(),
        };
        state.returns.insert(id, transaction.clone());

        let mut created = Vec::with_capacity(penalties.len());
        for p in penalties {
            let penalty = Penalty {
                id: state.next_id(),
                user_id: p.user_id,
                reservation_id: p.reservation_id,
                book_id: p.book_id,
                kind: p.kind,
                amount: p.amount,
                is_paid: false,
                paid_at: None,
                created_at: p.created_at,
            };
            state.penalties.insert(penalty.id, penalty.clone());
            created.push(penalty);
        }

        let reservation = match state.reservations.get_mut(&id) {
            Some(r) => {
                r.status = to;
                r.return_date = Some(t.return_date);
                r.renewal_requested = false;
                r.clone()
            }
            None => return Ok(None),
        };

        Ok(Some(ClosedLoan {
            reservation,
            transaction,
            penalties: created,
        }))
    }
}

#[async_trait]
impl ReturnsStore for MemoryStore {
    async fn get_by_reservation(&self, reservation_id: i32) -> AppResult<Option<ReturnTransaction>> {
        Ok(self.state.lock().await.returns.get(&reservation_id).cloned())
    }

    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<ReturnTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .returns
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_payment_status(&self, reservation_id: i32, status: PaymentStatus) -> AppResult<()> {
        if let Some(t) = self.state.lock().await.returns.get_mut(&reservation_id) {
            t.payment_status = status;
        }
        Ok(())
    }
}

#[async_trait]
impl PenaltiesStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Penalty>> {
        Ok(self.state.lock().await.penalties.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: i32, unpaid_only: bool) -> AppResult<Vec<Penalty>> {
        let state = self.state.lock().await;
        Ok(state
            .penalties
            .values()
            .filter(|p| p.user_id == user_id && !(unpaid_only && p.is_paid))
            .cloned()
            .collect())
    }

    async fn list_for_reservation(&self, reservation_id: i32) -> AppResult<Vec<Penalty>> {
        let state = self.state.lock().await;
        Ok(state
            .penalties
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    async fn outstanding_total(&self, user_id: i32) -> AppResult<Decimal> {
        let state = self.state.lock().await;
        Ok(state
            .penalties
            .values()
            .filter(|p| p.user_id == user_id && !p.is_paid)
            .map(|p| p.amount)
            .sum())
    }

    async fn mark_paid(&self, id: i32, at: DateTime<Utc>) -> AppResult<Option<Penalty>> {
        let mut state = self.state.lock().await;
        match state.penalties.get_mut(&id) {
            Some(p) if !p.is_paid => {
                p.is_paid = true;
                p.paid_at = Some(at);
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn remove(&self, id: i32) -> AppResult<Option<Penalty>> {
        Ok(self.state.lock().await.penalties.remove(&id))
    }
}

#[async_trait]
impl UsersStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn restrict(&self, id: i32, reason: &str, at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        user.is_restricted = true;
        user.restriction_reason = Some(reason.to_string());
        user.restricted_at = Some(at);
        Ok(())
    }

    async fn unrestrict(&self, id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&id) {
            Some(user) if user.is_restricted => {
                user.is_restricted = false;
                user.restriction_reason = None;
                user.restricted_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_penalty_summary(&self, id: i32, total: Decimal) -> AppResult<()> {
        if let Some(user) = self.state.lock().await.users.get_mut(&id) {
            user.total_pending_penalties = total;
            user.has_pending_penalties = total > Decimal::ZERO;
        }
        Ok(())
    }
}

#[async_trait]
impl BooksStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn take_available(&self, book_id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.books.get_mut(&book_id) {
            Some(book) if book.available_copies > 0 => {
                book.available_copies -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_available(&self, book_id: i32) -> AppResult<()> {
        self.state.lock().await.restore_available(book_id);
        Ok(())
    }

    async fn allocate_copy(&self, book_id: i32) -> AppResult<Option<BookCopy>> {
        let mut state = self.state.lock().await;

        let has_count = state
            .books
            .get(&book_id)
            .map(|b| b.available_copies > 0)
            .unwrap_or(false);
        if !has_count {
            return Ok(None);
        }

        let chosen = state
            .copies
            .values()
            .filter(|c| c.book_id == book_id && c.status == CopyStatus::Available)
            .min_by_key(|c| (c.borrow_count, c.id))
            .map(|c| c.id);

        let Some(copy_id) = chosen else {
            return Ok(None);
        };
        if let Some(book) = state.books.get_mut(&book_id) {
            book.available_copies -= 1;
        }
        let copy = state.copies.get_mut(&copy_id).map(|c| {
            c.status = CopyStatus::Reserved;
            c.clone()
        });
        Ok(copy)
    }

    async fn release_copy(&self, copy_id: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let book_id = match state.copies.get_mut(&copy_id) {
            Some(c) if matches!(c.status, CopyStatus::Reserved | CopyStatus::Borrowed) => {
                c.status = CopyStatus::Available;
                c.book_id
            }
            _ => return Ok(false),
        };
        state.restore_available(book_id);
        Ok(true)
    }

    async fn borrow_copy(&self, copy_id: i32) -> AppResult<()> {
        if let Some(c) = self.state.lock().await.copies.get_mut(&copy_id) {
            c.status = CopyStatus::Borrowed;
            c.borrow_count += 1;
        }
        Ok(())
    }

    async fn retire_copy(&self, copy_id: i32, status: CopyStatus) -> AppResult<()> {
        if let Some(c) = self.state.lock().await.copies.get_mut(&copy_id) {
            c.status = status;
        }
        Ok(())
    }
}
