//! Repository layer: persistence traits and their backends
//!
//! Every mutating call is conditional on the state the caller observed, so two
//! concurrent staff actions on the same reservation or the last copy of a book
//! cannot both succeed. A `None`/`false` result means the precondition no
//! longer held and nothing was written.

pub mod books;
pub mod memory;
pub mod penalties;
pub mod reservations;
pub mod returns;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        Book, BookCopy, CopyStatus, NewPenalty, NewReservation, NewReturnTransaction,
        PaymentStatus, Penalty, Reservation, ReservationFilter, ReservationStatus,
        ReservationUpdate, ReturnTransaction, StatusGuard, User,
    },
};

/// Result of atomically closing a borrowed reservation
#[derive(Debug, Clone)]
pub struct ClosedLoan {
    pub reservation: Reservation,
    pub transaction: ReturnTransaction,
    pub penalties: Vec<Penalty>,
}

#[async_trait]
pub trait ReservationsStore: Send + Sync {
    async fn insert(&self, reservation: NewReservation) -> AppResult<Reservation>;

    async fn get(&self, id: i32) -> AppResult<Option<Reservation>>;

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>>;

    /// Any pending, approved or borrowed reservation for (user, book)
    async fn has_active_hold(&self, user_id: i32, book_id: i32) -> AppResult<bool>;

    /// Compare-and-set on status (and optionally the renewal flag)
    async fn transition(
        &self,
        id: i32,
        guard: StatusGuard,
        update: ReservationUpdate,
    ) -> AppResult<Option<Reservation>>;

    /// Move every approved reservation approved strictly before `approved_before`
    /// to `to` and flag it as pickup-expired. Returns only the rows this call changed.
    async fn cancel_expired(
        &self,
        approved_before: DateTime<Utc>,
        to: ReservationStatus,
        reason: &str,
    ) -> AppResult<Vec<Reservation>>;

    /// Borrowed -> `to`, plus the return transaction and penalty rows, in one unit
    async fn close_loan(
        &self,
        id: i32,
        to: ReservationStatus,
        transaction: NewReturnTransaction,
        penalties: Vec<NewPenalty>,
    ) -> AppResult<Option<ClosedLoan>>;
}

#[async_trait]
pub trait ReturnsStore: Send + Sync {
    async fn get_by_reservation(&self, reservation_id: i32) -> AppResult<Option<ReturnTransaction>>;

    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<ReturnTransaction>>;

    async fn set_payment_status(&self, reservation_id: i32, status: PaymentStatus) -> AppResult<()>;
}

#[async_trait]
pub trait PenaltiesStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Penalty>>;

    async fn list_for_user(&self, user_id: i32, unpaid_only: bool) -> AppResult<Vec<Penalty>>;

    async fn list_for_reservation(&self, reservation_id: i32) -> AppResult<Vec<Penalty>>;

    async fn outstanding_total(&self, user_id: i32) -> AppResult<Decimal>;

    /// Unpaid -> paid; `None` if already paid or missing
    async fn mark_paid(&self, id: i32, at: DateTime<Utc>) -> AppResult<Option<Penalty>>;

    async fn remove(&self, id: i32) -> AppResult<Option<Penalty>>;
}

/// User directory
#[async_trait]
pub trait UsersStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<User>>;

    async fn restrict(&self, id: i32, reason: &str, at: DateTime<Utc>) -> AppResult<()>;

    async fn unrestrict(&self, id: i32) -> AppResult<bool>;

    async fn set_penalty_summary(&self, id: i32, total: Decimal) -> AppResult<()>;
}

/// Book catalog and copy registry
#[async_trait]
pub trait BooksStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    /// `available_copies -= 1` only if it is positive
    async fn take_available(&self, book_id: i32) -> AppResult<bool>;

    /// `available_copies += 1`, capped at `total_copies`
    async fn restore_available(&self, book_id: i32) -> AppResult<()>;

    /// Reserve one available copy and decrement the aggregate count with it
    async fn allocate_copy(&self, book_id: i32) -> AppResult<Option<BookCopy>>;

    /// Put a reserved or borrowed copy back and restore the aggregate count
    async fn release_copy(&self, copy_id: i32) -> AppResult<bool>;

    /// Mark a copy borrowed and bump its borrow count
    async fn borrow_copy(&self, copy_id: i32) -> AppResult<()>;

    /// Withdraw a copy from circulation without restoring availability
    async fn retire_copy(&self, copy_id: i32, status: CopyStatus) -> AppResult<()>;
}

/// Main repository struct holding the store handles
#[derive(Clone)]
pub struct Repository {
    pub reservations: Arc<dyn ReservationsStore>,
    pub returns: Arc<dyn ReturnsStore>,
    pub penalties: Arc<dyn PenaltiesStore>,
    pub users: Arc<dyn UsersStore>,
    pub books: Arc<dyn BooksStore>,
}

impl Repository {
    /// Create a repository backed by the given Postgres pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            reservations: Arc::new(reservations::ReservationsRepository::new(pool.clone())),
            returns: Arc::new(returns::ReturnsRepository::new(pool.clone())),
            penalties: Arc::new(penalties::PenaltiesRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            books: Arc::new(books::BooksRepository::new(pool)),
        }
    }

    /// Create a repository where every store is the same in-memory instance
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            reservations: store.clone(),
            returns: store.clone(),
            penalties: store.clone(),
            users: store.clone(),
            books: store,
        }
    }
}
