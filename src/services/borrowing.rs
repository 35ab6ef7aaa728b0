//! Walk-in checkout at the desk

use std::sync::Arc;

use super::{
    allocation::CopyAllocator,
    clock::Clock,
    effects::{EffectDispatcher, NotificationKind, Operation, Transitioned},
    eligibility::{self, EligibilityFacts, EligibilityReport},
};
use crate::{
    config::LendingConfig,
    error::{AppResult, EligibilityError},
    models::{Actor, DirectBorrowRequest, NewReservation, Reservation, ReservationStatus},
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowingService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    lending: LendingConfig,
    dispatcher: EffectDispatcher,
}

impl BorrowingService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        lending: LendingConfig,
        dispatcher: EffectDispatcher,
    ) -> Self {
        Self {
            repository,
            clock,
            lending,
            dispatcher,
        }
    }

    pub async fn check_eligibility(
        &self,
        actor: &Actor,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<EligibilityReport> {
        actor.require_owner_or_staff(user_id)?;
        let facts = EligibilityFacts::gather(&self.repository, user_id, book_id).await?;
        Ok(EligibilityReport::from(&facts))
    }

    /// Check out a book with no reservation; the loan starts as borrowed
    pub async fn process_direct_borrowing(
        &self,
        actor: &Actor,
        request: DirectBorrowRequest,
    ) -> AppResult<Reservation> {
        let op = Operation::new(
            "direct_borrow",
            format!("book:{}", request.book_id),
            Some(actor.user_id),
        );
        let result = self.try_direct_borrow(actor, request).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_direct_borrow(
        &self,
        actor: &Actor,
        request: DirectBorrowRequest,
    ) -> AppResult<Transitioned<Reservation>> {
        actor.require_staff()?;
        let facts = eligibility::ensure_eligible(&self.repository, request.user_id, request.book_id).await?;

        let allocator = CopyAllocator::for_book(&facts.book);
        let books = self.repository.books.as_ref();
        let hold = allocator
            .allocate(books, facts.book.id)
            .await?
            .ok_or(EligibilityError::NoCopiesAvailable)?;

        let now = self.clock.now();
        let inserted = self
            .repository
            .reservations
            .insert(NewReservation {
                user_id: request.user_id,
                book_id: request.book_id,
                status: ReservationStatus::Borrowed,
                reservation_date: now,
                approval_date: Some(now),
                borrow_date: Some(now),
                due_date: Some(now + self.lending.loan_period()),
                copy_id: hold.copy_id,
                copy_label: hold.copy_label.clone(),
                is_walk_in: true,
            })
            .await;
        let reservation = match inserted {
            Ok(r) => r,
            Err(e) => {
                if let Err(release) = allocator.release(books, facts.book.id, hold.copy_id).await {
                    tracing::error!(book_id = facts.book.id, "hold leaked after failed walk-in: {}", release);
                }
                return Err(e);
            }
        };

        if let Err(e) = allocator.mark_borrowed(books, reservation.copy_id).await {
            tracing::warn!(reservation_id = reservation.id, copy_id = ?reservation.copy_id, "copy not stamped as borrowed: {}", e);
        }

        let due = reservation.due_date.map(|d| d.to_rfc3339()).unwrap_or_default();
        let detail = format!(
            "Walk-in checkout of '{}' to {} (reservation {}), due {}",
            facts.book.title,
            facts.user.display_name(),
            reservation.id,
            due
        );
        let (user_id, id) = (reservation.user_id, reservation.id);
        Ok(Transitioned::new(reservation, detail).notify(
            NotificationKind::BookBorrowed,
            user_id,
            Some(id),
            format!("'{}' checked out. Please return it by {}", facts.book.title, due),
        ))
    }
}
