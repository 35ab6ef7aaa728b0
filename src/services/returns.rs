//! Return processing
//!
//! Closing the loan (status, return transaction, penalty rows) is one store
//! transaction. Copy availability, the lost-book restriction and the penalty
//! summary follow it; if any of those fail the return still stands and the
//! failure is reported back in [`ReturnOutcome::warnings`].

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use super::{
    allocation::CopyAllocator,
    clock::Clock,
    effects::{EffectDispatcher, NotificationKind, Operation, Transitioned},
    fees,
    ledger::LedgerService,
};
use crate::{
    config::PenaltyConfig,
    error::{AppError, AppResult},
    models::{
        Actor, BookCondition, NewPenalty, NewReturnTransaction, Penalty, Reservation,
        ReservationEvent, ReturnTransaction,
    },
    repository::Repository,
};

/// What a return did, including any follow-up that failed
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub reservation: Reservation,
    pub transaction: ReturnTransaction,
    pub penalties: Vec<Penalty>,
    /// The copy went back on the shelf
    pub returned_to_circulation: bool,
    /// Lost-book restriction written to the account
    pub account_restricted: bool,
    /// True when the return is recorded but a follow-up write failed
    pub partial_success: bool,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ReturnsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    schedule: PenaltyConfig,
    dispatcher: EffectDispatcher,
    ledger: LedgerService,
}

impl ReturnsService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        schedule: PenaltyConfig,
        dispatcher: EffectDispatcher,
        ledger: LedgerService,
    ) -> Self {
        Self {
            repository,
            clock,
            schedule,
            dispatcher,
            ledger,
        }
    }

    /// Return transaction recorded for a reservation (owner or staff)
    pub async fn get_return(&self, actor: &Actor, reservation_id: i32) -> AppResult<ReturnTransaction> {
        let transaction = self
            .repository
            .returns
            .get_by_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No return recorded for reservation {}", reservation_id))
            })?;
        actor.require_owner_or_staff(transaction.user_id)?;
        Ok(transaction)
    }

    pub async fn process_return(
        &self,
        actor: &Actor,
        reservation_id: i32,
        condition: BookCondition,
    ) -> AppResult<ReturnOutcome> {
        let op = Operation::new(
            "process_return",
            format!("reservation:{}", reservation_id),
            Some(actor.user_id),
        );
        let result = self.try_process_return(actor, reservation_id, condition).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_process_return(
        &self,
        actor: &Actor,
        id: i32,
        condition: BookCondition,
    ) -> AppResult<Transitioned<ReturnOutcome>> {
        actor.require_staff()?;
        let current = self
            .repository
            .reservations
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;
        let to = current.transition(ReservationEvent::Return)?;

        let title = self
            .repository
            .books
            .get(current.book_id)
            .await?
            .map(|b| b.title)
            .unwrap_or_else(|| format!("book #{}", current.book_id));

        let now = self.clock.now();
        let assessment = fees::assess(&self.schedule, current.due_date, now, condition);
        let transaction = NewReturnTransaction {
            reservation_id: id,
            book_id: current.book_id,
            user_id: current.user_id,
            borrow_date: current.borrow_date,
            due_date: current.due_date,
            return_date: now,
            minutes_late: assessment.minutes_late,
            late_fee: assessment.late_fee,
            condition,
            condition_penalty: assessment.condition_penalty,
            total_penalty: assessment.total(),
        };
        let penalties = assessment
            .lines(condition)
            .into_iter()
            .map(|(kind, amount)| NewPenalty {
                user_id: current.user_id,
                reservation_id: id,
                book_id: current.book_id,
                kind,
                amount,
                created_at: now,
            })
            .collect();

        let closed = self
            .repository
            .reservations
            .close_loan(id, to, transaction, penalties)
            .await?;
        let Some(closed) = closed else {
            let actual = match self.repository.reservations.get(id).await? {
                Some(r) => r.status,
                None => return Err(AppError::NotFound(format!("Reservation with id {} not found", id))),
            };
            return Err(AppError::StateConflict {
                id,
                action: ReservationEvent::Return.name(),
                actual,
            });
        };

        let user_id = closed.reservation.user_id;
        let mut warnings = Vec::new();

        let allocator = CopyAllocator::for_reservation(&closed.reservation);
        let returned_to_circulation = match allocator
            .settle_return(self.repository.books.as_ref(), &closed.reservation, condition)
            .await
        {
            Ok(restored) => restored,
            Err(e) => {
                tracing::warn!(reservation_id = id, book_id = closed.reservation.book_id, "copy availability not restored: {}", e);
                warnings.push(format!("Return recorded but copy availability was not updated: {}", e));
                false
            }
        };

        let mut account_restricted = false;
        if condition == BookCondition::Lost {
            let reason = format!("Lost book: {}", title);
            match self.repository.users.restrict(user_id, &reason, now).await {
                Ok(()) => account_restricted = true,
                Err(e) => {
                    tracing::warn!(reservation_id = id, user_id, "lost-book restriction not applied: {}", e);
                    warnings.push(format!("Return recorded but the account restriction failed: {}", e));
                }
            }
        }

        if let Err(e) = self.ledger.sync_summary(user_id).await {
            tracing::warn!(user_id, "penalty summary not refreshed: {}", e);
            warnings.push(format!("Return recorded but the penalty summary was not refreshed: {}", e));
        }

        let total = closed.transaction.total_penalty;
        let mut detail = format!(
            "Reservation {} returned ({}), {} minute(s) late, total penalty {} {}",
            id, condition, closed.transaction.minutes_late, total, self.schedule.currency
        );
        if !warnings.is_empty() {
            detail.push_str(" [partial success]");
        }

        let outcome = ReturnOutcome {
            reservation: closed.reservation,
            transaction: closed.transaction,
            penalties: closed.penalties,
            returned_to_circulation,
            account_restricted,
            partial_success: !warnings.is_empty(),
            warnings,
        };

        let mut done = Transitioned::new(outcome, detail).notify(
            NotificationKind::BookReturned,
            user_id,
            Some(id),
            format!(
                "'{}' was returned ({}). Amount due: {} {}",
                title, condition, total, self.schedule.currency
            ),
        );
        if account_restricted {
            done = done.notify(
                NotificationKind::AccountRestricted,
                user_id,
                Some(id),
                format!("Your account is restricted: lost book '{}'", title),
            );
        }
        Ok(done)
    }
}
