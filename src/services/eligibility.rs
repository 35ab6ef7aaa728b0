//! Borrowing eligibility
//!
//! Reservation creation and walk-in checkout both go through [`ensure_eligible`].
//! Checks run in a fixed order: restriction, unpaid penalties, availability,
//! duplicate hold. The first failure wins.

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult, EligibilityError},
    models::{Book, User},
    repository::Repository,
};

/// Everything the verdict depends on, read from the stores
#[derive(Debug, Clone)]
pub struct EligibilityFacts {
    pub user: User,
    pub book: Book,
    pub outstanding: Decimal,
    pub has_active_hold: bool,
}

impl EligibilityFacts {
    pub async fn gather(repository: &Repository, user_id: i32, book_id: i32) -> AppResult<Self> {
        let user = repository
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;
        let book = repository
            .books
            .get(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        let outstanding = repository.penalties.outstanding_total(user_id).await?;
        let has_active_hold = repository.reservations.has_active_hold(user_id, book_id).await?;

        Ok(Self {
            user,
            book,
            outstanding,
            has_active_hold,
        })
    }

    pub fn verdict(&self) -> Result<(), EligibilityError> {
        if self.user.is_restricted {
            return Err(EligibilityError::Restricted {
                reason: self
                    .user
                    .restriction_reason
                    .clone()
                    .unwrap_or_else(|| "Restricted by library staff".to_string()),
            });
        }
        if self.outstanding > Decimal::ZERO {
            return Err(EligibilityError::UnpaidPenalties {
                total: self.outstanding,
            });
        }
        if self.book.available_copies <= 0 {
            return Err(EligibilityError::NoCopiesAvailable);
        }
        if self.has_active_hold {
            return Err(EligibilityError::DuplicateHold);
        }
        Ok(())
    }
}

/// Gather facts and fail with the first eligibility error
pub async fn ensure_eligible(
    repository: &Repository,
    user_id: i32,
    book_id: i32,
) -> AppResult<EligibilityFacts> {
    let facts = EligibilityFacts::gather(repository, user_id, book_id).await?;
    facts.verdict()?;
    Ok(facts)
}

/// Eligibility report for the walk-in desk
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EligibilityReport {
    pub user_id: i32,
    pub book_id: i32,
    pub eligible: bool,
    /// Machine-readable code of the first failed check
    pub code: Option<u32>,
    pub reason: Option<String>,
    pub is_restricted: bool,
    #[schema(value_type = String)]
    pub pending_penalties: Decimal,
    pub available_copies: i32,
    pub has_active_hold: bool,
}

impl From<&EligibilityFacts> for EligibilityReport {
    fn from(facts: &EligibilityFacts) -> Self {
        let failure = facts.verdict().err();
        Self {
            user_id: facts.user.id,
            book_id: facts.book.id,
            eligible: failure.is_none(),
            code: failure.as_ref().map(|e| e.code() as u32),
            reason: failure.map(|e| e.to_string()),
            is_restricted: facts.user.is_restricted,
            pending_penalties: facts.outstanding,
            available_copies: facts.book.available_copies,
            has_active_hold: facts.has_active_hold,
        }
    }
}
