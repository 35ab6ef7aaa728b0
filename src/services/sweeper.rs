//! Expiry of unclaimed approvals

use std::sync::Arc;

use chrono::Duration;

use super::{
    allocation::CopyAllocator,
    clock::Clock,
    effects::{EffectDispatcher, NotificationKind, Operation, Transitioned},
};
use crate::{
    error::{AppError, AppResult},
    models::{reservation::next_status, ReservationEvent, ReservationStatus},
    repository::Repository,
};

/// Cancellation reason stamped on swept reservations
pub const PICKUP_EXPIRED_REASON: &str = "Pickup window elapsed";

#[derive(Clone)]
pub struct ExpirySweeper {
    repository: Repository,
    clock: Arc<dyn Clock>,
    window: Duration,
    dispatcher: EffectDispatcher,
}

impl ExpirySweeper {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        window: Duration,
        dispatcher: EffectDispatcher,
    ) -> Self {
        Self {
            repository,
            clock,
            window,
            dispatcher,
        }
    }

    /// Cancel every approval older than the pickup window and release its hold.
    /// Returns the number of reservations this call cancelled.
    pub async fn sweep(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - self.window;
        let to = next_status(ReservationStatus::Approved, false, ReservationEvent::Expire)
            .ok_or_else(|| AppError::Internal("approved reservations cannot expire".to_string()))?;
        let expired = self
            .repository
            .reservations
            .cancel_expired(cutoff, to, PICKUP_EXPIRED_REASON)
            .await?;

        if expired.is_empty() {
            tracing::debug!(%cutoff, "expiry sweep cancelled nothing");
            return Ok(0);
        }

        let mut done = Transitioned::new(
            expired.len(),
            format!("Cancelled {} approval(s) past the pickup window", expired.len()),
        );
        for r in &expired {
            let allocator = CopyAllocator::for_reservation(r);
            if let Err(e) = allocator
                .release(self.repository.books.as_ref(), r.book_id, r.copy_id)
                .await
            {
                tracing::warn!(reservation_id = r.id, book_id = r.book_id, "hold not released after expiry: {}", e);
            }
            done = done.notify(
                NotificationKind::ReservationExpired,
                r.user_id,
                Some(r.id),
                format!(
                    "Reservation {} was cancelled because the book was not picked up in time",
                    r.id
                ),
            );
        }

        self.dispatcher
            .finish(Operation::new("sweep_expired_approvals", "reservations", None), Ok(done))
            .await
    }
}
