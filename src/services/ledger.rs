//! Penalty ledger: balances, settlement and administrative corrections

use std::sync::Arc;

use rust_decimal::Decimal;

use super::{
    clock::Clock,
    effects::{EffectDispatcher, NotificationKind, Operation, Transitioned},
};
use crate::{
    error::{AppError, AppResult},
    models::{Actor, PaymentStatus, Penalty, PenaltySummary, User},
    repository::Repository,
};

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    dispatcher: EffectDispatcher,
}

impl LedgerService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, dispatcher: EffectDispatcher) -> Self {
        Self {
            repository,
            clock,
            dispatcher,
        }
    }

    /// Copy the unpaid total onto the user's penalty flags
    pub async fn sync_summary(&self, user_id: i32) -> AppResult<Decimal> {
        let total = self.repository.penalties.outstanding_total(user_id).await?;
        self.repository.users.set_penalty_summary(user_id, total).await?;
        Ok(total)
    }

    /// Best-effort resync after a committed ledger change
    async fn resync(&self, user_id: i32) {
        if let Err(e) = self.sync_summary(user_id).await {
            tracing::warn!(user_id, "penalty summary not refreshed: {}", e);
        }
    }

    /// Flip the return transaction to paid once nothing on it is owed
    async fn refresh_payment_status(&self, reservation_id: i32) -> AppResult<()> {
        let unpaid = self
            .repository
            .penalties
            .list_for_reservation(reservation_id)
            .await?
            .iter()
            .any(|p| !p.is_paid);
        if !unpaid {
            self.repository
                .returns
                .set_payment_status(reservation_id, PaymentStatus::Paid)
                .await?;
        }
        Ok(())
    }

    pub async fn summary(&self, actor: &Actor, user_id: i32) -> AppResult<PenaltySummary> {
        actor.require_owner_or_staff(user_id)?;
        self.repository
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        let penalties = self.repository.penalties.list_for_user(user_id, false).await?;
        let total_pending: Decimal = penalties.iter().filter(|p| !p.is_paid).map(|p| p.amount).sum();
        Ok(PenaltySummary {
            user_id,
            total_pending,
            has_pending_penalties: total_pending > Decimal::ZERO,
            penalties,
        })
    }

    /// Record payment of one penalty
    pub async fn settle(&self, actor: &Actor, penalty_id: i32) -> AppResult<Penalty> {
        let op = Operation::new("settle_penalty", format!("penalty:{}", penalty_id), Some(actor.user_id));
        let result = self.try_settle(actor, penalty_id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_settle(&self, actor: &Actor, penalty_id: i32) -> AppResult<Transitioned<Penalty>> {
        actor.require_staff()?;
        let penalty = self
            .repository
            .penalties
            .mark_paid(penalty_id, self.clock.now())
            .await?;
        let Some(penalty) = penalty else {
            return Err(match self.repository.penalties.get(penalty_id).await? {
                Some(_) => AppError::Validation(format!("Penalty {} is already paid", penalty_id)),
                None => AppError::NotFound(format!("Penalty with id {} not found", penalty_id)),
            });
        };

        self.refresh_payment_status(penalty.reservation_id).await?;
        self.resync(penalty.user_id).await;

        let detail = format!("Penalty {} ({}) of {} settled", penalty.id, penalty.kind.as_str(), penalty.amount);
        Ok(Transitioned::new(penalty, detail))
    }

    /// Record payment of every unpaid penalty raised by one return
    pub async fn settle_return(&self, actor: &Actor, reservation_id: i32) -> AppResult<Vec<Penalty>> {
        let op = Operation::new(
            "settle_return_penalties",
            format!("reservation:{}", reservation_id),
            Some(actor.user_id),
        );
        let result = self.try_settle_return(actor, reservation_id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_settle_return(
        &self,
        actor: &Actor,
        reservation_id: i32,
    ) -> AppResult<Transitioned<Vec<Penalty>>> {
        actor.require_staff()?;
        let transaction = self
            .repository
            .returns
            .get_by_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No return recorded for reservation {}", reservation_id))
            })?;

        let now = self.clock.now();
        let mut settled = Vec::new();
        for p in self.repository.penalties.list_for_reservation(reservation_id).await? {
            if p.is_paid {
                continue;
            }
            // None means a concurrent settle got there first
            if let Some(paid) = self.repository.penalties.mark_paid(p.id, now).await? {
                settled.push(paid);
            }
        }

        self.refresh_payment_status(reservation_id).await?;
        self.resync(transaction.user_id).await;

        let total: Decimal = settled.iter().map(|p| p.amount).sum();
        let detail = format!(
            "Settled {} penalt{} totalling {} for reservation {}",
            settled.len(),
            if settled.len() == 1 { "y" } else { "ies" },
            total,
            reservation_id
        );
        Ok(Transitioned::new(settled, detail))
    }

    /// Administrative removal of a penalty
    pub async fn remove(&self, actor: &Actor, penalty_id: i32) -> AppResult<Penalty> {
        let op = Operation::new("remove_penalty", format!("penalty:{}", penalty_id), Some(actor.user_id));
        let result = self.try_remove(actor, penalty_id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_remove(&self, actor: &Actor, penalty_id: i32) -> AppResult<Transitioned<Penalty>> {
        actor.require_admin()?;
        let removed = self
            .repository
            .penalties
            .remove(penalty_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Penalty with id {} not found", penalty_id)))?;

        self.refresh_payment_status(removed.reservation_id).await?;
        self.resync(removed.user_id).await;

        let detail = format!(
            "Penalty {} ({}) of {} removed from user {}",
            removed.id, removed.kind.as_str(), removed.amount, removed.user_id
        );
        Ok(Transitioned::new(removed, detail))
    }

    /// Lift an account restriction
    pub async fn unrestrict(&self, actor: &Actor, user_id: i32) -> AppResult<User> {
        let op = Operation::new("unrestrict_user", format!("user:{}", user_id), Some(actor.user_id));
        let result = self.try_unrestrict(actor, user_id).await;
        self.dispatcher.finish(op, result).await
    }

    async fn try_unrestrict(&self, actor: &Actor, user_id: i32) -> AppResult<Transitioned<User>> {
        actor.require_admin()?;
        if !self.repository.users.unrestrict(user_id).await? {
            return Err(match self.repository.users.get(user_id).await? {
                Some(_) => AppError::Validation(format!("User {} is not restricted", user_id)),
                None => AppError::NotFound(format!("User with id {} not found", user_id)),
            });
        }
        let user = self
            .repository
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

        let detail = format!("Restriction lifted for {}", user.display_name());
        Ok(Transitioned::new(user, detail).notify(
            NotificationKind::AccountUnrestricted,
            user_id,
            None,
            "Your library account restriction has been lifted",
        ))
    }
}
