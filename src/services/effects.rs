//! Post-transition side effects
//!
//! A committed transition carries an ordered list of effects (audit entry,
//! notifications). The dispatcher runs each one in isolation: a failing sink is
//! logged and skipped, and never undoes or fails the transition itself.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::clock::Clock;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReservationCreated,
    ReservationApproved,
    ReservationRejected,
    ReservationCancelled,
    ReservationExpired,
    BookBorrowed,
    BookReturned,
    RenewalRequested,
    RenewalApproved,
    RenewalRejected,
    AccountRestricted,
    AccountUnrestricted,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::ReservationCreated => "Reservation received",
            NotificationKind::ReservationApproved => "Reservation approved - ready for pickup",
            NotificationKind::ReservationRejected => "Reservation rejected",
            NotificationKind::ReservationCancelled => "Reservation cancelled",
            NotificationKind::ReservationExpired => "Reservation expired",
            NotificationKind::BookBorrowed => "Book checked out",
            NotificationKind::BookReturned => "Book returned",
            NotificationKind::RenewalRequested => "Renewal requested",
            NotificationKind::RenewalApproved => "Renewal approved",
            NotificationKind::RenewalRejected => "Renewal rejected",
            NotificationKind::AccountRestricted => "Account restricted",
            NotificationKind::AccountUnrestricted => "Account restriction lifted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub user_id: i32,
    pub reservation_id: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<i32>,
    pub action: String,
    pub entity: String,
    pub success: bool,
    pub detail: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify(Notification),
    Audit(AuditEntry),
}

/// A committed transition's value plus what should happen afterwards
#[derive(Debug)]
pub struct Transitioned<T> {
    pub value: T,
    pub detail: String,
    pub effects: Vec<Effect>,
}

impl<T> Transitioned<T> {
    pub fn new(value: T, detail: impl Into<String>) -> Self {
        Self {
            value,
            detail: detail.into(),
            effects: Vec::new(),
        }
    }

    pub fn notify(
        mut self,
        kind: NotificationKind,
        user_id: i32,
        reservation_id: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        self.effects.push(Effect::Notify(Notification {
            kind,
            user_id,
            reservation_id,
            message: message.into(),
        }));
        self
    }
}

/// Names the audited operation: action, entity and who did it
#[derive(Debug, Clone)]
pub struct Operation {
    pub action: &'static str,
    pub entity: String,
    pub actor_id: Option<i32>,
}

impl Operation {
    pub fn new(action: &'static str, entity: impl Into<String>, actor_id: Option<i32>) -> Self {
        Self {
            action,
            entity: entity.into(),
            actor_id,
        }
    }
}

#[derive(Clone)]
pub struct EffectDispatcher {
    notifier: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl EffectDispatcher {
    pub fn new(
        notifier: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier,
            audit,
            clock,
        }
    }

    /// Audit the outcome of `op`, run the transition's effects, and hand back its value
    pub async fn finish<T>(&self, op: Operation, result: AppResult<Transitioned<T>>) -> AppResult<T> {
        match result {
            Ok(done) => {
                tracing::info!(action = op.action, entity = %op.entity, "{}", done.detail);
                let entry = self.entry(&op, true, done.detail);
                let mut effects = Vec::with_capacity(done.effects.len() + 1);
                effects.push(Effect::Audit(entry));
                effects.extend(done.effects);
                self.dispatch(effects).await;
                Ok(done.value)
            }
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(action = op.action, entity = %op.entity, "{}", e);
                } else {
                    tracing::debug!(action = op.action, entity = %op.entity, "rejected: {}", e);
                }
                let entry = self.entry(&op, false, e.to_string());
                self.dispatch(vec![Effect::Audit(entry)]).await;
                Err(e)
            }
        }
    }

    pub async fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            let outcome = match &effect {
                Effect::Notify(n) => self.notifier.notify(n).await,
                Effect::Audit(a) => self.audit.record(a).await,
            };
            if let Err(e) = outcome {
                tracing::warn!(?effect, "side effect failed and was skipped: {}", e);
            }
        }
    }

    fn entry(&self, op: &Operation, success: bool, detail: String) -> AuditEntry {
        AuditEntry {
            occurred_at: self.clock.now(),
            actor_id: op.actor_id,
            action: op.action.to_string(),
            entity: op.entity.clone(),
            success,
            detail,
        }
    }
}

/// Notification sink that only writes to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, n: &Notification) -> AppResult<()> {
        tracing::info!(target: "notifications", kind = ?n.kind, user_id = n.user_id, reservation_id = ?n.reservation_id, "{}", n.message);
        Ok(())
    }
}

/// Audit sink that emits structured log events
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, e: &AuditEntry) -> AppResult<()> {
        tracing::info!(
            target: "audit",
            action = %e.action,
            entity = %e.entity,
            actor_id = ?e.actor_id,
            success = e.success,
            "{}",
            e.detail
        );
        Ok(())
    }
}

/// Collects notifications in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifier {
    async fn notify(&self, n: &Notification) -> AppResult<()> {
        self.sent
            .lock()
            .map_err(|_| AppError::Internal("notifier lock poisoned".to_string()))?
            .push(n.clone());
        Ok(())
    }
}

/// Collects audit entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, e: &AuditEntry) -> AppResult<()> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("audit lock poisoned".to_string()))?
            .push(e.clone());
        Ok(())
    }
}
