//! Business logic services

pub mod allocation;
pub mod audit;
pub mod borrowing;
pub mod clock;
pub mod effects;
pub mod eligibility;
pub mod email;
pub mod fees;
pub mod ledger;
pub mod reservations;
pub mod returns;
pub mod sweeper;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

use self::{clock::Clock, effects::EffectDispatcher};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub sweeper: sweeper::ExpirySweeper,
    pub reservations: reservations::ReservationsService,
    pub returns: returns::ReturnsService,
    pub ledger: ledger::LedgerService,
    pub borrowing: borrowing::BorrowingService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        dispatcher: EffectDispatcher,
    ) -> Self {
        let sweeper = sweeper::ExpirySweeper::new(
            repository.clone(),
            clock.clone(),
            config.lending.pickup_window(),
            dispatcher.clone(),
        );
        let ledger = ledger::LedgerService::new(repository.clone(), clock.clone(), dispatcher.clone());

        Self {
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                clock.clone(),
                config.lending.clone(),
                dispatcher.clone(),
                sweeper.clone(),
            ),
            returns: returns::ReturnsService::new(
                repository.clone(),
                clock.clone(),
                config.penalties.clone(),
                dispatcher.clone(),
                ledger.clone(),
            ),
            borrowing: borrowing::BorrowingService::new(
                repository,
                clock.clone(),
                config.lending.clone(),
                dispatcher,
            ),
            ledger,
            sweeper,
            clock,
        }
    }
}
