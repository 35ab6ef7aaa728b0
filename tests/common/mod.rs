//! Shared fixtures: services over the in-memory store with a manual clock

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use libris_server::{
    config::{AppConfig, StorageBackend},
    models::{Actor, Book, CreateReservation, Reservation, Role, User},
    repository::{memory::MemoryStore, BooksStore, PenaltiesStore, Repository, UsersStore},
    services::{
        clock::ManualClock,
        effects::{MemoryAuditSink, MemoryNotifier},
        Services,
    },
    AppState,
};

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StorageBackend::Memory;
    config.auth.jwt_secret = "test-secret".to_string();
    config
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<MemoryNotifier>,
    pub audit: Arc<MemoryAuditSink>,
    pub state: AppState,
    pub librarian: Actor,
    pub admin: Actor,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(|repository| repository).await
    }

    /// Build with a hook to swap individual stores (e.g. a failing one)
    pub async fn build(customize: impl FnOnce(Repository) -> Repository) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let notifier = Arc::new(MemoryNotifier::default());
        let audit = Arc::new(MemoryAuditSink::default());

        let librarian = store.add_user("librarian", Role::Librarian).await;
        let admin = store.add_user("admin", Role::Admin).await;

        let repository = customize(Repository::in_memory(store.clone()));
        let state = AppState::new(
            test_config(),
            repository,
            notifier.clone(),
            audit.clone(),
            clock.clone(),
        );

        Self {
            store,
            clock,
            notifier,
            audit,
            state,
            librarian: Actor::new(librarian.id, Role::Librarian),
            admin: Actor::new(admin.id, Role::Admin),
        }
    }

    pub fn services(&self) -> &Services {
        &self.state.services
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn student(&self, login: &str) -> Actor {
        let user = self.store.add_user(login, Role::Student).await;
        Actor::new(user.id, Role::Student)
    }

    pub async fn book(&self, title: &str, copies: i32) -> Book {
        self.store.add_book(title, copies, false).await
    }

    pub async fn managed_book(&self, title: &str, copies: i32) -> Book {
        self.store.add_book(title, copies, true).await
    }

    pub async fn user(&self, id: i32) -> User {
        UsersStore::get(self.store.as_ref(), id).await.unwrap().unwrap()
    }

    pub async fn book_state(&self, id: i32) -> Book {
        BooksStore::get(self.store.as_ref(), id).await.unwrap().unwrap()
    }

    pub async fn outstanding(&self, user_id: i32) -> Decimal {
        PenaltiesStore::outstanding_total(self.store.as_ref(), user_id)
            .await
            .unwrap()
    }

    pub async fn reserve(&self, student: &Actor, book_id: i32) -> Reservation {
        self.services()
            .reservations
            .create(student, CreateReservation { user_id: None, book_id })
            .await
            .unwrap()
    }

    pub async fn approved(&self, student: &Actor, book_id: i32) -> Reservation {
        let r = self.reserve(student, book_id).await;
        self.services()
            .reservations
            .approve(&self.librarian, r.id)
            .await
            .unwrap()
    }

    /// Reserve, approve and hand over in one go
    pub async fn borrowed(&self, student: &Actor, book_id: i32) -> Reservation {
        let r = self.approved(student, book_id).await;
        self.services()
            .reservations
            .mark_borrowed(&self.librarian, r.id)
            .await
            .unwrap()
    }
}
