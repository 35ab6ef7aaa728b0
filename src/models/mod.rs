//! Data models for Libris

pub mod book;
pub mod enums;
pub mod penalty;
pub mod reservation;
pub mod return_transaction;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookCopy};
pub use enums::{BookCondition, CopyStatus, DamageSeverity, PaymentStatus, PenaltyKind, ReservationStatus};
pub use penalty::{NewPenalty, Penalty, PenaltySummary};
pub use reservation::{
    CancelReservation, CreateReservation, DirectBorrowRequest, EligibilityQuery, NewReservation,
    Reservation, ReservationEvent, ReservationFilter, ReservationQuery, ReservationUpdate,
    ReservationView, StatusGuard,
};
pub use return_transaction::{NewReturnTransaction, ReturnRequest, ReturnTransaction, ReturnedAs};
pub use user::{Actor, Role, User, UserClaims};
