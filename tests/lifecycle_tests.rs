//! Reservation lifecycle against the in-memory store

mod common;

use chrono::Duration;
use rust_decimal::Decimal;

use common::Harness;
use libris_server::{
    error::{AppError, EligibilityError, ErrorCode},
    models::{
        BookCondition, CopyStatus, CreateReservation, ReservationStatus, ReservationView,
    },
    repository::UsersStore,
    services::{effects::NotificationKind, sweeper::PICKUP_EXPIRED_REASON},
};

fn code(err: &AppError) -> ErrorCode {
    err.code()
}

#[tokio::test]
async fn create_records_a_pending_reservation() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("El Filibusterismo", 2).await;

    let r = h.reserve(&ana, book.id).await;

    assert_eq!(r.status, ReservationStatus::Pending);
    assert_eq!(r.reservation_date, common::t0());
    assert_eq!(r.due_date, None);
    // availability is only taken at approval
    assert_eq!(h.book_state(book.id).await.available_copies, 2);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ReservationCreated);
    let audit = h.audit.entries();
    assert_eq!(audit.last().unwrap().action, "create_reservation");
    assert!(audit.last().unwrap().success);
}

#[tokio::test]
async fn duplicate_hold_has_its_own_code() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Dekada '70", 3).await;
    h.reserve(&ana, book.id).await;

    let err = h
        .services()
        .reservations
        .create(&ana, CreateReservation { user_id: None, book_id: book.id })
        .await
        .unwrap_err();

    assert_eq!(code(&err), ErrorCode::DuplicateHold);
    let last = h.audit.entries().pop().unwrap();
    assert!(!last.success);
}

#[tokio::test]
async fn duplicate_hold_covers_borrowed_loans() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Ibong Adarna", 3).await;
    h.borrowed(&ana, book.id).await;

    let err = h
        .services()
        .reservations
        .create(&ana, CreateReservation { user_id: None, book_id: book.id })
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::DuplicateHold);
}

#[tokio::test]
async fn unpaid_penalties_block_regardless_of_availability() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let first = h.book("Florante at Laura", 1).await;

    let r = h.borrowed(&ana, first.id).await;
    h.advance(Duration::days(14) + Duration::minutes(5));
    h.services()
        .returns
        .process_return(&h.librarian, r.id, BookCondition::Good)
        .await
        .unwrap();
    assert!(h.outstanding(ana.user_id).await > Decimal::ZERO);

    for copies in [0, 1, 4] {
        let book = h.book(&format!("Title with {} copies", copies), copies).await;
        let err = h
            .services()
            .reservations
            .create(&ana, CreateReservation { user_id: None, book_id: book.id })
            .await
            .unwrap_err();
        assert_eq!(code(&err), ErrorCode::UnpaidPenalties);
    }
}

#[tokio::test]
async fn restricted_accounts_are_blocked_before_anything_else() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Banaag at Sikat", 0).await;
    UsersStore::restrict(h.store.as_ref(), ana.user_id, "Lost book: Noli", common::t0())
        .await
        .unwrap();

    let err = h
        .services()
        .reservations
        .create(&ana, CreateReservation { user_id: None, book_id: book.id })
        .await
        .unwrap_err();

    match err {
        AppError::Eligibility(EligibilityError::Restricted { reason }) => {
            assert_eq!(reason, "Lost book: Noli")
        }
        other => panic!("expected restriction, got {other:?}"),
    }
}

#[tokio::test]
async fn no_available_copies_fails_with_availability_code() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Out of stock", 0).await;

    let err = h
        .services()
        .reservations
        .create(&ana, CreateReservation { user_id: None, book_id: book.id })
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::NoCopiesAvailable);
}

#[tokio::test]
async fn students_cannot_reserve_for_someone_else() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.book("Mga Ibong Mandaragit", 1).await;

    let err = h
        .services()
        .reservations
        .create(&ana, CreateReservation { user_id: Some(ben.user_id), book_id: book.id })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let r = h
        .services()
        .reservations
        .create(&h.librarian, CreateReservation { user_id: Some(ben.user_id), book_id: book.id })
        .await
        .unwrap();
    assert_eq!(r.user_id, ben.user_id);
}

#[tokio::test]
async fn approve_stamps_dates_and_takes_a_copy() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Sa Mga Kuko ng Liwanag", 2).await;
    let r = h.reserve(&ana, book.id).await;
    h.advance(Duration::hours(3));

    let approved = h
        .services()
        .reservations
        .approve(&h.librarian, r.id)
        .await
        .unwrap();

    let now = common::t0() + Duration::hours(3);
    assert_eq!(approved.status, ReservationStatus::Approved);
    assert_eq!(approved.approval_date, Some(now));
    assert_eq!(approved.due_date, Some(now + Duration::days(14)));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
}

#[tokio::test]
async fn copy_managed_titles_hold_a_labelled_copy() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.managed_book("Reference Atlas", 2).await;

    let approved = h.approved(&ana, book.id).await;
    assert!(approved.copy_id.is_some());
    assert!(approved.copy_label.as_deref().unwrap().starts_with(&format!("B{}-", book.id)));

    let borrowed = h
        .services()
        .reservations
        .mark_borrowed(&h.librarian, approved.id)
        .await
        .unwrap();
    let copies = h.store.copies_of(book.id).await;
    let held = copies.iter().find(|c| Some(c.id) == borrowed.copy_id).unwrap();
    assert_eq!(held.status, CopyStatus::Borrowed);
    assert_eq!(held.borrow_count, 1);
}

#[tokio::test]
async fn students_cannot_approve() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Tagalog Grammar", 1).await;
    let r = h.reserve(&ana, book.id).await;

    let err = h.services().reservations.approve(&ana, r.id).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
}

#[tokio::test]
async fn concurrent_approvals_on_the_last_copy_allocate_once() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.book("Last Copy", 1).await;
    let ra = h.reserve(&ana, book.id).await;
    let rb = h.reserve(&ben, book.id).await;

    let svc = &h.services().reservations;
    let (a, b) = tokio::join!(svc.approve(&h.librarian, ra.id), svc.approve(&h.admin, rb.id));

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert_eq!(loser.code(), ErrorCode::NoCopiesAvailable);
    assert_eq!(h.book_state(book.id).await.available_copies, 0);
}

#[tokio::test]
async fn concurrent_approvals_of_one_reservation_keep_one_hold() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Two Copies", 2).await;
    let r = h.reserve(&ana, book.id).await;

    let svc = &h.services().reservations;
    let (a, b) = tokio::join!(svc.approve(&h.librarian, r.id), svc.approve(&h.admin, r.id));

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert_eq!(loser.code(), ErrorCode::StateConflict);
    // the losing approval gave its copy back
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
}

#[tokio::test]
async fn out_of_order_events_conflict_and_leave_the_record_alone() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Ordering", 1).await;
    let r = h.reserve(&ana, book.id).await;

    let err = h
        .services()
        .returns
        .process_return(&h.librarian, r.id, BookCondition::Good)
        .await
        .unwrap_err();
    match err {
        AppError::StateConflict { actual, .. } => assert_eq!(actual, ReservationStatus::Pending),
        other => panic!("expected conflict, got {other:?}"),
    }

    let err = h
        .services()
        .reservations
        .mark_borrowed(&h.librarian, r.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);

    h.services().reservations.reject(&h.librarian, r.id).await.unwrap();
    let err = h
        .services()
        .reservations
        .approve(&h.librarian, r.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);

    let stored = h.services().reservations.get(&ana, r.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Rejected);
    assert_eq!(stored.approval_date, None);
}

#[tokio::test]
async fn sweep_respects_the_pickup_window() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Pickup", 1).await;
    let r = h.approved(&ana, book.id).await;
    assert_eq!(h.book_state(book.id).await.available_copies, 0);

    h.advance(Duration::minutes(1));
    assert_eq!(h.services().sweeper.sweep().await.unwrap(), 0);
    let still = h.services().reservations.get(&ana, r.id).await.unwrap();
    assert_eq!(still.status, ReservationStatus::Approved);

    h.advance(Duration::minutes(2));
    assert_eq!(h.services().sweeper.sweep().await.unwrap(), 1);
    let expired = h.services().reservations.get(&ana, r.id).await.unwrap();
    assert_eq!(expired.status, ReservationStatus::Cancelled);
    assert_eq!(expired.cancellation_reason.as_deref(), Some(PICKUP_EXPIRED_REASON));
    assert!(expired.pickup_expired);
    assert_eq!(h.book_state(book.id).await.available_copies, 1);

    // a second sweep is a no-op
    assert_eq!(h.services().sweeper.sweep().await.unwrap(), 0);
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
    assert!(h
        .notifier
        .sent()
        .iter()
        .any(|n| n.kind == NotificationKind::ReservationExpired && n.reservation_id == Some(r.id)));
}

#[tokio::test]
async fn concurrent_sweeps_cancel_each_reservation_once() {
    let h = Harness::new().await;
    let book = h.book("Busy Title", 3).await;
    for login in ["ana", "ben", "cat"] {
        let s = h.student(login).await;
        h.approved(&s, book.id).await;
    }
    h.advance(Duration::minutes(5));

    let sweeper = &h.services().sweeper;
    let (a, b) = tokio::join!(sweeper.sweep(), sweeper.sweep());
    assert_eq!(a.unwrap() + b.unwrap(), 3);
    assert_eq!(h.book_state(book.id).await.available_copies, 3);
}

#[tokio::test]
async fn listing_sweeps_before_reading() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Listed", 1).await;
    let r = h.approved(&ana, book.id).await;
    h.advance(Duration::minutes(3));

    let svc = &h.services().reservations;
    assert!(svc.list(&h.librarian, ReservationView::Approved).await.unwrap().is_empty());
    let cancelled = svc.list(&h.librarian, ReservationView::Cancelled).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, r.id);

    let err = svc.list(&ana, ReservationView::Pending).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
async fn pickup_after_the_window_is_refused() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Late Pickup", 1).await;
    let r = h.approved(&ana, book.id).await;
    h.advance(Duration::minutes(2) + Duration::seconds(1));

    let err = h
        .services()
        .reservations
        .mark_borrowed(&h.librarian, r.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PickupWindowElapsed(id) if id == r.id));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
}

#[tokio::test]
async fn manual_cancel_is_not_reported_as_an_expired_pickup() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Cancelled At The Desk", 1).await;
    let r = h.approved(&ana, book.id).await;

    let cancelled = h
        .services()
        .reservations
        .cancel(&h.librarian, r.id, Some(PICKUP_EXPIRED_REASON.to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some(PICKUP_EXPIRED_REASON));
    assert!(!cancelled.pickup_expired);

    let err = h
        .services()
        .reservations
        .mark_borrowed(&h.librarian, r.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);
    assert!(!matches!(err, AppError::PickupWindowElapsed(_)));
}

#[tokio::test]
async fn pickup_restarts_the_loan_period() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Pickup In Time", 1).await;
    let r = h.approved(&ana, book.id).await;
    h.advance(Duration::seconds(90));

    let borrowed = h
        .services()
        .reservations
        .mark_borrowed(&h.librarian, r.id)
        .await
        .unwrap();
    let picked_up = common::t0() + Duration::seconds(90);
    assert_eq!(borrowed.status, ReservationStatus::Borrowed);
    assert_eq!(borrowed.borrow_date, Some(picked_up));
    assert_eq!(borrowed.due_date, Some(picked_up + Duration::days(14)));

    // borrowed loans are out of the sweeper's reach
    h.advance(Duration::hours(1));
    assert_eq!(h.services().sweeper.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn renewal_extends_from_the_prior_due_date() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Renewable", 1).await;
    let r = h.borrowed(&ana, book.id).await;
    let prior_due = r.due_date.unwrap();
    h.advance(Duration::days(5));

    let svc = &h.services().reservations;
    let requested = svc.request_renewal(&ana, r.id).await.unwrap();
    assert!(requested.renewal_requested);
    assert_eq!(requested.status, ReservationStatus::Borrowed);

    let again = svc.request_renewal(&ana, r.id).await.unwrap_err();
    assert_eq!(again.code(), ErrorCode::StateConflict);

    let renewed = svc.approve_renewal(&h.librarian, r.id).await.unwrap();
    assert!(!renewed.renewal_requested);
    assert_eq!(renewed.renewal_count, 1);
    assert_eq!(renewed.due_date, Some(prior_due + Duration::days(14)));
    assert!(h.notifier.sent().iter().any(|n| n.kind == NotificationKind::RenewalApproved));
}

#[tokio::test]
async fn rejected_renewal_keeps_the_due_date() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Not Renewable", 1).await;
    let r = h.borrowed(&ana, book.id).await;

    let svc = &h.services().reservations;
    svc.request_renewal(&ana, r.id).await.unwrap();
    let rejected = svc.reject_renewal(&h.librarian, r.id).await.unwrap();
    assert!(!rejected.renewal_requested);
    assert_eq!(rejected.due_date, r.due_date);
    assert_eq!(rejected.renewal_count, 0);

    let err = svc.approve_renewal(&h.librarian, r.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);
}

#[tokio::test]
async fn renewals_stop_at_the_configured_limit() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Popular", 1).await;
    let r = h.borrowed(&ana, book.id).await;

    let svc = &h.services().reservations;
    for _ in 0..2 {
        svc.request_renewal(&ana, r.id).await.unwrap();
        svc.approve_renewal(&h.librarian, r.id).await.unwrap();
    }
    let err = svc.request_renewal(&ana, r.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RenewalLimitReached);
}

#[tokio::test]
async fn cancelling_an_approval_releases_the_copy() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.managed_book("Held Copy", 1).await;
    let r = h.approved(&ana, book.id).await;

    let err = h.services().reservations.cancel(&ben, r.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let cancelled = h.services().reservations.cancel(&ana, r.id, None).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Cancelled by borrower"));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
    assert!(h
        .store
        .copies_of(book.id)
        .await
        .iter()
        .all(|c| c.status == CopyStatus::Available));
}

#[tokio::test]
async fn staff_cancel_of_a_loan_puts_the_copy_back() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.managed_book("Checked Out", 1).await;
    let r = h.borrowed(&ana, book.id).await;
    assert_eq!(h.book_state(book.id).await.available_copies, 0);

    let cancelled = h
        .services()
        .reservations
        .cancel(&h.librarian, r.id, Some("Issued in error".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Issued in error"));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
    assert_eq!(h.store.copies_of(book.id).await[0].status, CopyStatus::Available);

    // terminal from here on
    let err = h.services().reservations.cancel(&ana, r.id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);
    let err = h
        .services()
        .returns
        .process_return(&h.librarian, r.id, BookCondition::Good)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StateConflict);
}

#[tokio::test]
async fn owner_cannot_cancel_a_running_loan() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.managed_book("Kept Too Long", 1).await;
    let r = h.borrowed(&ana, book.id).await;
    h.advance(Duration::days(20));

    let err = h.services().reservations.cancel(&ana, r.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    assert_eq!(err.code(), ErrorCode::NotOwner);

    let unchanged = h.services().reservations.get(&ana, r.id).await.unwrap();
    assert_eq!(unchanged.status, ReservationStatus::Borrowed);
    assert_eq!(unchanged.cancellation_reason, None);
    assert_eq!(unchanged.due_date, r.due_date);
    assert_eq!(h.book_state(book.id).await.available_copies, 0);
    assert_eq!(h.store.copies_of(book.id).await[0].status, CopyStatus::Borrowed);

    // the lateness is still charged at the desk
    let outcome = h
        .services()
        .returns
        .process_return(&h.librarian, r.id, BookCondition::Good)
        .await
        .unwrap();
    assert_eq!(outcome.transaction.minutes_late, 6 * 24 * 60);
    assert!(outcome.transaction.late_fee > Decimal::ZERO);
}

#[tokio::test]
async fn overdue_view_lists_loans_past_due() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.book("Overdue", 2).await;
    let late = h.borrowed(&ana, book.id).await;
    h.advance(Duration::days(10));
    h.borrowed(&ben, book.id).await;
    h.advance(Duration::days(5));

    let overdue = h
        .services()
        .reservations
        .list(&h.librarian, ReservationView::Overdue)
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, late.id);
    assert!(overdue[0].is_overdue(h.state.services.clock.now()));
}

#[tokio::test]
async fn list_mine_only_shows_the_callers_reservations() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.book("Shared", 2).await;
    h.reserve(&ana, book.id).await;
    h.reserve(&ben, book.id).await;

    let mine = h.services().reservations.list_mine(&ana).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, ana.user_id);
}
