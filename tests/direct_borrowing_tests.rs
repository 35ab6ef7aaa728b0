//! Walk-in borrowing and the eligibility report

mod common;

use chrono::Duration;

use common::Harness;
use libris_server::{
    error::{AppError, ErrorCode},
    models::{BookCondition, CopyStatus, DirectBorrowRequest, ReservationStatus},
    repository::UsersStore,
    services::effects::NotificationKind,
};

#[tokio::test]
async fn eligible_user_gets_a_clean_report() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Eligible", 2).await;

    let report = h
        .services()
        .borrowing
        .check_eligibility(&ana, ana.user_id, book.id)
        .await
        .unwrap();

    assert!(report.eligible);
    assert_eq!(report.code, None);
    assert_eq!(report.reason, None);
    assert_eq!(report.available_copies, 2);
    assert!(!report.has_active_hold);
}

#[tokio::test]
async fn report_names_the_first_failed_check() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let empty = h.book("Nothing Left", 0).await;
    let stocked = h.book("Plenty", 3).await;
    let borrowing = &h.services().borrowing;

    let report = borrowing
        .check_eligibility(&h.librarian, ana.user_id, empty.id)
        .await
        .unwrap();
    assert!(!report.eligible);
    assert_eq!(report.code, Some(ErrorCode::NoCopiesAvailable as u32));

    h.reserve(&ana, stocked.id).await;
    let report = borrowing
        .check_eligibility(&h.librarian, ana.user_id, stocked.id)
        .await
        .unwrap();
    assert!(report.has_active_hold);
    assert_eq!(report.code, Some(ErrorCode::DuplicateHold as u32));

    UsersStore::restrict(h.store.as_ref(), ana.user_id, "Lost book: Atlas", common::t0())
        .await
        .unwrap();
    let report = borrowing
        .check_eligibility(&h.librarian, ana.user_id, empty.id)
        .await
        .unwrap();
    assert!(report.is_restricted);
    assert_eq!(report.code, Some(ErrorCode::AccountRestricted as u32));
}

#[tokio::test]
async fn students_only_check_themselves() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let ben = h.student("ben").await;
    let book = h.book("Private", 1).await;

    let err = h
        .services()
        .borrowing
        .check_eligibility(&ben, ana.user_id, book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
async fn unknown_user_or_book_is_not_found() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Real", 1).await;
    let borrowing = &h.services().borrowing;

    let err = borrowing
        .check_eligibility(&h.librarian, 4242, book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = borrowing
        .check_eligibility(&h.librarian, ana.user_id, 4242)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn walk_in_starts_as_a_borrowed_loan() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Walk In", 2).await;

    let loan = tokio_test::assert_ok!(
        h.services()
            .borrowing
            .process_direct_borrowing(
                &h.librarian,
                DirectBorrowRequest { user_id: ana.user_id, book_id: book.id },
            )
            .await
    );

    let now = common::t0();
    assert_eq!(loan.status, ReservationStatus::Borrowed);
    assert!(loan.is_walk_in);
    assert_eq!(loan.borrow_date, Some(now));
    assert_eq!(loan.approval_date, Some(now));
    assert_eq!(loan.due_date, Some(now + Duration::days(14)));
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
    assert!(h.notifier.sent().iter().any(|n| n.kind == NotificationKind::BookBorrowed));

    // the loan follows the normal return path
    h.advance(Duration::days(2));
    let outcome = h
        .services()
        .returns
        .process_return(&h.librarian, loan.id, BookCondition::Good)
        .await
        .unwrap();
    assert_eq!(outcome.reservation.status, ReservationStatus::Returned);
    assert_eq!(h.book_state(book.id).await.available_copies, 2);
}

#[tokio::test]
async fn walk_in_on_a_managed_title_checks_out_a_copy() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.managed_book("Managed Walk In", 2).await;

    let loan = h
        .services()
        .borrowing
        .process_direct_borrowing(
            &h.librarian,
            DirectBorrowRequest { user_id: ana.user_id, book_id: book.id },
        )
        .await
        .unwrap();

    let copy = h
        .store
        .copies_of(book.id)
        .await
        .into_iter()
        .find(|c| Some(c.id) == loan.copy_id)
        .unwrap();
    assert_eq!(copy.status, CopyStatus::Borrowed);
    assert_eq!(loan.copy_label.as_deref(), Some(copy.label.as_str()));
}

#[tokio::test]
async fn ineligible_walk_in_is_refused() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Refused", 1).await;
    UsersStore::restrict(h.store.as_ref(), ana.user_id, "Lost book: Atlas", common::t0())
        .await
        .unwrap();

    let err = h
        .services()
        .borrowing
        .process_direct_borrowing(
            &h.librarian,
            DirectBorrowRequest { user_id: ana.user_id, book_id: book.id },
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::AccountRestricted);
    assert_eq!(h.book_state(book.id).await.available_copies, 1);
    assert!(!h.audit.entries().pop().unwrap().success);
}

#[tokio::test]
async fn walk_in_with_an_open_reservation_is_a_duplicate() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Already Held", 2).await;
    h.reserve(&ana, book.id).await;

    let err = h
        .services()
        .borrowing
        .process_direct_borrowing(
            &h.librarian,
            DirectBorrowRequest { user_id: ana.user_id, book_id: book.id },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateHold);
    assert_eq!(h.book_state(book.id).await.available_copies, 2);
}

#[tokio::test]
async fn students_cannot_check_out_at_the_desk() {
    let h = Harness::new().await;
    let ana = h.student("ana").await;
    let book = h.book("Desk Only", 1).await;

    let err = tokio_test::assert_err!(
        h.services()
            .borrowing
            .process_direct_borrowing(&ana, DirectBorrowRequest { user_id: ana.user_id, book_id: book.id })
            .await
    );
    assert!(matches!(err, AppError::Authorization(_)));
}
