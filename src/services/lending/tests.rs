use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::{
    models::reservation::ReservationStatus,
    repository::{lending::MockLendingStore, memory::MemoryLendingStore},
};

const STUDENT: i32 = 1001;
const OTHER_STUDENT: i32 = 1002;
const LIBRARIAN: i32 = 2001;

fn service(store: &MemoryLendingStore) -> (LendingService, PromotionReceiver) {
    LendingService::new(Arc::new(store.clone()), LendingConfig::default())
}

fn in_two_weeks() -> DateTime<Utc> {
    Utc::now() + Duration::days(14)
}

// =============================================================================
// Ledger
// =============================================================================

#[tokio::test]
async fn test_request_borrow_creates_pending_entry_without_touching_inventory() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 2).await;
    let (lending, _rx) = service(&store);

    let borrow = assert_ok!(lending.request_borrow(STUDENT, book).await);

    assert_eq!(borrow.status, BorrowStatus::Pending);
    assert_eq!(borrow.user_id, STUDENT);
    assert!(borrow.borrow_date.is_none());
    assert!(borrow.due_date.is_none());
    assert_eq!(store.book(book).await.available, 2);
}

#[tokio::test]
async fn test_second_open_request_is_a_duplicate() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(3, 3).await;
    let (lending, _rx) = service(&store);

    assert_ok!(lending.request_borrow(STUDENT, book).await);
    let err = assert_err!(lending.request_borrow(STUDENT, book).await);
    assert!(matches!(err, AppError::DuplicateRequest(_)));

    // Approved entries block a new request too
    let first = store.borrows_for(STUDENT, book).await[0].id;
    assert_ok!(lending.approve(first, LIBRARIAN, in_two_weeks()).await);
    let err = assert_err!(lending.request_borrow(STUDENT, book).await);
    assert!(matches!(err, AppError::DuplicateRequest(_)));
    assert_eq!(store.borrows_for(STUDENT, book).await.len(), 1);
}

#[tokio::test]
async fn test_request_after_return_is_allowed() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Approved).await;
    let (lending, _rx) = service(&store);

    assert_ok!(lending.return_borrow(id, None).await);
    let again = assert_ok!(lending.request_borrow(STUDENT, book).await);
    assert_eq!(again.status, BorrowStatus::Pending);
}

#[tokio::test]
async fn test_request_without_copies_fails() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.request_borrow(STUDENT, book).await);
    assert!(matches!(err, AppError::NoCopiesAvailable(_)));
    assert_eq!(store.borrow_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_is_reported_before_availability() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.request_borrow(STUDENT, book).await);
    assert!(matches!(err, AppError::DuplicateRequest(_)));
}

#[tokio::test]
async fn test_request_for_unknown_book_is_not_found() {
    let store = MemoryLendingStore::new();
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.request_borrow(STUDENT, 404).await);
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_approve_takes_one_copy() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 2).await;
    let (lending, _rx) = service(&store);
    let due = in_two_weeks();

    let pending = assert_ok!(lending.request_borrow(STUDENT, book).await);
    let approved = assert_ok!(lending.approve(pending.id, LIBRARIAN, due).await);

    assert_eq!(approved.status, BorrowStatus::Approved);
    assert_eq!(approved.approved_by, Some(LIBRARIAN));
    assert_eq!(approved.due_date, Some(due));
    assert!(approved.borrow_date.is_some());
    assert_eq!(store.book(book).await.available, 1);
    assert_eq!(store.borrow(pending.id).await.status, BorrowStatus::Approved);
}

#[tokio::test]
async fn test_approve_with_default_due_date_uses_loan_days() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 1).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;
    let config = LendingConfig {
        loan_days: 21,
        ..LendingConfig::default()
    };
    let (lending, _rx) = LendingService::new(Arc::new(store.clone()), config);

    let before = Utc::now();
    let approved = assert_ok!(lending.approve(id, LIBRARIAN, lending.default_due_date()).await);

    let due = approved.due_date.expect("approved borrow has a due date");
    assert!(due >= before + Duration::days(21));
    assert!(due <= Utc::now() + Duration::days(21));
    assert_eq!(store.book(book).await.available, 0);
}

#[tokio::test]
async fn test_approve_without_copies_changes_nothing() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;
    let (lending, _rx) = service(&store);
    let commits = store.commits();

    let err = assert_err!(lending.approve(id, LIBRARIAN, in_two_weeks()).await);

    assert!(matches!(err, AppError::NoCopiesAvailable(_)));
    assert_eq!(store.book(book).await.available, 0);
    let borrow = store.borrow(id).await;
    assert_eq!(borrow.status, BorrowStatus::Pending);
    assert!(borrow.approved_by.is_none());
    assert_eq!(store.commits(), commits);
}

#[tokio::test]
async fn test_second_approve_is_rejected_and_counts_once() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(3, 3).await;
    let (lending, _rx) = service(&store);

    let pending = assert_ok!(lending.request_borrow(STUDENT, book).await);
    assert_ok!(lending.approve(pending.id, LIBRARIAN, in_two_weeks()).await);
    let err = assert_err!(lending.approve(pending.id, LIBRARIAN, in_two_weeks()).await);

    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(store.book(book).await.available, 2);
}

#[tokio::test]
async fn test_approve_with_past_due_date_fails_before_touching_records() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 1).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;
    let (lending, _rx) = service(&store);
    let commits = store.commits();

    let err = assert_err!(lending.approve(id, LIBRARIAN, Utc::now() - Duration::days(1)).await);

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(store.borrow(id).await.status, BorrowStatus::Pending);
    assert_eq!(store.book(book).await.available, 1);
    assert_eq!(store.commits(), commits);
}

#[tokio::test]
async fn test_approve_past_due_date_never_opens_a_unit_of_work() {
    let mut store = MockLendingStore::new();
    store.expect_begin().never();
    let (lending, _rx) = LendingService::new(Arc::new(store), LendingConfig::default());

    let err = assert_err!(lending.approve(1, LIBRARIAN, Utc::now()).await);
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_reject_leaves_inventory_alone() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 1).await;
    let (lending, _rx) = service(&store);

    let pending = assert_ok!(lending.request_borrow(STUDENT, book).await);
    let rejected = assert_ok!(lending.reject(pending.id, LIBRARIAN).await);

    assert_eq!(rejected.status, BorrowStatus::Rejected);
    assert_eq!(rejected.approved_by, Some(LIBRARIAN));
    assert_eq!(store.book(book).await.available, 1);

    let err = assert_err!(lending.approve(pending.id, LIBRARIAN, in_two_weeks()).await);
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_reject_requires_pending() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Approved).await;
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.reject(id, LIBRARIAN).await);
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(store.borrow(id).await.status, BorrowStatus::Approved);
}

#[tokio::test]
async fn test_return_gives_back_exactly_one_copy() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(3, 1).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Approved).await;
    let (lending, mut rx) = service(&store);

    let returned = assert_ok!(lending.return_borrow(id, Some(STUDENT)).await);

    assert_eq!(returned.status, BorrowStatus::Returned);
    assert!(returned.return_date.is_some());
    assert_eq!(store.book(book).await.available, 2);
    assert_eq!(rx.try_recv().ok(), Some(book));
}

#[tokio::test]
async fn test_return_of_non_approved_borrow_changes_nothing() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 1).await;
    let pending = store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;
    let returned = store.add_borrow(OTHER_STUDENT, book, BorrowStatus::Returned).await;
    let (lending, mut rx) = service(&store);

    for id in [pending, returned] {
        let err = assert_err!(lending.return_borrow(id, None).await);
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    assert_eq!(store.book(book).await.available, 1);
    assert_eq!(store.borrow(pending).await.status, BorrowStatus::Pending);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_return_by_someone_else_is_denied() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Approved).await;
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.return_borrow(id, Some(OTHER_STUDENT)).await);
    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert_eq!(store.book(book).await.available, 0);
}

#[tokio::test]
async fn test_return_succeeds_when_promotion_worker_is_gone() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let id = store.add_borrow(STUDENT, book, BorrowStatus::Approved).await;
    let (lending, rx) = service(&store);
    drop(rx);

    let returned = assert_ok!(lending.return_borrow(id, None).await);
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert_eq!(store.book(book).await.available, 1);
}

#[tokio::test]
async fn test_returns_after_quantity_cut_keep_available_within_quantity() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 2).await;
    let (lending, _rx) = service(&store);

    let mut ids = Vec::new();
    for user in [STUDENT, OTHER_STUDENT] {
        let borrow = assert_ok!(lending.request_borrow(user, book).await);
        assert_ok!(lending.approve(borrow.id, LIBRARIAN, in_two_weeks()).await);
        ids.push(borrow.id);
    }
    assert_eq!(store.book(book).await.available, 0);

    // Librarian writes one copy off while both are out
    store.set_quantity(book, 1).await;
    let cut = store.book(book).await;
    assert_eq!((cut.quantity, cut.available), (1, 0));

    for id in ids {
        let returned = assert_ok!(lending.return_borrow(id, None).await);
        assert_eq!(returned.status, BorrowStatus::Returned);

        let current = store.book(book).await;
        assert!(0 <= current.available && current.available <= current.quantity);
    }
    assert_eq!(store.book(book).await.available, 1);
}

// =============================================================================
// Reservation queue
// =============================================================================

#[tokio::test]
async fn test_reserve_requires_no_free_copy() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 1).await;
    let (lending, _rx) = service(&store);

    let err = assert_err!(lending.reserve(STUDENT, book).await);
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_reserve_sets_expiry_from_config() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);

    let reservation = assert_ok!(lending.reserve(STUDENT, book).await);

    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(
        reservation.expiry_date - reservation.reservation_date,
        Duration::days(lending.config().reservation_days)
    );
}

#[tokio::test]
async fn test_reserve_twice_or_while_holding_the_book_is_a_duplicate() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    store.add_borrow(OTHER_STUDENT, book, BorrowStatus::Approved).await;
    let (lending, _rx) = service(&store);

    assert_ok!(lending.reserve(STUDENT, book).await);
    let err = assert_err!(lending.reserve(STUDENT, book).await);
    assert!(matches!(err, AppError::DuplicateRequest(_)));

    let err = assert_err!(lending.reserve(OTHER_STUDENT, book).await);
    assert!(matches!(err, AppError::DuplicateRequest(_)));
}

#[tokio::test]
async fn test_cancel_only_by_owner_and_only_once() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);
    let reservation = assert_ok!(lending.reserve(STUDENT, book).await);

    let err = assert_err!(lending.cancel(reservation.id, OTHER_STUDENT).await);
    assert!(matches!(err, AppError::NotFound(_)));

    let cancelled = assert_ok!(lending.cancel(reservation.id, STUDENT).await);
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    let err = assert_err!(lending.cancel(reservation.id, STUDENT).await);
    assert!(matches!(err, AppError::InvalidState(_)));

    // The slot is free again
    assert_ok!(lending.reserve(STUDENT, book).await);
}

#[tokio::test]
async fn test_promote_next_takes_only_the_oldest_reservation() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);
    let first = assert_ok!(lending.reserve(STUDENT, book).await);
    let second = assert_ok!(lending.reserve(OTHER_STUDENT, book).await);
    assert!(first.reservation_date <= second.reservation_date);

    let holder = store.add_borrow(3000, book, BorrowStatus::Approved).await;
    assert_ok!(lending.return_borrow(holder, None).await);
    assert_eq!(store.book(book).await.available, 1);

    let borrow = assert_ok!(lending.promote_next(book).await).expect("a borrow is promoted");

    assert_eq!(borrow.user_id, STUDENT);
    assert_eq!(borrow.status, BorrowStatus::Pending);
    assert!(borrow.borrow_date.is_some());
    let due = borrow.due_date.expect("promotion sets a due date");
    assert_eq!(due - borrow.borrow_date.unwrap(), Duration::days(14));

    let first = store.reservation(first.id).await;
    assert_eq!(first.status, ReservationStatus::Fulfilled);
    assert!(first.fulfilled_date.is_some());
    assert_eq!(store.reservation(second.id).await.status, ReservationStatus::Active);
    assert_eq!(store.borrows_for(STUDENT, book).await.len(), 1);
    assert!(store.borrows_for(OTHER_STUDENT, book).await.is_empty());
}

#[tokio::test]
async fn test_promote_next_without_free_copy_is_a_no_op() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);
    let reservation = assert_ok!(lending.reserve(STUDENT, book).await);
    let commits = store.commits();

    assert!(assert_ok!(lending.promote_next(book).await).is_none());

    assert_eq!(store.reservation(reservation.id).await.status, ReservationStatus::Active);
    assert_eq!(store.borrow_count().await, 0);
    assert_eq!(store.commits(), commits);
}

#[tokio::test]
async fn test_promote_next_with_empty_queue_is_a_no_op() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 2).await;
    let (lending, _rx) = service(&store);

    assert!(assert_ok!(lending.promote_next(book).await).is_none());
    assert_eq!(store.borrow_count().await, 0);
}

#[tokio::test]
async fn test_promote_next_skips_heads_that_already_hold_the_book() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(2, 0).await;
    let (lending, _rx) = service(&store);
    let first = assert_ok!(lending.reserve(STUDENT, book).await);
    let second = assert_ok!(lending.reserve(OTHER_STUDENT, book).await);

    // STUDENT gets a copy through another path while still queued
    let returning = store.add_borrow(3000, book, BorrowStatus::Approved).await;
    assert_ok!(lending.return_borrow(returning, None).await);
    let direct = store.add_borrow(STUDENT, book, BorrowStatus::Pending).await;

    let borrow = assert_ok!(lending.promote_next(book).await).expect("second in line is promoted");

    assert_eq!(borrow.user_id, OTHER_STUDENT);
    let skipped = store.reservation(first.id).await;
    assert_eq!(skipped.status, ReservationStatus::Cancelled);
    assert!(skipped.fulfilled_date.is_none());
    assert_eq!(store.reservation(second.id).await.status, ReservationStatus::Fulfilled);
    let student_borrows = store.borrows_for(STUDENT, book).await;
    assert_eq!(student_borrows.len(), 1);
    assert_eq!(student_borrows[0].id, direct);
}

#[tokio::test]
async fn test_expire_sweep_is_idempotent() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);
    let stale = assert_ok!(lending.reserve(STUDENT, book).await);
    let cancelled = assert_ok!(lending.reserve(OTHER_STUDENT, book).await);
    assert_ok!(lending.cancel(cancelled.id, OTHER_STUDENT).await);

    let later = Utc::now() + Duration::days(15);
    assert_eq!(assert_ok!(lending.expire_sweep_at(later).await), 1);
    assert_eq!(assert_ok!(lending.expire_sweep_at(later).await), 0);

    assert_eq!(store.reservation(stale.id).await.status, ReservationStatus::Expired);
    assert_eq!(store.reservation(cancelled.id).await.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_expire_sweep_keeps_live_reservations() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let (lending, _rx) = service(&store);
    let reservation = assert_ok!(lending.reserve(STUDENT, book).await);

    assert_eq!(assert_ok!(lending.expire_sweep().await), 0);
    assert_eq!(store.reservation(reservation.id).await.status, ReservationStatus::Active);
}

// =============================================================================
// Scenarios and background work
// =============================================================================

#[tokio::test]
async fn test_return_promotes_head_and_availability_waits_for_approval() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(3, 0).await;
    let holder = store.add_borrow(3000, book, BorrowStatus::Approved).await;
    let (lending, mut rx) = service(&store);

    let t1 = assert_ok!(lending.reserve(STUDENT, book).await);
    let t2 = assert_ok!(lending.reserve(OTHER_STUDENT, book).await);

    assert_ok!(lending.return_borrow(holder, None).await);
    assert_eq!(store.book(book).await.available, 1);

    let scheduled = rx.try_recv().expect("return schedules a promotion");
    assert_eq!(scheduled, book);
    promote_after_return(&lending, scheduled).await;

    assert_eq!(store.reservation(t1.id).await.status, ReservationStatus::Fulfilled);
    assert_eq!(store.reservation(t2.id).await.status, ReservationStatus::Active);
    let promoted = store.borrows_for(STUDENT, book).await;
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].status, BorrowStatus::Pending);
    assert_eq!(store.book(book).await.available, 1);

    assert_ok!(lending.approve(promoted[0].id, LIBRARIAN, in_two_weeks()).await);
    assert_eq!(store.book(book).await.available, 0);
}

#[tokio::test]
async fn test_promotion_worker_drains_the_queue() {
    let store = MemoryLendingStore::new();
    let book = store.add_book(1, 0).await;
    let holder = store.add_borrow(3000, book, BorrowStatus::Approved).await;
    let (lending, rx) = service(&store);
    let worker = spawn_promotion_worker(lending.clone(), rx);

    assert_ok!(lending.reserve(STUDENT, book).await);
    assert_ok!(lending.return_borrow(holder, None).await);

    let mut promoted = Vec::new();
    for _ in 0..100 {
        promoted = store.borrows_for(STUDENT, book).await;
        if !promoted.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    // Still listening once the queue is empty
    assert!(!worker.is_finished());
    worker.abort();

    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].status, BorrowStatus::Pending);
}

#[tokio::test]
async fn test_promotion_failure_is_logged_not_raised() {
    let mut store = MockLendingStore::new();
    store
        .expect_begin()
        .times(2)
        .returning(|| Err(AppError::Internal("store unavailable".to_string())));
    let (lending, _rx) = LendingService::new(Arc::new(store), LendingConfig::default());

    // Does not panic or propagate
    promote_after_return(&lending, 7).await;

    let err = assert_err!(lending.promote_next(7).await);
    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test]
async fn test_expiry_sweeper_runs_on_start() {
    let mut store = MockLendingStore::new();
    store
        .expect_begin()
        .returning(|| Err(AppError::Internal("store unavailable".to_string())));
    let (lending, _rx) = LendingService::new(Arc::new(store), LendingConfig::default());

    let sweeper = spawn_expiry_sweeper(lending, std::time::Duration::from_secs(3600));
    tokio::task::yield_now().await;

    // A failing sweep keeps the task alive for the next tick
    assert!(!sweeper.is_finished());
    sweeper.abort();
}
