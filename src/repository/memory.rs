//! In-memory lending store for tests.
//!
//! A unit of work holds the store mutex for its whole lifetime and edits a
//! copy of the state; `commit` swaps the copy in, dropping discards it.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::lending::{LendingStore, LendingTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{adjusted_available, Book},
        borrow::{Borrow, BorrowStatus, NewBorrow},
        reservation::{NewReservation, Reservation, ReservationStatus},
    },
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub books: BTreeMap<i32, Book>,
    pub borrows: BTreeMap<i32, Borrow>,
    pub reservations: BTreeMap<i32, Reservation>,
    next_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryLendingStore {
    state: Arc<Mutex<MemoryState>>,
    commits: Arc<std::sync::atomic::AtomicUsize>,
}

impl MemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed units of work
    pub fn commits(&self) -> usize {
        self.commits.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn add_book(&self, quantity: i32, available: i32) -> i32 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let now = Utc::now();
        state.books.insert(
            id,
            Book {
                id,
                title: format!("Book {}", id),
                author: "Author".to_string(),
                isbn: format!("97800000000{:02}", id),
                publisher: None,
                publication_year: None,
                category: None,
                description: None,
                quantity,
                available,
                added_by: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Seed an entry directly, bypassing the lifecycle
    pub async fn add_borrow(&self, user_id: i32, book_id: i32, status: BorrowStatus) -> i32 {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let now = Utc::now();
        state.borrows.insert(
            id,
            Borrow {
                id,
                user_id,
                book_id,
                status,
                borrow_date: None,
                due_date: None,
                return_date: None,
                approved_by: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Catalog quantity edit, same arithmetic as `BooksRepository::update`
    pub async fn set_quantity(&self, id: i32, quantity: i32) {
        let mut state = self.state.lock().await;
        if let Some(book) = state.books.get_mut(&id) {
            book.available = adjusted_available(book.available, book.quantity, quantity);
            book.quantity = quantity;
        }
    }

    pub async fn book(&self, id: i32) -> Book {
        self.state.lock().await.books[&id].clone()
    }

    pub async fn borrow(&self, id: i32) -> Borrow {
        self.state.lock().await.borrows[&id].clone()
    }

    pub async fn reservation(&self, id: i32) -> Reservation {
        self.state.lock().await.reservations[&id].clone()
    }

    pub async fn borrows_for(&self, user_id: i32, book_id: i32) -> Vec<Borrow> {
        self.state
            .lock()
            .await
            .borrows
            .values()
            .filter(|b| b.user_id == user_id && b.book_id == book_id)
            .cloned()
            .collect()
    }

    pub async fn borrow_count(&self) -> usize {
        self.state.lock().await.borrows.len()
    }
}

#[async_trait]
impl LendingStore for MemoryLendingStore {
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLendingTx {
            guard,
            working,
            commits: self.commits.clone(),
        }))
    }
}

pub struct MemoryLendingTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    commits: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl LendingTx for MemoryLendingTx {
    async fn lock_book(&mut self, book_id: i32) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&book_id).cloned())
    }

    async fn set_book_available(&mut self, book_id: i32, available: i32) -> AppResult<()> {
        let book = self
            .working
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        // Same bounds as the table CHECK constraint
        if available < 0 || available > book.quantity {
            return Err(AppError::Internal(format!(
                "available {} out of bounds for book {}",
                available, book_id
            )));
        }
        book.available = available;
        Ok(())
    }

    async fn lock_borrow(&mut self, borrow_id: i32) -> AppResult<Option<Borrow>> {
        Ok(self.working.borrows.get(&borrow_id).cloned())
    }

    async fn has_borrow_in(
        &mut self,
        user_id: i32,
        book_id: i32,
        statuses: &[BorrowStatus],
    ) -> AppResult<bool> {
        Ok(self.working.borrows.values().any(|b| {
            b.user_id == user_id && b.book_id == book_id && statuses.contains(&b.status)
        }))
    }

    async fn insert_borrow(&mut self, borrow: &NewBorrow) -> AppResult<Borrow> {
        let open = self.working.borrows.values().any(|b| {
            b.user_id == borrow.user_id && b.book_id == borrow.book_id && b.status.is_open()
        });
        if open {
            return Err(AppError::DuplicateRequest(
                "You already have a pending or approved borrow for this book".to_string(),
            ));
        }
        let id = self.working.next_id();
        let row = Borrow {
            id,
            user_id: borrow.user_id,
            book_id: borrow.book_id,
            status: BorrowStatus::Pending,
            borrow_date: borrow.borrow_date,
            due_date: borrow.due_date,
            return_date: None,
            approved_by: None,
            created_at: borrow.created_at,
            updated_at: borrow.created_at,
        };
        self.working.borrows.insert(id, row.clone());
        Ok(row)
    }

    async fn update_borrow(&mut self, borrow: &Borrow) -> AppResult<()> {
        self.working.borrows.insert(borrow.id, borrow.clone());
        Ok(())
    }

    async fn lock_reservation(&mut self, reservation_id: i32) -> AppResult<Option<Reservation>> {
        Ok(self.working.reservations.get(&reservation_id).cloned())
    }

    async fn has_active_reservation(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        Ok(self.working.reservations.values().any(|r| {
            r.user_id == user_id && r.book_id == book_id && r.status == ReservationStatus::Active
        }))
    }

    async fn oldest_active_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>> {
        Ok(self
            .working
            .reservations
            .values()
            .filter(|r| r.book_id == book_id && r.status == ReservationStatus::Active)
            .min_by_key(|r| (r.reservation_date, r.id))
            .cloned())
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        let id = self.working.next_id();
        let row = Reservation {
            id,
            user_id: reservation.user_id,
            book_id: reservation.book_id,
            status: ReservationStatus::Active,
            reservation_date: reservation.reservation_date,
            expiry_date: reservation.expiry_date,
            fulfilled_date: None,
            created_at: reservation.reservation_date,
            updated_at: reservation.reservation_date,
        };
        self.working.reservations.insert(id, row.clone());
        Ok(row)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        self.working.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn expire_reservations(&mut self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut count = 0;
        for reservation in self.working.reservations.values_mut() {
            if reservation.is_expired_at(now) {
                reservation.status = ReservationStatus::Expired;
                reservation.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryLendingTx {
            mut guard,
            working,
            commits,
        } = *self;
        *guard = working;
        commits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
