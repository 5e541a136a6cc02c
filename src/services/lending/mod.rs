//! Lending lifecycle: the borrow ledger, the reservation queue and the
//! availability counter they share.
//!
//! Each operation opens one unit of work on the [`LendingStore`], re-reads and
//! locks the rows whose state it depends on, checks its preconditions against
//! those locked rows, writes, then commits. Any early return drops the unit of
//! work, which rolls it back, so a failed operation leaves no trace.

mod hooks;
mod queue;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrow::{Borrow, BorrowStatus, NewBorrow},
    },
    repository::{LendingStore, LendingTx},
};

pub use hooks::{
    promote_after_return, spawn_expiry_sweeper, spawn_promotion_worker, PromotionQueue,
    PromotionReceiver,
};

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    config: LendingConfig,
    promotions: PromotionQueue,
}

impl LendingService {
    /// Build the service and the receiving end of its promotion queue.
    /// Hand the receiver to [`spawn_promotion_worker`].
    pub fn new(store: Arc<dyn LendingStore>, config: LendingConfig) -> (Self, PromotionReceiver) {
        let (promotions, receiver) = PromotionQueue::channel();
        (
            Self {
                store,
                config,
                promotions,
            },
            receiver,
        )
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// Due date used when a librarian approves without choosing one
    pub fn default_due_date(&self) -> DateTime<Utc> {
        Utc::now() + Duration::days(self.config.loan_days)
    }

    /// Student asks for a copy. Creates a `pending` entry; inventory is untouched.
    pub async fn request_borrow(&self, user_id: i32, book_id: i32) -> AppResult<Borrow> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let book = locked_book(tx.as_mut(), book_id).await?;

        if tx.has_borrow_in(user_id, book_id, &BorrowStatus::OPEN).await? {
            return Err(AppError::DuplicateRequest(
                "You already have a pending or approved borrow for this book".to_string(),
            ));
        }

        if !book.is_available() {
            return Err(AppError::NoCopiesAvailable(format!(
                "No copies of '{}' are available; reserve it instead",
                book.title
            )));
        }

        let borrow = tx
            .insert_borrow(&NewBorrow {
                user_id,
                book_id,
                borrow_date: None,
                due_date: None,
                created_at: now,
            })
            .await?;

        tx.commit().await?;

        tracing::info!("Borrow {} requested by user {} for book {}", borrow.id, user_id, book_id);
        Ok(borrow)
    }

    /// Librarian hands out a copy: `pending → approved`, `available - 1`.
    pub async fn approve(&self, borrow_id: i32, librarian_id: i32, due_date: DateTime<Utc>) -> AppResult<Borrow> {
        let now = Utc::now();
        if due_date <= now {
            return Err(AppError::Validation("Due date must be in the future".to_string()));
        }

        let mut tx = self.store.begin().await?;

        let mut borrow = locked_borrow(tx.as_mut(), borrow_id).await?;
        borrow.status.ensure_transition(BorrowStatus::Approved)?;

        let book = locked_book(tx.as_mut(), borrow.book_id).await?;
        if !book.is_available() {
            return Err(AppError::NoCopiesAvailable(format!(
                "No copies of '{}' are available",
                book.title
            )));
        }

        tx.set_book_available(book.id, book.available - 1).await?;

        borrow.status = BorrowStatus::Approved;
        borrow.borrow_date = Some(now);
        borrow.due_date = Some(due_date);
        borrow.approved_by = Some(librarian_id);
        borrow.updated_at = now;
        tx.update_borrow(&borrow).await?;

        tx.commit().await?;

        tracing::info!(
            "Borrow {} approved by librarian {}, book {} available {} -> {}",
            borrow.id,
            librarian_id,
            book.id,
            book.available,
            book.available - 1
        );
        Ok(borrow)
    }

    /// Librarian declines a request: `pending → rejected`.
    pub async fn reject(&self, borrow_id: i32, librarian_id: i32) -> AppResult<Borrow> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut borrow = locked_borrow(tx.as_mut(), borrow_id).await?;
        borrow.status.ensure_transition(BorrowStatus::Rejected)?;

        borrow.status = BorrowStatus::Rejected;
        borrow.approved_by = Some(librarian_id);
        borrow.updated_at = now;
        tx.update_borrow(&borrow).await?;

        tx.commit().await?;

        tracing::info!("Borrow {} rejected by librarian {}", borrow.id, librarian_id);
        Ok(borrow)
    }

    /// Copy comes back: `approved → returned`, `available + 1` capped at `quantity`.
    ///
    /// When `borrower` is set the entry must belong to that user. Once the
    /// return is committed the book is queued for promotion; the outcome of
    /// that promotion never affects this result.
    pub async fn return_borrow(&self, borrow_id: i32, borrower: Option<i32>) -> AppResult<Borrow> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut borrow = locked_borrow(tx.as_mut(), borrow_id).await?;
        if let Some(user_id) = borrower {
            if borrow.user_id != user_id {
                return Err(AppError::PermissionDenied(
                    "You can only return your own borrows".to_string(),
                ));
            }
        }
        borrow.status.ensure_transition(BorrowStatus::Returned)?;

        let book = locked_book(tx.as_mut(), borrow.book_id).await?;
        // A quantity cut may already have written this copy off
        let available = if book.lent_copies() > 0 {
            book.available + 1
        } else {
            tracing::warn!(
                "Book {} has no lent copies on record; return of borrow {} leaves available at {}",
                book.id,
                borrow.id,
                book.available
            );
            book.available
        };
        tx.set_book_available(book.id, available).await?;

        borrow.status = BorrowStatus::Returned;
        borrow.return_date = Some(now);
        borrow.updated_at = now;
        tx.update_borrow(&borrow).await?;

        tx.commit().await?;

        tracing::info!(
            "Borrow {} returned, book {} available {} -> {}",
            borrow.id,
            book.id,
            book.available,
            available
        );

        self.promotions.schedule(book.id);
        Ok(borrow)
    }
}

async fn locked_book(tx: &mut dyn LendingTx, book_id: i32) -> AppResult<Book> {
    tx.lock_book(book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
}

async fn locked_borrow(tx: &mut dyn LendingTx, borrow_id: i32) -> AppResult<Borrow> {
    tx.lock_borrow(borrow_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", borrow_id)))
}
