//! Reservation queue: a FIFO of students waiting for a copy of one book.

use chrono::{DateTime, Duration, Utc};

use super::{locked_book, LendingService};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{Borrow, BorrowStatus, NewBorrow},
        reservation::{NewReservation, Reservation, ReservationStatus},
    },
};

impl LendingService {
    /// Join the queue of a book that has no free copy.
    pub async fn reserve(&self, user_id: i32, book_id: i32) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let book = locked_book(tx.as_mut(), book_id).await?;
        if book.is_available() {
            return Err(AppError::InvalidState(format!(
                "'{}' has copies available; request a borrow instead",
                book.title
            )));
        }

        if tx.has_active_reservation(user_id, book_id).await? {
            return Err(AppError::DuplicateRequest(
                "You already have an active reservation for this book".to_string(),
            ));
        }

        if tx.has_borrow_in(user_id, book_id, &BorrowStatus::OPEN).await? {
            return Err(AppError::DuplicateRequest(
                "You already have a pending or approved borrow for this book".to_string(),
            ));
        }

        let reservation = tx
            .insert_reservation(&NewReservation {
                user_id,
                book_id,
                reservation_date: now,
                expiry_date: now + Duration::days(self.config.reservation_days),
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Reservation {} created by user {} for book {}",
            reservation.id,
            user_id,
            book_id
        );
        Ok(reservation)
    }

    /// Leave the queue. Only the owner may cancel, and only while `active`.
    pub async fn cancel(&self, reservation_id: i32, user_id: i32) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("Reservation with id {} not found", reservation_id))
            })?;

        if reservation.status != ReservationStatus::Active {
            return Err(AppError::InvalidState(format!(
                "Reservation is not active (status: {})",
                reservation.status
            )));
        }

        reservation.status = ReservationStatus::Cancelled;
        reservation.updated_at = now;
        tx.update_reservation(&reservation).await?;

        tx.commit().await?;

        tracing::info!("Reservation {} cancelled by user {}", reservation.id, user_id);
        Ok(reservation)
    }

    /// Turn the head of the book's queue into a `pending` borrow when a copy is free.
    ///
    /// Heads whose owner already holds an open borrow for the book are
    /// `cancelled` and skipped. At most one borrow is created. `available` is
    /// left to the approval of that borrow.
    pub async fn promote_next(&self, book_id: i32) -> AppResult<Option<Borrow>> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let book = locked_book(tx.as_mut(), book_id).await?;
        if !book.is_available() {
            return Ok(None);
        }

        let mut skipped = 0;
        let promoted = loop {
            let Some(mut head) = tx.oldest_active_reservation(book_id).await? else {
                break None;
            };

            head.updated_at = now;

            if tx.has_borrow_in(head.user_id, book_id, &BorrowStatus::OPEN).await? {
                head.status = ReservationStatus::Cancelled;
                tx.update_reservation(&head).await?;
                tracing::debug!(
                    "Reservation {} cancelled without promotion: user {} already holds book {}",
                    head.id,
                    head.user_id,
                    book_id
                );
                skipped += 1;
                continue;
            }

            head.status = ReservationStatus::Fulfilled;
            head.fulfilled_date = Some(now);
            tx.update_reservation(&head).await?;

            let borrow = tx
                .insert_borrow(&NewBorrow {
                    user_id: head.user_id,
                    book_id,
                    borrow_date: Some(now),
                    due_date: Some(now + Duration::days(self.config.promotion_loan_days)),
                    created_at: now,
                })
                .await?;

            break Some((head, borrow));
        };

        if promoted.is_none() && skipped == 0 {
            return Ok(None);
        }

        tx.commit().await?;

        match promoted {
            Some((reservation, borrow)) => {
                tracing::info!(
                    "Reservation {} promoted to borrow {} for user {} (book {})",
                    reservation.id,
                    borrow.id,
                    borrow.user_id,
                    book_id
                );
                Ok(Some(borrow))
            }
            None => Ok(None),
        }
    }

    /// Expire every active reservation past its expiry date. Returns how many moved.
    pub async fn expire_sweep(&self) -> AppResult<u64> {
        self.expire_sweep_at(Utc::now()).await
    }

    pub async fn expire_sweep_at(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tx = self.store.begin().await?;
        let expired = tx.expire_reservations(now).await?;
        tx.commit().await?;

        if expired > 0 {
            tracing::info!("Expired {} reservation(s)", expired);
        }
        Ok(expired)
    }
}
