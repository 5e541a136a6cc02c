//! Transactional storage for the lending lifecycle.
//!
//! Every lifecycle operation runs inside one [`LendingTx`]: rows read through
//! the `lock_*` methods stay locked until the unit of work ends, so
//! preconditions checked on them still hold when the writes land. Dropping a
//! `LendingTx` without calling [`LendingTx::commit`] rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        borrow::{Borrow, BorrowStatus, NewBorrow},
        reservation::{NewReservation, Reservation, ReservationStatus},
    },
};

/// Opens units of work against the ledger, the reservation queue and book availability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>>;
}

/// One open unit of work
#[async_trait]
pub trait LendingTx: Send {
    async fn lock_book(&mut self, book_id: i32) -> AppResult<Option<Book>>;

    async fn set_book_available(&mut self, book_id: i32, available: i32) -> AppResult<()>;

    async fn lock_borrow(&mut self, borrow_id: i32) -> AppResult<Option<Borrow>>;

    /// Whether `user_id` holds a ledger entry for `book_id` in one of `statuses`
    async fn has_borrow_in(
        &mut self,
        user_id: i32,
        book_id: i32,
        statuses: &[BorrowStatus],
    ) -> AppResult<bool>;

    /// Insert a `pending` entry. A second open entry for the same (user, book) is a `DuplicateRequest`.
    async fn insert_borrow(&mut self, borrow: &NewBorrow) -> AppResult<Borrow>;

    /// Persist status, dates, approver and `updated_at`
    async fn update_borrow(&mut self, borrow: &Borrow) -> AppResult<()>;

    async fn lock_reservation(&mut self, reservation_id: i32) -> AppResult<Option<Reservation>>;

    async fn has_active_reservation(&mut self, user_id: i32, book_id: i32) -> AppResult<bool>;

    /// Head of the book's queue: oldest `active` reservation, locked
    async fn oldest_active_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>>;

    /// Insert an `active` reservation
    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation>;

    /// Persist status, `fulfilled_date` and `updated_at`
    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()>;

    /// Move every `active` reservation whose expiry date is before `now` to `expired`
    async fn expire_reservations(&mut self, now: DateTime<Utc>) -> AppResult<u64>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgLendingStore {
    pool: Pool<Postgres>,
}

impl PgLendingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LendingStore for PgLendingStore {
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLendingTx { tx }))
    }
}

/// Read-committed transaction; row locks taken with `FOR UPDATE`
pub struct PgLendingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LendingTx for PgLendingTx {
    async fn lock_book(&mut self, book_id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(book)
    }

    async fn set_book_available(&mut self, book_id: i32, available: i32) -> AppResult<()> {
        let result = sqlx::query("UPDATE books SET available = $1, updated_at = NOW() WHERE id = $2")
            .bind(available)
            .bind(book_id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", book_id)));
        }
        Ok(())
    }

    async fn lock_borrow(&mut self, borrow_id: i32) -> AppResult<Option<Borrow>> {
        let borrow = sqlx::query_as::<_, Borrow>("SELECT * FROM borrows WHERE id = $1 FOR UPDATE")
            .bind(borrow_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(borrow)
    }

    async fn has_borrow_in(
        &mut self,
        user_id: i32,
        book_id: i32,
        statuses: &[BorrowStatus],
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrows
                WHERE user_id = $1 AND book_id = $2 AND status = ANY($3)
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(statuses.iter().map(BorrowStatus::as_str).collect::<Vec<_>>())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_borrow(&mut self, borrow: &NewBorrow) -> AppResult<Borrow> {
        sqlx::query_as::<_, Borrow>(
            r#"
            INSERT INTO borrows (user_id, book_id, status, borrow_date, due_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(borrow.user_id)
        .bind(borrow.book_id)
        .bind(BorrowStatus::Pending)
        .bind(borrow.borrow_date)
        .bind(borrow.due_date)
        .bind(borrow.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::on_unique_violation(e, || {
                AppError::DuplicateRequest(
                    "You already have a pending or approved borrow for this book".to_string(),
                )
            })
        })
    }

    async fn update_borrow(&mut self, borrow: &Borrow) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE borrows
            SET status = $1, borrow_date = $2, due_date = $3, return_date = $4,
                approved_by = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(borrow.status)
        .bind(borrow.borrow_date)
        .bind(borrow.due_date)
        .bind(borrow.return_date)
        .bind(borrow.approved_by)
        .bind(borrow.updated_at)
        .bind(borrow.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_reservation(&mut self, reservation_id: i32) -> AppResult<Option<Reservation>> {
        let reservation =
            sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
                .bind(reservation_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(reservation)
    }

    async fn has_active_reservation(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2 AND status = $3
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(ReservationStatus::Active)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn oldest_active_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE book_id = $1 AND status = $2
            ORDER BY reservation_date ASC, id ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .bind(ReservationStatus::Active)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(reservation)
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, book_id, status, reservation_date, expiry_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $4, $4)
            RETURNING *
            "#,
        )
        .bind(reservation.user_id)
        .bind(reservation.book_id)
        .bind(ReservationStatus::Active)
        .bind(reservation.reservation_date)
        .bind(reservation.expiry_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            AppError::on_unique_violation(e, || {
                AppError::DuplicateRequest(
                    "You already have an active reservation for this book".to_string(),
                )
            })
        })
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE reservations
            SET status = $1, fulfilled_date = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(reservation.status)
        .bind(reservation.fulfilled_date)
        .bind(reservation.updated_at)
        .bind(reservation.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn expire_reservations(&mut self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $1, updated_at = $2
            WHERE status = $3 AND expiry_date < $2
            "#,
        )
        .bind(ReservationStatus::Expired)
        .bind(now)
        .bind(ReservationStatus::Active)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgLendingTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
