//! Reservations repository: read side of the queue

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::reservation::{ReservationDetails, ReservationStatus},
};

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// A user's reservations in every status, newest first
    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<ReservationDetails>> {
        let reservations = sqlx::query_as::<_, ReservationDetails>(
            r#"
            SELECT r.id, r.user_id, r.book_id, r.status, r.reservation_date, r.expiry_date,
                   r.fulfilled_date, b.title AS book_title, b.author AS book_author,
                   b.available AS book_available
            FROM reservations r
            JOIN books b ON b.id = r.book_id
            WHERE r.user_id = $1
            ORDER BY r.reservation_date DESC, r.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }

    /// Active reservations for a book in promotion order
    pub async fn queue_for_book(&self, book_id: i32) -> AppResult<Vec<ReservationDetails>> {
        let reservations = sqlx::query_as::<_, ReservationDetails>(
            r#"
            SELECT r.id, r.user_id, r.book_id, r.status, r.reservation_date, r.expiry_date,
                   r.fulfilled_date, b.title AS book_title, b.author AS book_author,
                   b.available AS book_available
            FROM reservations r
            JOIN books b ON b.id = r.book_id
            WHERE r.book_id = $1 AND r.status = $2
            ORDER BY r.reservation_date ASC, r.id ASC
            "#,
        )
        .bind(book_id)
        .bind(ReservationStatus::Active)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }
}
