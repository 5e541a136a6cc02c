//! Reservation queries

use crate::{error::AppResult, models::reservation::ReservationDetails, repository::Repository};

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
}

impl ReservationsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn user_reservations(&self, user_id: i32) -> AppResult<Vec<ReservationDetails>> {
        self.repository.reservations.list_for_user(user_id).await
    }

    /// Waiting list for a book, next in line first
    pub async fn book_queue(&self, book_id: i32) -> AppResult<Vec<ReservationDetails>> {
        // Verify book exists
        self.repository.books.get_by_id(book_id).await?;
        self.repository.reservations.queue_for_book(book_id).await
    }
}
