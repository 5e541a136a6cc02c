//! Repository layer for database operations

pub mod books;
pub mod borrows;
pub mod lending;
pub mod reservations;
pub mod users;

#[cfg(test)]
pub mod memory;

use sqlx::{Pool, Postgres};

pub use lending::{LendingStore, LendingTx, PgLendingStore};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub borrows: borrows::BorrowsRepository,
    pub reservations: reservations::ReservationsRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }

    /// Transactional store used by the lending lifecycle
    pub fn lending_store(&self) -> PgLendingStore {
        PgLendingStore::new(self.pool.clone())
    }

    /// Round-trip to the database (readiness probe)
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
