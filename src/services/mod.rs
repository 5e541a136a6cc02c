//! Business logic services

pub mod borrows;
pub mod catalog;
pub mod lending;
pub mod reports;
pub mod reservations;
pub mod users;

use std::sync::Arc;

use crate::{
    config::{AuthConfig, LendingConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub lending: lending::LendingService,
    pub borrows: borrows::BorrowsService,
    pub reservations: reservations::ReservationsService,
    pub reports: reports::ReportsService,
}

impl Services {
    /// Create all services with the given repository.
    ///
    /// Also returns the receiving end of the promotion queue fed by returns;
    /// pass it to [`lending::spawn_promotion_worker`].
    pub fn new(
        repository: Repository,
        auth_config: AuthConfig,
        lending_config: LendingConfig,
    ) -> (Self, lending::PromotionReceiver) {
        let page_size = lending_config.page_size;
        let (lending, promotions) =
            lending::LendingService::new(Arc::new(repository.lending_store()), lending_config);

        let services = Self {
            catalog: catalog::CatalogService::new(repository.clone(), page_size),
            users: users::UsersService::new(repository.clone(), auth_config),
            lending,
            borrows: borrows::BorrowsService::new(repository.clone()),
            reservations: reservations::ReservationsService::new(repository.clone()),
            reports: reports::ReportsService::new(repository),
        };

        (services, promotions)
    }
}
