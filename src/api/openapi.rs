//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrows, health, reports, reservations, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Lending API",
        version = "1.0.0",
        description = "Library catalog, borrowing and reservation REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::register,
        auth::me,
        auth::update_profile,
        auth::change_password,
        // Books
        books::list_books,
        books::recent_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::request_borrow,
        books::reserve_book,
        books::book_queue,
        books::promote_next,
        // Borrows
        borrows::list_borrows,
        borrows::pending_borrows,
        borrows::active_borrows,
        borrows::overdue_borrows,
        borrows::borrow_history,
        borrows::my_borrows,
        borrows::user_borrows,
        borrows::get_borrow,
        borrows::approve_borrow,
        borrows::reject_borrow,
        borrows::return_borrow,
        // Reservations
        reservations::my_reservations,
        reservations::cancel_reservation,
        reservations::expire_reservations,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        users::user_reservations,
        // Reports
        reports::book_report,
        reports::borrow_report,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::BookBorrowCount,
            // Borrows
            crate::models::borrow::Borrow,
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::BorrowDetails,
            crate::models::borrow::ApproveBorrow,
            crate::services::borrows::UserBorrows,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::ReservationDetails,
            reservations::ExpireResponse,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::CreateUser,
            crate::models::user::RegisterStudent,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            // Reports
            crate::services::reports::BookReport,
            crate::services::reports::BorrowReport,
            // Common
            health::HealthResponse,
            super::MessageResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication and own account"),
        (name = "books", description = "Catalog management"),
        (name = "borrows", description = "Borrow requests, approvals and returns"),
        (name = "reservations", description = "Reservation queue"),
        (name = "users", description = "User management"),
        (name = "reports", description = "Librarian reports")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
