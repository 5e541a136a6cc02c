//! API integration tests
//!
//! These run against a live server started with the default configuration
//! (bootstrap librarian `admin@library.com` / `password`).

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";
const LIBRARIAN_EMAIL: &str = "admin@library.com";
const LIBRARIAN_PASSWORD: &str = "password";

async fn login(client: &Client, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Unique suffix so repeated runs don't collide on ISBN or email
fn unique() -> String {
    Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string()
}

async fn create_book(client: &Client, token: &str, quantity: i32) -> Value {
    let suffix = unique();
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "title": format!("Integration Book {}", suffix),
            "author": "Test Author",
            "isbn": format!("978{}", &suffix[suffix.len() - 10..]),
            "quantity": quantity
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse response")
}

async fn register_student(client: &Client) -> String {
    let email = format!("student{}@school.test", unique());
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "name": "Integration Student",
            "email": email,
            "password": "secret123"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    login(client, &email, "secret123").await
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "email": LIBRARIAN_EMAIL, "password": LIBRARIAN_PASSWORD }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["role"], "librarian");
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_create_and_get_book() {
    let client = Client::new();
    let token = login(&client, LIBRARIAN_EMAIL, LIBRARIAN_PASSWORD).await;

    let book = create_book(&client, &token, 3).await;
    assert_eq!(book["quantity"], 3);
    assert_eq!(book["available"], 3);

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book["id"]))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let fetched: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(fetched["isbn"], book["isbn"]);
}

#[tokio::test]
#[ignore]
async fn test_borrow_approve_return_flow() {
    let client = Client::new();
    let librarian = login(&client, LIBRARIAN_EMAIL, LIBRARIAN_PASSWORD).await;
    let student = register_student(&client).await;

    let book = create_book(&client, &librarian, 1).await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book["id"]))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let borrow: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(borrow["status"], "pending");

    // A second request for the same book is refused
    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book["id"]))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = client
        .post(format!("{}/borrows/{}/approve", BASE_URL, borrow["id"]))
        .bearer_auth(&librarian)
        .json(&json!({ "due_date": Utc::now() + Duration::days(14) }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let approved: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(approved["status"], "approved");

    let response = client
        .get(format!("{}/books/{}", BASE_URL, book["id"]))
        .bearer_auth(&librarian)
        .send()
        .await
        .expect("Failed to send request");
    let fetched: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(fetched["available"], 0);

    let response = client
        .post(format!("{}/borrows/{}/return", BASE_URL, borrow["id"]))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let returned: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(returned["status"], "returned");
    assert!(returned["return_date"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_reserve_refused_while_copies_available() {
    let client = Client::new();
    let librarian = login(&client, LIBRARIAN_EMAIL, LIBRARIAN_PASSWORD).await;
    let student = register_student(&client).await;

    let book = create_book(&client, &librarian, 2).await;

    let response = client
        .post(format!("{}/books/{}/reserve", BASE_URL, book["id"]))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_approve_without_due_date_uses_configured_loan_length() {
    let client = Client::new();
    let librarian = login(&client, LIBRARIAN_EMAIL, LIBRARIAN_PASSWORD).await;
    let student = register_student(&client).await;

    let book = create_book(&client, &librarian, 1).await;

    let response = client
        .post(format!("{}/books/{}/borrow", BASE_URL, book["id"]))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    let borrow: Value = response.json().await.expect("Failed to parse response");

    let response = client
        .post(format!("{}/borrows/{}/approve", BASE_URL, borrow["id"]))
        .bearer_auth(&librarian)
        .json(&json!({}))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let approved: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(approved["status"], "approved");
    assert!(approved["due_date"].is_string());
}
