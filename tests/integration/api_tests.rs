//! API integration tests
//!
//! Expect a running server with a bootstrap administrator `admin`/`admin`:
//! `BIBLIOTHECA_AUTH__ADMIN_USERNAME=admin BIBLIOTHECA_AUTH__ADMIN_PASSWORD=admin cargo run`

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Unique suffix so repeated runs do not collide on usernames
fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn login(client: &Client, username: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn admin_token(client: &Client) -> String {
    login(client, "admin", "admin").await
}

/// Register a reader and return (user id, token)
async fn reader(client: &Client) -> (i64, String) {
    let username = unique("reader");
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({ "username": username, "password": "secret" }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    let id = body["id"].as_i64().expect("No id");
    (id, login(client, &username, "secret").await)
}

async fn create_book(client: &Client, admin: &str, copies: i32) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({ "name": unique("Book "), "available_copies": copies }))
        .send()
        .await
        .expect("Failed to create book");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().expect("No id")
}

async fn copies_of(client: &Client, token: &str, book_id: i64) -> i64 {
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["available_copies"].as_i64().expect("No copies")
}

async fn borrow(client: &Client, token: &str, book_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/loans/me", BASE_URL))
        .bearer_auth(token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to borrow")
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
async fn test_readiness_check() {
    let client = Client::new();

    let response = client.get(format!("{}/ready", BASE_URL)).send().await.unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "username": "admin", "password": "admin" }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_login_invalid_credentials() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({ "username": "admin", "password": "wrong" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans/me", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_reader_cannot_use_admin_routes() {
    let client = Client::new();
    let (_, token) = reader(&client).await;

    let response = client
        .get(format!("{}/loans", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_borrow_without_copies_leaves_counter() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 0).await;

    let response = borrow(&client, &token, book_id).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("No copies"));
    assert_eq!(copies_of(&client, &token, book_id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_restores_counter() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (user_id, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 2).await;

    let response = borrow(&client, &token, book_id).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "LOANED");
    assert_eq!(loan["user_id"].as_i64(), Some(user_id));
    assert_eq!(copies_of(&client, &token, book_id).await, 1);

    let response = client
        .post(format!("{}/loans/me/{}/return", BASE_URL, loan["id"]))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let returned: Value = response.json().await.unwrap();
    assert_eq!(returned["status"], "RETURNED");
    assert!(returned["returned"].is_string());
    assert_eq!(copies_of(&client, &token, book_id).await, 2);
}

#[tokio::test]
#[ignore]
async fn test_second_active_loan_of_same_book_is_rejected() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 5).await;

    assert_eq!(borrow(&client, &token, book_id).await.status(), StatusCode::CREATED);
    assert_eq!(borrow(&client, &token, book_id).await.status(), StatusCode::CONFLICT);
    assert_eq!(copies_of(&client, &token, book_id).await, 4);
}

#[tokio::test]
#[ignore]
async fn test_double_return_is_rejected() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let loan: Value = borrow(&client, &token, book_id).await.json().await.unwrap();
    let url = format!("{}/loans/me/{}/return", BASE_URL, loan["id"]);

    let first = client.post(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = client.post(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(copies_of(&client, &token, book_id).await, 1);
}

#[tokio::test]
#[ignore]
async fn test_cannot_return_another_users_loan() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, owner) = reader(&client).await;
    let (_, other) = reader(&client).await;
    let book_id = create_book(&client, &admin, 1).await;

    let loan: Value = borrow(&client, &owner, book_id).await.json().await.unwrap();

    let response = client
        .post(format!("{}/loans/me/{}/return", BASE_URL, loan["id"]))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(copies_of(&client, &owner, book_id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_delete_loan_compensates_only_active_loans() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 3).await;

    // Active loan: deleting it gives the copy back
    let active: Value = borrow(&client, &token, book_id).await.json().await.unwrap();
    assert_eq!(copies_of(&client, &token, book_id).await, 2);
    let response = client
        .delete(format!("{}/loans/{}", BASE_URL, active["id"]))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(copies_of(&client, &token, book_id).await, 3);

    // Returned loan: deleting it leaves the counter alone
    let loan: Value = borrow(&client, &token, book_id).await.json().await.unwrap();
    client
        .post(format!("{}/loans/me/{}/return", BASE_URL, loan["id"]))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    client
        .delete(format!("{}/loans/{}", BASE_URL, loan["id"]))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(copies_of(&client, &token, book_id).await, 3);
}

#[tokio::test]
#[ignore]
async fn test_backfill_does_not_touch_counter() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (user_id, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 2).await;

    let response = client
        .post(format!("{}/loans/backfill", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({
            "user_id": user_id,
            "book_id": book_id,
            "status": "RETURNED",
            "loaned_at": "2020-01-01T10:00:00Z",
            "returned": "2020-01-15T10:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(copies_of(&client, &token, book_id).await, 2);
}

#[tokio::test]
#[ignore]
async fn test_list_own_loans_is_paginated() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (user_id, token) = reader(&client).await;
    for _ in 0..3 {
        let book_id = create_book(&client, &admin, 1).await;
        borrow(&client, &token, book_id).await;
    }

    let body: Value = client
        .get(format!("{}/loans/me?page=0&size=2&sort_direction=DESC", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["total"], 3);
    assert_eq!(body["total_pages"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|loan| loan["user_id"].as_i64() == Some(user_id)));
}

#[tokio::test]
#[ignore]
async fn test_unknown_sort_field_is_rejected() {
    let client = Client::new();
    let (_, token) = reader(&client).await;

    let response = client
        .get(format!("{}/books?sort_field=password", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_huge_page_index_is_rejected() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let response = client
        .get(format!("{}/loans?page=922337203685477580&size=1000", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_edit_cannot_return_before_stored_loan_date() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (user_id, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 1).await;
    let loan: Value = borrow(&client, &token, book_id).await.json().await.unwrap();

    let response = client
        .put(format!("{}/loans/{}", BASE_URL, loan["id"]))
        .bearer_auth(&admin)
        .json(&json!({
            "user_id": user_id,
            "book_id": book_id,
            "status": "RETURNED",
            "returned": "2000-01-01T00:00:00Z"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_search_wildcards_match_literally() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    create_book(&client, &admin, 1).await;

    let body: Value = client
        .get(format!("{}/books?name=_", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let items = body["items"].as_array().unwrap();
    assert!(items
        .iter()
        .all(|book| book["name"].as_str().unwrap().contains('_')));
}

#[tokio::test]
#[ignore]
async fn test_user_with_active_loan_cannot_be_deleted() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (user_id, token) = reader(&client).await;
    let book_id = create_book(&client, &admin, 1).await;
    borrow(&client, &token, book_id).await;

    let response = client
        .delete(format!("{}/users/{}", BASE_URL, user_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = client
        .delete(format!("{}/users/{}", BASE_URL, i32::MAX))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
