//! Router-level tests: login, ingestion, queries and the model lifecycle,
//! each against its own in-memory SQLite database.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Datelike, NaiveDate};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{AppState, build_app, config::AppConfig, models::CreateUser};

const USERNAME: &str = "alice";
const PASSWORD: &str = "correct-horse";

struct TestApp {
    app: Router,
    state: AppState,
    _dir: TempDir,
}

async fn test_app() -> TestApp {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let db_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();

    let config_str = format!(
        r#"
[database]
type = "sqlite"
path = "file:api_e2e_db_{db_id}?mode=memory&cache=shared"
create_if_missing = true
run_migrations = true
wal_mode = false
busy_timeout_ms = 5000

[forecasting]
model_path = "{model}"
report_dir = "{reports}"

[forecasting.search]
enabled = false
"#,
        model = dir.path().join("model.json").display(),
        reports = dir.path().join("reports").display(),
    );

    let config = AppConfig::from_str(&config_str).expect("Failed to parse test config");
    let state = AppState::new(config.clone())
        .await
        .expect("Failed to create AppState");
    state
        .services
        .as_ref()
        .unwrap()
        .users
        .create(CreateUser {
            username: USERNAME.into(),
            password: PASSWORD.into(),
            full_name: Some("Alice Example".into()),
            role: "staff".into(),
        })
        .await
        .unwrap();

    TestApp {
        app: build_app(&config, state.clone()),
        state,
        _dir: dir,
    }
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    text: String,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }

    fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        headers,
        text: String::from_utf8_lossy(&body).into_owned(),
    }
}

fn json_request(method: Method, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Log in through the JSON API and return the `name=value` cookie pair.
async fn login(app: &Router) -> String {
    let reply = send(
        app,
        json_request(
            Method::POST,
            "/api/login",
            None,
            &json!({"username": USERNAME, "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
    session_cookie(&reply)
}

fn session_cookie(reply: &Reply) -> String {
    let set_cookie = reply.header(header::SET_COOKIE).expect("no session cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

fn submission(arrival: NaiveDate, kind: &str) -> Value {
    let day = arrival.format("%A").to_string();
    let offset = arrival.ordinal0() as f64;
    let rooms_sold = 70.0 + (offset % 7.0) * 4.0;
    json!({
        "Total Room Inventory": 120,
        "Rooms Sold": rooms_sold,
        "Arrival Rooms": 30,
        "Compliment Rooms": 1,
        "House Use": 0,
        "Individual Confirm": 40,
        "Occupancy %": rooms_sold / 1.2,
        "Room Revenue": rooms_sold * 105.0,
        "ARR": 105.0,
        "Departure Rooms": 28,
        "OOO Rooms": 2,
        "Pax": rooms_sold + 25.0,
        "snapshot_date": arrival.to_string(),
        "arrival_date": arrival.to_string(),
        "actual_or_forecast": kind,
        "Day": day,
        "revenue_diff": 0,
    })
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}


async fn submit(app: &Router, cookie: &str, body: &Value) -> Reply {
    send(
        app,
        json_request(Method::POST, "/api/submit", Some(cookie), body),
    )
    .await
}

#[tokio::test]
async fn test_api_health() {
    let t = test_app().await;
    let reply = send(&t.app, get_request("/api/health", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["message"], "Database connection healthy");

    let reply = send(&t.app, get_request("/health", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["subsystems"]["database"]["healthy"], true);
    assert_eq!(body["subsystems"]["model"]["healthy"], false);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let t = test_app().await;

    let reply = send(&t.app, get_request("/api/data", None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["error_code"], "AUTHENTICATION_REQUIRED");

    let reply = send(&t.app, get_request("/", None)).await;
    assert!(reply.status.is_redirection());
    assert_eq!(reply.header(header::LOCATION), Some("/login"));

    let forged = "hotel_session=00000000-0000-0000-0000-000000000000";
    let reply = send(&t.app, get_request("/api/data", Some(forged))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failures() {
    let t = test_app().await;

    let reply = send(
        &t.app,
        json_request(
            Method::POST,
            "/api/login",
            None,
            &json!({"username": USERNAME, "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["error_code"], "INVALID_CREDENTIALS");
    assert!(reply.header(header::SET_COOKIE).is_none());

    let reply = send(
        &t.app,
        json_request(Method::POST, "/api/login", None, &json!({"username": USERNAME})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_code"], "MISSING_CREDENTIALS");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("alice"))
        .unwrap();
    let reply = send(&t.app, request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_code"], "INVALID_CONTENT_TYPE");
}

#[tokio::test]
async fn test_login_returns_profile_and_logout_ends_session() {
    let t = test_app().await;
    let reply = send(
        &t.app,
        json_request(
            Method::POST,
            "/api/login",
            None,
            &json!({"username": USERNAME, "password": PASSWORD}),
        ),
    )
    .await;
    let body = reply.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["username"], USERNAME);
    assert!(body["user"].get("password_hash").is_none());
    let cookie = session_cookie(&reply);

    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(
        &t.app,
        json_request(Method::POST, "/api/logout", Some(&cookie), &json!({})),
    )
    .await;
    assert_eq!(reply.json()["message"], "Logout successful");

    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_account_loses_session() {
    let t = test_app().await;
    let cookie = login(&t.app).await;

    let users = &t.state.services.as_ref().unwrap().users;
    users.set_active(USERNAME, false).await.unwrap();

    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    users.set_active(USERNAME, true).await.unwrap();
    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "ended sessions stay ended");
}

#[tokio::test]
async fn test_form_login_redirects() {
    let t = test_app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={USERNAME}&password={PASSWORD}")))
        .unwrap();
    let reply = send(&t.app, request).await;
    assert!(reply.status.is_redirection());
    assert_eq!(reply.header(header::LOCATION), Some("/"));

    let cookie = session_cookie(&reply);
    let reply = send(&t.app, get_request("/", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text.contains("name=\"Occupancy %\""));
}

#[tokio::test]
async fn test_submit_and_duplicate() {
    let t = test_app().await;
    let cookie = login(&t.app).await;
    let body = submission(date(2024, 5, 3), "actual");

    let reply = submit(&t.app, &cookie, &body).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
    let saved = reply.json();
    assert_eq!(saved["status"], "success");
    assert_eq!(saved["message"], "Data saved successfully");
    assert_eq!(saved["arrival_date"], "2024-05-03");

    let reply = submit(&t.app, &cookie, &body).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    let error = reply.json();
    assert_eq!(error["error_code"], "DUPLICATE_RECORD");
    assert_eq!(
        error["message"],
        "A record for this snapshot date, arrival date, and forecast type already exists"
    );

    // Same dates as a forecast row is a different record.
    let reply = submit(&t.app, &cookie, &submission(date(2024, 5, 3), "forecast")).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    let listing = reply.json();
    assert_eq!(listing["pagination"]["total_records"], 2);
    assert_eq!(listing["data"][0]["created_by"], USERNAME);

    let id = saved_id(&listing, "actual");
    let reply = send(&t.app, get_request(&format!("/api/data/{id}"), Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["data"]["rooms_sold"], body["Rooms Sold"].as_f64().unwrap() as i64);
}

fn saved_id(listing: &Value, kind: &str) -> i64 {
    listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["actual_or_forecast"] == kind)
        .and_then(|row| row["id"].as_i64())
        .unwrap()
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let t = test_app().await;
    let cookie = login(&t.app).await;

    let mut body = submission(date(2024, 5, 3), "actual");
    body.as_object_mut().unwrap().remove("Pax");
    body["Day"] = json!("  ");
    let reply = submit(&t.app, &cookie, &body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let error = reply.json();
    assert_eq!(error["error_code"], "MISSING_FIELDS");
    assert_eq!(error["missing_fields"], json!(["Pax", "Day"]));

    let mut body = submission(date(2024, 5, 3), "actual");
    body["arrival_date"] = json!("03/05/2024");
    let reply = submit(&t.app, &cookie, &body).await;
    assert_eq!(reply.json()["error_code"], "INVALID_DATE_FORMAT");

    let mut body = submission(date(2024, 5, 3), "actual");
    body["ARR"] = json!("lots");
    let reply = submit(&t.app, &cookie, &body).await;
    let error = reply.json();
    assert_eq!(error["error_code"], "INVALID_NUMERIC_VALUES");
    assert_eq!(error["invalid_fields"], json!(["ARR"]));

    let mut body = submission(date(2024, 5, 3), "actual");
    body["Occupancy %"] = json!(101);
    let reply = submit(&t.app, &cookie, &body).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_code"], "VALIDATION_ERROR");

    let reply = submit(&t.app, &cookie, &json!({})).await;
    assert_eq!(reply.json()["error_code"], "EMPTY_BODY");

    let reply = send(&t.app, get_request("/api/data", Some(&cookie))).await;
    assert_eq!(reply.json()["pagination"]["total_records"], 0);
}

#[tokio::test]
async fn test_form_submit_errors_are_plain_text() {
    let t = test_app().await;
    let cookie = login(&t.app).await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/submit")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, &cookie)
        .body(Body::from("Pax=10"))
        .unwrap();
    let reply = send(&t.app, request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.text.starts_with("Error: Missing or empty required fields: "));
    assert!(!reply.text.contains("Pax,"));
}

#[tokio::test]
async fn test_listing_pagination_and_filters() {
    let t = test_app().await;
    let cookie = login(&t.app).await;
    for day in 1..=5 {
        let reply = submit(&t.app, &cookie, &submission(date(2024, 3, day), "actual")).await;
        assert_eq!(reply.status, StatusCode::OK);
    }
    submit(&t.app, &cookie, &submission(date(2024, 3, 6), "forecast")).await;

    let reply = send(
        &t.app,
        get_request(
            "/api/data?limit=2&page=1&sort_order=ASC&actual_or_forecast=actual",
            Some(&cookie),
        ),
    )
    .await;
    let body = reply.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["arrival_date"], "2024-03-01");
    assert_eq!(
        body["pagination"],
        json!({
            "page": 1,
            "limit": 2,
            "total_records": 5,
            "total_pages": 3,
            "has_next": true,
            "has_prev": false,
        })
    );
    assert_eq!(body["filters"]["sort_by"], "arrival_date");
    assert_eq!(body["filters"]["sort_order"], "asc");
    assert_eq!(body["filters"]["actual_or_forecast"], "actual");

    let reply = send(
        &t.app,
        get_request(
            "/api/data?start_date=2024-03-02&end_date=2024-03-04",
            Some(&cookie),
        ),
    )
    .await;
    let body = reply.json();
    assert_eq!(body["pagination"]["total_records"], 3);
    assert_eq!(body["data"][0]["arrival_date"], "2024-03-04");

    let reply = send(&t.app, get_request("/api/data?page=0", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_code"], "INVALID_PAGE");

    let reply = send(
        &t.app,
        get_request("/api/data?page=9223372036854775807", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_code"], "INVALID_PAGE");

    let reply = send(&t.app, get_request("/api/data?start_date=March", Some(&cookie))).await;
    assert_eq!(reply.json()["message"], "Invalid start_date format. Use YYYY-MM-DD");
}

#[tokio::test]
async fn test_record_not_found_and_summary() {
    let t = test_app().await;
    let cookie = login(&t.app).await;

    let reply = send(&t.app, get_request("/api/data/999", Some(&cookie))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "Record with ID 999 not found");

    for day in [1, 2] {
        submit(&t.app, &cookie, &submission(date(2024, 4, day), "actual")).await;
    }
    let reply = send(
        &t.app,
        get_request("/api/data/summary?start_month=2024-04", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
    let body = reply.json();
    assert_eq!(body["data"][0]["month_year"], "2024-04");
    assert_eq!(body["data"][0]["total_entries"], 2);
    assert_eq!(body["filters"]["start_month"], "2024-04");

    let reply = send(
        &t.app,
        get_request("/api/data/summary?end_month=April", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.json()["error_code"], "INVALID_MONTH_FORMAT");
}

#[tokio::test]
async fn test_unknown_routes() {
    let t = test_app().await;
    let reply = send(&t.app, get_request("/api/nope", None)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "Endpoint not found");

    let reply = send(&t.app, get_request("/api/login", None)).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.json()["message"], "Method not allowed");
}

#[tokio::test]
async fn test_forecast_requires_model() {
    let t = test_app().await;
    let cookie = login(&t.app).await;

    let reply = send(&t.app, get_request("/api/model", Some(&cookie))).await;
    assert_eq!(reply.json()["model"], Value::Null);

    let reply = send(
        &t.app,
        json_request(Method::POST, "/api/forecast", Some(&cookie), &json!({"periods": 7})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["error_code"], "MODEL_NOT_FOUND");
}

#[tokio::test]
async fn test_retrain_then_forecast() {
    let t = test_app().await;
    let cookie = login(&t.app).await;
    let start = date(2024, 1, 1);
    for i in 0..60 {
        let reply = submit(
            &t.app,
            &cookie,
            &submission(start + chrono::Duration::days(i), "actual"),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    let reply = send(
        &t.app,
        json_request(Method::POST, "/api/model/retrain", Some(&cookie), &json!({})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    let job_id = reply.json()["job"]["id"].as_str().unwrap().to_string();

    let mut status = String::new();
    for _ in 0..600 {
        let reply = send(
            &t.app,
            get_request(&format!("/api/model/jobs/{job_id}"), Some(&cookie)),
        )
        .await;
        status = reply.json()["job"]["status"].as_str().unwrap().to_string();
        if status != "pending" && status != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, "succeeded");

    let reply = send(&t.app, get_request("/api/model", Some(&cookie))).await;
    assert_eq!(reply.json()["model"]["history_end"], "2024-02-29");

    let reply = send(
        &t.app,
        json_request(Method::POST, "/api/forecast", Some(&cookie), &json!({"periods": 7})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
    let body = reply.json();
    assert_eq!(body["count"], 7);
    assert_eq!(body["forecast"][0]["ds"], "2024-03-01");

    let reply = send(
        &t.app,
        get_request("/api/forecast/report?periods=5", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.text.starts_with("Forecast Results"));

    let reply = send(&t.app, get_request("/api/forecast/chart", Some(&cookie))).await;
    assert_eq!(reply.header(header::CONTENT_TYPE), Some("image/svg+xml"));
    assert!(reply.text.contains("<svg"));

    let reply = send(
        &t.app,
        get_request("/api/model/jobs/00000000-0000-0000-0000-000000000000", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.json()["error_code"], "JOB_NOT_FOUND");
}
