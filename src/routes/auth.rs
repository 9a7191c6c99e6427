//! Login and logout.
//!
//! Both the browser form and the JSON API create the same server-side
//! session; the cookie only carries its id.

use axum::{
    Form, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::{Value, json};
use tower_cookies::{Cookie, Cookies, cookie::time::Duration as CookieDuration};

use super::{ApiError, json_object, pages, require_services};
use crate::{
    AppState,
    auth::LoginSession,
    config::SessionConfig,
    middleware::current_session_id,
    models::{LoginRequest, User, UserProfile},
};

/// Browser login. Success redirects to the entry form; failures re-render
/// the login page.
pub async fn form_login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginRequest>,
) -> Response {
    match login(&state, &cookies, &form.username, &form.password).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err) => (err.status(), pages::render_login(Some(err.message()))).into_response(),
    }
}

pub async fn api_login(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let data = json_object(&headers, &body)?;
    let field = |name: &str| data.get(name).and_then(Value::as_str).unwrap_or_default();

    let user = login(&state, &cookies, field("username"), field("password")).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Login successful",
        "user": UserProfile::from(&user),
    })))
}

pub async fn form_logout(State(state): State<AppState>, cookies: Cookies) -> Redirect {
    logout(&state, &cookies).await;
    Redirect::to("/login")
}

pub async fn api_logout(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    logout(&state, &cookies).await;
    Json(json!({
        "status": "success",
        "message": "Logout successful",
    }))
}

async fn login(
    state: &AppState,
    cookies: &Cookies,
    username: &str,
    password: &str,
) -> Result<User, ApiError> {
    let username = username.trim();
    let password = password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request(
            "MISSING_CREDENTIALS",
            "Username and password are required",
        ));
    }

    let services = require_services(state)?;
    let user = match services.users.authenticate(username, password).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(username, "Failed login attempt");
            return Err(e.into());
        }
    };

    let session_config = &state.config.auth.session;
    let ttl = chrono::Duration::seconds(session_config.duration_secs as i64);
    let session_id = state
        .sessions
        .create_session(LoginSession::new(&user, ttl))
        .await;
    cookies.add(session_cookie(session_config, session_id.to_string()));

    tracing::info!(user_id = user.id, username = %user.username, "User logged in");
    Ok(user)
}

async fn logout(state: &AppState, cookies: &Cookies) {
    let session_config = &state.config.auth.session;
    if let Some(session_id) = current_session_id(cookies, &session_config.cookie_name) {
        if let Some(session) = state.sessions.get_session(session_id).await {
            tracing::info!(username = %session.username, "User logged out");
        }
        state.sessions.delete_session(session_id).await;
    }
    cookies.add(clear_session_cookie(session_config));
}

fn session_cookie(config: &SessionConfig, value: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(config.same_site.into())
        .max_age(CookieDuration::seconds(config.duration_secs as i64))
        .build()
}

fn clear_session_cookie(config: &SessionConfig) -> Cookie<'static> {
    let mut cookie = session_cookie(config, String::new());
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}
