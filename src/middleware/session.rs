//! Session authentication middleware.
//!
//! Protected routes require a live login session. The browser carries only
//! the session id in a cookie; the session itself lives in the server's
//! [`SessionStore`](crate::auth::SessionStore).

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{AppState, routes::ApiError};

/// Middleware that rejects requests without a live session.
///
/// Sessions of deactivated accounts are ended. On success the
/// [`LoginSession`](crate::auth::LoginSession) is inserted into the request
/// extensions. API and JSON requests get a 401 body; browser
/// requests are redirected to the login page.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_id = req
        .extensions()
        .get::<Cookies>()
        .and_then(|cookies| current_session_id(cookies, &state.config.auth.session.cookie_name));

    let mut session = match session_id {
        Some(id) => state.sessions.get_session(id).await,
        None => None,
    };
    if let Some(live) = &session
        && !account_active(&state, live.user_id).await
    {
        tracing::info!(username = %live.username, "Ending session of deactivated account");
        state.sessions.delete_session(live.id).await;
        session = None;
    }

    match session {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "Request without a valid session");
            if wants_json(req.uri().path(), req.headers()) {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "AUTHENTICATION_REQUIRED",
                    "Authentication required",
                )
                .into_response()
            } else {
                Redirect::to("/login").into_response()
            }
        }
    }
}

/// Whether the account still exists and may sign in. Database errors keep
/// the session; the handler will surface them.
async fn account_active(state: &AppState, user_id: i64) -> bool {
    let Some(services) = &state.services else {
        return false;
    };
    match services.users.get_by_id(user_id).await {
        Ok(user) => user.is_some_and(|u| u.is_active),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to check account status");
            true
        }
    }
}

/// Session id carried by the request's session cookie, if well formed.
pub fn current_session_id(cookies: &Cookies, cookie_name: &str) -> Option<Uuid> {
    cookies
        .get(cookie_name)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

fn wants_json(path: &str, headers: &HeaderMap) -> bool {
    if path.starts_with("/api/") {
        return true;
    }
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}
