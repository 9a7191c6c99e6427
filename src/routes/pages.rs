//! Minimal HTML pages for browser-based entry.

use std::fmt::Write;

use axum::{Extension, response::Html};

use crate::{
    auth::LoginSession,
    models::{ObservationField, ObservationKind},
};

const STYLE: &str = "body{font-family:sans-serif;max-width:40rem;margin:2rem auto}\
label{display:block;margin-top:.6rem}input,select{width:100%}\
.error{color:#b00020}";

pub async fn login_page() -> Html<String> {
    render_login(None)
}

/// Login page, optionally with an error message.
///
/// Callers pass fixed messages only; nothing user-supplied is echoed.
pub(super) fn render_login(error: Option<&str>) -> Html<String> {
    let error = error
        .map(|e| format!("<p class=\"error\">{e}</p>"))
        .unwrap_or_default();
    Html(format!(
        "<!doctype html><html><head><title>Sign in</title><style>{STYLE}</style></head><body>\
         <h1>Sign in</h1>{error}\
         <form method=\"post\" action=\"/login\">\
         <label>Username<input name=\"username\" autocomplete=\"username\" required></label>\
         <label>Password<input name=\"password\" type=\"password\" autocomplete=\"current-password\" required></label>\
         <p><button type=\"submit\">Sign in</button></p>\
         </form></body></html>"
    ))
}

/// Daily metrics entry form posting to `/submit`.
pub async fn entry_form(Extension(session): Extension<LoginSession>) -> Html<String> {
    let mut fields = String::new();
    for field in ObservationField::ALL {
        let label = field.label();
        let _ = match field {
            ObservationField::SnapshotDate | ObservationField::ArrivalDate => write!(
                fields,
                "<label>{label}<input name=\"{label}\" type=\"date\" required></label>"
            ),
            ObservationField::ActualOrForecast => write!(
                fields,
                "<label>{label}<select name=\"{label}\">\
                 <option>{}</option><option>{}</option></select></label>",
                ObservationKind::Actual.as_str(),
                ObservationKind::Forecast.as_str(),
            ),
            ObservationField::Day => write!(
                fields,
                "<label>{label}<input name=\"{label}\" required></label>"
            ),
            _ => write!(
                fields,
                "<label>{label}<input name=\"{label}\" inputmode=\"decimal\" required></label>"
            ),
        };
    }

    Html(format!(
        "<!doctype html><html><head><title>Daily metrics</title><style>{STYLE}</style></head><body>\
         <h1>Daily metrics</h1><p>Signed in as {} &middot; <a href=\"/logout\">Sign out</a></p>\
         <form method=\"post\" action=\"/submit\">{fields}\
         <p><button type=\"submit\">Save</button></p></form></body></html>",
        escape(&session.username),
    ))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
