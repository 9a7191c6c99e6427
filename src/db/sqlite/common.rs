use crate::{
    db::error::{DbError, DbResult},
    models::ObservationKind,
};

/// Parse a stored `actual_or_forecast` value, returning a DbError on failure
pub fn parse_kind(s: &str) -> DbResult<ObservationKind> {
    ObservationKind::from_str(s)
        .ok_or_else(|| DbError::Internal(format!("Invalid observation kind in database: {s}")))
}
