use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

use super::CreateObservation;

/// Login names: letters, digits, `.`, `_` and `-`.
/// Examples: "frontdesk", "j.smith", "night_audit-2"
pub static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Rooms sold can never exceed the rooms the hotel has.
pub fn validate_rooms_sold(input: &CreateObservation) -> Result<(), ValidationError> {
    if input.rooms_sold > input.total_room_inventory {
        let mut err = ValidationError::new("rooms_sold_exceeds_inventory");
        err.message = Some(Cow::Owned(format!(
            "Rooms sold ({}) cannot exceed total inventory ({})",
            input.rooms_sold, input.total_room_inventory
        )));
        return Err(err);
    }
    Ok(())
}

/// Flatten validation errors into one human-readable line.
///
/// Struct-level errors come first, then field errors sorted by field name.
/// Errors without a message fall back to `field: code`.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut parts = Vec::new();
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by_key(|(field, _)| field.to_string());
    for (field, kind) in fields {
        let ValidationErrorsKind::Field(list) = kind else {
            continue;
        };
        for err in list {
            let text = match &err.message {
                Some(message) => message.to_string(),
                None if *field == "__all__" => err.code.to_string(),
                None => format!("{field}: {}", err.code),
            };
            if *field == "__all__" {
                parts.insert(0, text);
            } else {
                parts.push(text);
            }
        }
    }
    parts.join("; ")
}
