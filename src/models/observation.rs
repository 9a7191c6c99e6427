use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use super::validators::validate_rooms_sold;

/// Whether a stored row records what happened or what was forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Actual,
    Forecast,
}

impl ObservationKind {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actual => "actual",
            Self::Forecast => "forecast",
        }
    }

    /// Parse from database or request string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "actual" => Some(Self::Actual),
            "forecast" => Some(Self::Forecast),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stored row of daily hotel metrics (table `hotel_data`).
///
/// Rows are append-only. An amendment is a new row with a later
/// `snapshot_date`; `(snapshot_date, arrival_date, actual_or_forecast)` is
/// unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub total_room_inventory: i64,
    pub rooms_sold: i64,
    pub arrival_rooms: i64,
    pub compliment_rooms: i64,
    pub house_use: i64,
    pub individual_confirm: i64,
    pub occupancy_percentage: f64,
    pub room_revenue: f64,
    pub arr: f64,
    pub departure_rooms: i64,
    pub ooo_rooms: i64,
    pub pax: i64,
    pub snapshot_date: NaiveDate,
    pub arrival_date: NaiveDate,
    pub actual_or_forecast: ObservationKind,
    pub day_of_week: String,
    pub revenue_diff: f64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Observation {
    /// Value of a numeric submission field, `None` for dates and labels.
    pub fn numeric_value(&self, field: ObservationField) -> Option<f64> {
        use ObservationField as F;
        let value = match field {
            F::TotalRoomInventory => self.total_room_inventory as f64,
            F::RoomsSold => self.rooms_sold as f64,
            F::ArrivalRooms => self.arrival_rooms as f64,
            F::ComplimentRooms => self.compliment_rooms as f64,
            F::HouseUse => self.house_use as f64,
            F::IndividualConfirm => self.individual_confirm as f64,
            F::OccupancyPercentage => self.occupancy_percentage,
            F::RoomRevenue => self.room_revenue,
            F::Arr => self.arr,
            F::DepartureRooms => self.departure_rooms as f64,
            F::OooRooms => self.ooo_rooms as f64,
            F::Pax => self.pax as f64,
            F::RevenueDiff => self.revenue_diff,
            F::SnapshotDate | F::ArrivalDate | F::ActualOrForecast | F::Day => return None,
        };
        Some(value)
    }
}

/// A field of the ingestion form, addressed by its submission label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationField {
    TotalRoomInventory,
    RoomsSold,
    ArrivalRooms,
    ComplimentRooms,
    HouseUse,
    IndividualConfirm,
    OccupancyPercentage,
    RoomRevenue,
    Arr,
    DepartureRooms,
    OooRooms,
    Pax,
    SnapshotDate,
    ArrivalDate,
    ActualOrForecast,
    Day,
    RevenueDiff,
}

impl ObservationField {
    /// Every required field, in form order.
    pub const ALL: [ObservationField; 17] = [
        Self::TotalRoomInventory,
        Self::RoomsSold,
        Self::ArrivalRooms,
        Self::ComplimentRooms,
        Self::HouseUse,
        Self::IndividualConfirm,
        Self::OccupancyPercentage,
        Self::RoomRevenue,
        Self::Arr,
        Self::DepartureRooms,
        Self::OooRooms,
        Self::Pax,
        Self::SnapshotDate,
        Self::ArrivalDate,
        Self::ActualOrForecast,
        Self::Day,
        Self::RevenueDiff,
    ];

    /// Fields that must parse as numbers.
    pub const NUMERIC: [ObservationField; 13] = [
        Self::TotalRoomInventory,
        Self::RoomsSold,
        Self::ArrivalRooms,
        Self::ComplimentRooms,
        Self::HouseUse,
        Self::IndividualConfirm,
        Self::OccupancyPercentage,
        Self::RoomRevenue,
        Self::Arr,
        Self::DepartureRooms,
        Self::OooRooms,
        Self::Pax,
        Self::RevenueDiff,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::TotalRoomInventory => "Total Room Inventory",
            Self::RoomsSold => "Rooms Sold",
            Self::ArrivalRooms => "Arrival Rooms",
            Self::ComplimentRooms => "Compliment Rooms",
            Self::HouseUse => "House Use",
            Self::IndividualConfirm => "Individual Confirm",
            Self::OccupancyPercentage => "Occupancy %",
            Self::RoomRevenue => "Room Revenue",
            Self::Arr => "ARR",
            Self::DepartureRooms => "Departure Rooms",
            Self::OooRooms => "OOO Rooms",
            Self::Pax => "Pax",
            Self::SnapshotDate => "snapshot_date",
            Self::ArrivalDate => "arrival_date",
            Self::ActualOrForecast => "actual_or_forecast",
            Self::Day => "Day",
            Self::RevenueDiff => "revenue_diff",
        }
    }

    /// Stored as a whole number; submitted fractions are truncated.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TotalRoomInventory
                | Self::RoomsSold
                | Self::ArrivalRooms
                | Self::ComplimentRooms
                | Self::HouseUse
                | Self::IndividualConfirm
                | Self::DepartureRooms
                | Self::OooRooms
                | Self::Pax
        )
    }
}

/// A validated new observation, ready to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_rooms_sold"))]
pub struct CreateObservation {
    #[validate(range(min = 0))]
    pub total_room_inventory: i64,
    #[validate(range(min = 0))]
    pub rooms_sold: i64,
    #[validate(range(min = 0))]
    pub arrival_rooms: i64,
    #[validate(range(min = 0))]
    pub compliment_rooms: i64,
    #[validate(range(min = 0))]
    pub house_use: i64,
    #[validate(range(min = 0))]
    pub individual_confirm: i64,
    #[validate(range(min = 0.0, max = 100.0, message = "Occupancy percentage must be between 0 and 100"))]
    pub occupancy_percentage: f64,
    #[validate(range(min = 0.0, message = "Room revenue cannot be negative"))]
    pub room_revenue: f64,
    #[validate(range(min = 0.0, message = "ARR cannot be negative"))]
    pub arr: f64,
    #[validate(range(min = 0))]
    pub departure_rooms: i64,
    #[validate(range(min = 0))]
    pub ooo_rooms: i64,
    #[validate(range(min = 0))]
    pub pax: i64,
    pub snapshot_date: NaiveDate,
    pub arrival_date: NaiveDate,
    pub actual_or_forecast: ObservationKind,
    #[validate(length(min = 1, max = 16))]
    pub day_of_week: String,
    pub revenue_diff: f64,
}

/// Why a raw submission was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Missing or empty required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid date format for {field}: '{value}'. Use YYYY-MM-DD format")]
    InvalidDate { field: &'static str, value: String },

    #[error("Fields must be valid numbers: {}", .0.join(", "))]
    InvalidNumeric(Vec<String>),

    #[error("actual_or_forecast must be 'actual' or 'forecast', got '{0}'")]
    InvalidKind(String),

    #[error("{}", super::validators::describe(.0))]
    Invalid(#[from] ValidationErrors),
}

/// Submitted field values keyed by form label, trimmed.
///
/// Both the HTML form and the JSON API submit the same labelled fields
/// (`"Total Room Inventory"`, `"Occupancy %"`, ...). Parsing checks, in order:
/// presence of every field, date format, numeric format, then value ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSubmission(BTreeMap<String, String>);

impl RawSubmission {
    pub fn from_form(fields: HashMap<String, String>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_string()))
                .collect(),
        )
    }

    /// JSON numbers and booleans are taken in their text form; `null` counts
    /// as missing.
    pub fn from_json(fields: &serde_json::Map<String, serde_json::Value>) -> Self {
        use serde_json::Value;
        Self(
            fields
                .iter()
                .filter_map(|(k, v)| {
                    let text = match v {
                        Value::Null => return None,
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    };
                    Some((k.clone(), text))
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, field: ObservationField) -> &str {
        self.0.get(field.label()).map(String::as_str).unwrap_or_default()
    }

    pub fn parse(&self) -> Result<CreateObservation, SubmissionError> {
        let missing: Vec<String> = ObservationField::ALL
            .iter()
            .filter(|f| self.get(**f).is_empty())
            .map(|f| f.label().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SubmissionError::MissingFields(missing));
        }

        let snapshot_date = self.date(ObservationField::SnapshotDate)?;
        let arrival_date = self.date(ObservationField::ArrivalDate)?;

        let mut numbers: HashMap<ObservationField, f64> = HashMap::new();
        let mut invalid = Vec::new();
        for field in ObservationField::NUMERIC {
            match self.get(field).parse::<f64>() {
                Ok(value) if value.is_finite() => {
                    let value = if field.is_integer() { value.trunc() } else { value };
                    numbers.insert(field, value);
                }
                _ => invalid.push(field.label().to_string()),
            }
        }
        if !invalid.is_empty() {
            return Err(SubmissionError::InvalidNumeric(invalid));
        }

        let kind_raw = self.get(ObservationField::ActualOrForecast);
        let actual_or_forecast = ObservationKind::from_str(&kind_raw.to_lowercase())
            .ok_or_else(|| SubmissionError::InvalidKind(kind_raw.to_string()))?;

        let number = |field: ObservationField| numbers.get(&field).copied().unwrap_or_default();
        let count = |field: ObservationField| number(field) as i64;

        let input = CreateObservation {
            total_room_inventory: count(ObservationField::TotalRoomInventory),
            rooms_sold: count(ObservationField::RoomsSold),
            arrival_rooms: count(ObservationField::ArrivalRooms),
            compliment_rooms: count(ObservationField::ComplimentRooms),
            house_use: count(ObservationField::HouseUse),
            individual_confirm: count(ObservationField::IndividualConfirm),
            occupancy_percentage: number(ObservationField::OccupancyPercentage),
            room_revenue: number(ObservationField::RoomRevenue),
            arr: number(ObservationField::Arr),
            departure_rooms: count(ObservationField::DepartureRooms),
            ooo_rooms: count(ObservationField::OooRooms),
            pax: count(ObservationField::Pax),
            snapshot_date,
            arrival_date,
            actual_or_forecast,
            day_of_week: self.get(ObservationField::Day).to_string(),
            revenue_diff: number(ObservationField::RevenueDiff),
        };
        input.validate()?;
        Ok(input)
    }

    fn date(&self, field: ObservationField) -> Result<NaiveDate, SubmissionError> {
        let raw = self.get(field);
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| SubmissionError::InvalidDate {
            field: field.label(),
            value: raw.to_string(),
        })
    }
}

/// Aggregated monthly figures from the `hotel_data_summary` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month_year: String,
    pub actual_or_forecast: ObservationKind,
    pub avg_occupancy: f64,
    pub avg_room_rate: f64,
    pub total_revenue: f64,
    pub total_rooms_sold: i64,
    pub avg_inventory: f64,
    pub total_entries: i64,
}
