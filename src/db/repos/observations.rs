use async_trait::async_trait;
use chrono::NaiveDate;

use super::{PageRequest, PageResult, SortOrder};
use crate::{
    db::error::DbResult,
    models::{CreateObservation, MonthlySummary, Observation, ObservationKind},
};

/// Columns a listing may be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObservationSort {
    Id,
    #[default]
    ArrivalDate,
    SnapshotDate,
    OccupancyPercentage,
    RoomRevenue,
    Arr,
    RoomsSold,
    TotalRoomInventory,
    CreatedAt,
    UpdatedAt,
}

impl ObservationSort {
    /// Column name; also the accepted `sort_by` request value.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ArrivalDate => "arrival_date",
            Self::SnapshotDate => "snapshot_date",
            Self::OccupancyPercentage => "occupancy_percentage",
            Self::RoomRevenue => "room_revenue",
            Self::Arr => "arr",
            Self::RoomsSold => "rooms_sold",
            Self::TotalRoomInventory => "total_room_inventory",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    pub fn from_column(s: &str) -> Option<Self> {
        [
            Self::Id,
            Self::ArrivalDate,
            Self::SnapshotDate,
            Self::OccupancyPercentage,
            Self::RoomRevenue,
            Self::Arr,
            Self::RoomsSold,
            Self::TotalRoomInventory,
            Self::CreatedAt,
            Self::UpdatedAt,
        ]
        .into_iter()
        .find(|sort| sort.column() == s)
    }
}

/// Arrival-date range and kind filter. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub kind: Option<ObservationKind>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObservationsParams {
    pub filter: ObservationFilter,
    pub sort_by: ObservationSort,
    pub sort_order: SortOrder,
    pub page: PageRequest,
}

/// Month range (`YYYY-MM`, inclusive) and kind filter for the monthly summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryFilter {
    pub start_month: Option<String>,
    pub end_month: Option<String>,
    pub kind: Option<ObservationKind>,
}

#[async_trait]
pub trait ObservationRepo: Send + Sync {
    /// Append a row. A row with the same snapshot date, arrival date and kind
    /// fails with `DbError::Conflict` and leaves the stored row untouched.
    async fn create(
        &self,
        input: CreateObservation,
        created_by: Option<&str>,
    ) -> DbResult<Observation>;
    async fn get_by_id(&self, id: i64) -> DbResult<Option<Observation>>;
    async fn list(&self, params: &ListObservationsParams) -> DbResult<PageResult<Observation>>;
    /// Every row of one kind, ordered by arrival date then snapshot date.
    async fn list_by_kind(&self, kind: ObservationKind) -> DbResult<Vec<Observation>>;
    /// Rows of the `hotel_data_summary` view, newest month first.
    async fn monthly_summary(&self, filter: &SummaryFilter) -> DbResult<Vec<MonthlySummary>>;
}

/// Message returned when the unique (snapshot, arrival, kind) key is taken.
pub const DUPLICATE_OBSERVATION_MESSAGE: &str =
    "A record for this snapshot date, arrival date, and forecast type already exists";
