//! Shared tests for ObservationRepo implementations

use chrono::NaiveDate;

use crate::{
    db::{
        error::DbError,
        repos::{
            DUPLICATE_OBSERVATION_MESSAGE, ListObservationsParams, ObservationFilter,
            ObservationRepo, ObservationSort, PageRequest, SortOrder, SummaryFilter,
        },
    },
    models::{CreateObservation, ObservationKind},
};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn input(arrival: &str, snapshot: &str, kind: ObservationKind, revenue: f64) -> CreateObservation {
    CreateObservation {
        total_room_inventory: 120,
        rooms_sold: 90,
        arrival_rooms: 30,
        compliment_rooms: 1,
        house_use: 0,
        individual_confirm: 12,
        occupancy_percentage: 75.0,
        room_revenue: revenue,
        arr: revenue / 90.0,
        departure_rooms: 28,
        ooo_rooms: 2,
        pax: 140,
        snapshot_date: date(snapshot),
        arrival_date: date(arrival),
        actual_or_forecast: kind,
        day_of_week: "Monday".to_string(),
        revenue_diff: 0.0,
    }
}

fn actual(arrival: &str, revenue: f64) -> CreateObservation {
    input(arrival, arrival, ObservationKind::Actual, revenue)
}

pub async fn test_create_and_get(repo: &dyn ObservationRepo) {
    let created = repo
        .create(actual("2024-03-04", 9000.0), Some("frontdesk"))
        .await
        .expect("Failed to create observation");

    assert!(created.id > 0);
    assert_eq!(created.created_by.as_deref(), Some("frontdesk"));

    let fetched = repo
        .get_by_id(created.id)
        .await
        .expect("Query failed")
        .expect("Observation not found");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.arrival_date, date("2024-03-04"));
    assert_eq!(fetched.snapshot_date, date("2024-03-04"));
    assert_eq!(fetched.actual_or_forecast, ObservationKind::Actual);
    assert_eq!(fetched.room_revenue, 9000.0);
    assert_eq!(fetched.rooms_sold, 90);
    assert_eq!(fetched.pax, 140);
    assert_eq!(fetched.day_of_week, "Monday");
    assert_eq!(fetched.created_by.as_deref(), Some("frontdesk"));
}

pub async fn test_get_by_id_not_found(repo: &dyn ObservationRepo) {
    let result = repo.get_by_id(999_999).await.expect("Query failed");
    assert!(result.is_none());
}

pub async fn test_duplicate_rejected_and_first_kept(repo: &dyn ObservationRepo) {
    repo.create(actual("2024-03-04", 9000.0), None)
        .await
        .expect("Failed to create observation");

    let result = repo.create(actual("2024-03-04", 1.0), None).await;
    match result {
        Err(DbError::Conflict(message)) => assert_eq!(message, DUPLICATE_OBSERVATION_MESSAGE),
        other => panic!("expected conflict, got {other:?}"),
    }

    let page = repo
        .list(&ListObservationsParams::default())
        .await
        .expect("Failed to list");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].room_revenue, 9000.0);
}

pub async fn test_amendment_and_other_kind_allowed(repo: &dyn ObservationRepo) {
    repo.create(actual("2024-03-04", 9000.0), None)
        .await
        .expect("Failed to create observation");
    repo.create(
        input("2024-03-04", "2024-03-06", ObservationKind::Actual, 9100.0),
        None,
    )
    .await
    .expect("A later snapshot should be accepted");
    repo.create(
        input("2024-03-04", "2024-03-04", ObservationKind::Forecast, 8000.0),
        None,
    )
    .await
    .expect("A forecast row should not clash with the actual row");

    let page = repo
        .list(&ListObservationsParams::default())
        .await
        .expect("Failed to list");
    assert_eq!(page.total, 3);
}

pub async fn test_list_filters_and_pages(repo: &dyn ObservationRepo) {
    for (day, revenue) in [("01", 100.0), ("02", 200.0), ("03", 300.0), ("04", 400.0), ("05", 500.0)]
    {
        repo.create(actual(&format!("2024-01-{day}"), revenue), None)
            .await
            .expect("Failed to create observation");
    }
    repo.create(
        input("2024-01-03", "2024-01-01", ObservationKind::Forecast, 999.0),
        None,
    )
    .await
    .expect("Failed to create observation");

    let params = ListObservationsParams {
        filter: ObservationFilter {
            start_date: Some(date("2024-01-02")),
            end_date: Some(date("2024-01-05")),
            kind: Some(ObservationKind::Actual),
        },
        sort_by: ObservationSort::ArrivalDate,
        sort_order: SortOrder::Asc,
        page: PageRequest { page: 2, limit: 3 },
    };
    let page = repo.list(&params).await.expect("Failed to list");
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].arrival_date, date("2024-01-05"));

    let first = repo
        .list(&ListObservationsParams {
            page: PageRequest { page: 1, limit: 3 },
            ..params.clone()
        })
        .await
        .expect("Failed to list");
    let dates: Vec<_> = first.items.iter().map(|o| o.arrival_date).collect();
    assert_eq!(
        dates,
        vec![date("2024-01-02"), date("2024-01-03"), date("2024-01-04")]
    );
}

pub async fn test_list_sorted_by_revenue_desc(repo: &dyn ObservationRepo) {
    for (day, revenue) in [("01", 300.0), ("02", 100.0), ("03", 200.0)] {
        repo.create(actual(&format!("2024-01-{day}"), revenue), None)
            .await
            .expect("Failed to create observation");
    }

    let page = repo
        .list(&ListObservationsParams {
            sort_by: ObservationSort::RoomRevenue,
            sort_order: SortOrder::Desc,
            ..ListObservationsParams::default()
        })
        .await
        .expect("Failed to list");
    let revenues: Vec<_> = page.items.iter().map(|o| o.room_revenue).collect();
    assert_eq!(revenues, vec![300.0, 200.0, 100.0]);
}

pub async fn test_list_by_kind_orders_by_arrival_then_snapshot(repo: &dyn ObservationRepo) {
    repo.create(
        input("2024-01-02", "2024-01-03", ObservationKind::Actual, 2.0),
        None,
    )
    .await
    .expect("Failed to create observation");
    repo.create(actual("2024-01-02", 1.0), None)
        .await
        .expect("Failed to create observation");
    repo.create(actual("2024-01-01", 0.5), None)
        .await
        .expect("Failed to create observation");
    repo.create(
        input("2024-01-01", "2024-01-01", ObservationKind::Forecast, 9.0),
        None,
    )
    .await
    .expect("Failed to create observation");

    let rows = repo
        .list_by_kind(ObservationKind::Actual)
        .await
        .expect("Failed to list");
    let keys: Vec<_> = rows
        .iter()
        .map(|o| (o.arrival_date, o.snapshot_date))
        .collect();
    assert_eq!(
        keys,
        vec![
            (date("2024-01-01"), date("2024-01-01")),
            (date("2024-01-02"), date("2024-01-02")),
            (date("2024-01-02"), date("2024-01-03")),
        ]
    );
}

pub async fn test_monthly_summary(repo: &dyn ObservationRepo) {
    let mut jan_a = actual("2024-01-10", 1000.0);
    jan_a.occupancy_percentage = 70.0;
    let mut jan_b = actual("2024-01-11", 3000.0);
    jan_b.occupancy_percentage = 80.0;
    for row in [
        jan_a,
        jan_b,
        actual("2024-02-01", 500.0),
        input("2024-01-15", "2024-01-01", ObservationKind::Forecast, 700.0),
    ] {
        repo.create(row, None)
            .await
            .expect("Failed to create observation");
    }

    let all = repo
        .monthly_summary(&SummaryFilter::default())
        .await
        .expect("Failed to summarise");
    let keys: Vec<_> = all
        .iter()
        .map(|s| (s.month_year.as_str(), s.actual_or_forecast))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("2024-02", ObservationKind::Actual),
            ("2024-01", ObservationKind::Actual),
            ("2024-01", ObservationKind::Forecast),
        ]
    );

    let jan = &all[1];
    assert_eq!(jan.total_entries, 2);
    assert_eq!(jan.total_rooms_sold, 180);
    assert!((jan.total_revenue - 4000.0).abs() < 1e-9);
    assert!((jan.avg_occupancy - 75.0).abs() < 1e-9);
    assert!((jan.avg_inventory - 120.0).abs() < 1e-9);

    let filtered = repo
        .monthly_summary(&SummaryFilter {
            start_month: Some("2024-01".to_string()),
            end_month: Some("2024-01".to_string()),
            kind: Some(ObservationKind::Actual),
        })
        .await
        .expect("Failed to summarise");
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].month_year, "2024-01");
}

// ============================================================================
// SQLite Tests - Fast, in-memory
// ============================================================================

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use crate::db::{
        sqlite::SqliteObservationRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let pool = create_sqlite_pool().await;
                run_sqlite_migrations(&pool).await;
                let repo = SqliteObservationRepo::new(pool);
                super::$name(&repo).await;
            }
        };
    }

    sqlite_test!(test_create_and_get);
    sqlite_test!(test_get_by_id_not_found);
    sqlite_test!(test_duplicate_rejected_and_first_kept);
    sqlite_test!(test_amendment_and_other_kind_allowed);
    sqlite_test!(test_list_filters_and_pages);
    sqlite_test!(test_list_sorted_by_revenue_desc);
    sqlite_test!(test_list_by_kind_orders_by_arrival_then_snapshot);
    sqlite_test!(test_monthly_summary);
}

// ============================================================================
// PostgreSQL Tests - Require Docker, run with `cargo test -- --ignored`
// ============================================================================

#[cfg(all(test, feature = "database-postgres"))]
mod postgres_tests {
    use crate::db::{
        postgres::PostgresObservationRepo,
        tests::harness::postgres::{create_isolated_postgres_pool, run_postgres_migrations},
    };

    macro_rules! postgres_test {
        ($name:ident) => {
            #[tokio::test]
            #[ignore = "Requires Docker - run with `cargo test -- --ignored`"]
            async fn $name() {
                let pool = create_isolated_postgres_pool().await;
                run_postgres_migrations(&pool).await;
                let repo = PostgresObservationRepo::new(pool, None);
                super::$name(&repo).await;
            }
        };
    }

    postgres_test!(test_create_and_get);
    postgres_test!(test_get_by_id_not_found);
    postgres_test!(test_duplicate_rejected_and_first_kept);
    postgres_test!(test_amendment_and_other_kind_allowed);
    postgres_test!(test_list_filters_and_pages);
    postgres_test!(test_list_sorted_by_revenue_desc);
    postgres_test!(test_list_by_kind_orders_by_arrival_then_snapshot);
    postgres_test!(test_monthly_summary);
}
