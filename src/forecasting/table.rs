//! Raw daily metrics table.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use chrono::NaiveDate;

use super::{DATE_FORMAT, ForecastError};
use crate::models::{Observation, ObservationField, ObservationKind};

/// Daily metrics indexed by date.
///
/// Dates are strictly increasing, so every date appears at most once. Each
/// named column holds one optional value per date; `None` marks a missing
/// measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl MetricsTable {
    /// Build a table from dated rows of named values.
    ///
    /// Rows may arrive in any order; they are sorted by date. A repeated date
    /// is rejected.
    pub fn from_rows<I>(rows: I) -> Result<Self, ForecastError>
    where
        I: IntoIterator<Item = (NaiveDate, BTreeMap<String, f64>)>,
    {
        let mut rows: Vec<_> = rows.into_iter().collect();
        rows.sort_by_key(|(date, _)| *date);

        let mut table = Self::default();
        for (date, values) in rows {
            if table.dates.last() == Some(&date) {
                return Err(ForecastError::DuplicateDate(date));
            }
            table.push_row(table.dates.len(), date, &values);
        }
        Ok(table)
    }

    /// Insert a new dated row, keeping the table sorted by date.
    ///
    /// Columns not present in `values` are missing for the new row; columns
    /// new to the table are missing for every existing row.
    pub fn append_row(
        &mut self,
        date: NaiveDate,
        values: &BTreeMap<String, f64>,
    ) -> Result<(), ForecastError> {
        match self.dates.binary_search(&date) {
            Ok(_) => Err(ForecastError::DuplicateDate(date)),
            Err(index) => {
                self.push_row(index, date, values);
                Ok(())
            }
        }
    }

    fn push_row(&mut self, index: usize, date: NaiveDate, values: &BTreeMap<String, f64>) {
        let existing = self.dates.len();
        self.dates.insert(index, date);

        for name in values.keys() {
            self.columns
                .entry(name.clone())
                .or_insert_with(|| vec![None; existing]);
        }
        for (name, column) in self.columns.iter_mut() {
            column.insert(index, values.get(name).copied());
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Build the daily series from stored observations.
    ///
    /// Only `actual` rows contribute. When an arrival date has several
    /// snapshots, the latest snapshot wins, since amendments are stored as new
    /// rows with a later snapshot date.
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut latest: HashMap<NaiveDate, &Observation> = HashMap::new();
        for obs in observations
            .iter()
            .filter(|o| o.actual_or_forecast == ObservationKind::Actual)
        {
            latest
                .entry(obs.arrival_date)
                .and_modify(|current| {
                    if obs.snapshot_date > current.snapshot_date {
                        *current = obs;
                    }
                })
                .or_insert(obs);
        }

        let mut table = Self::default();
        let mut rows: Vec<_> = latest.into_values().collect();
        rows.sort_by_key(|o| o.arrival_date);
        for obs in rows {
            let values: BTreeMap<String, f64> = ObservationField::NUMERIC
                .iter()
                .filter_map(|field| {
                    obs.numeric_value(*field)
                        .map(|value| (field.label().to_string(), value))
                })
                .collect();
            table.push_row(table.dates.len(), obs.arrival_date, &values);
        }
        table
    }
}

/// Load a metrics table from a CSV file.
///
/// The date column is the first header containing "date" or "time"
/// (case-insensitive), or the first column when none does. Every other column
/// is parsed as a number; empty cells are missing values and non-numeric
/// columns are skipped with a warning.
pub fn load_metrics_csv(path: impl AsRef<Path>) -> Result<MetricsTable, ForecastError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| ForecastError::io(e, path))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(ForecastError::MissingColumn("date".to_string()));
    }
    let date_index = headers
        .iter()
        .position(|h| {
            let lower = h.to_lowercase();
            lower.contains("date") || lower.contains("time")
        })
        .unwrap_or(0);

    let mut rows = Vec::new();
    let mut non_numeric = vec![false; headers.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(date_index).unwrap_or_default().trim();
        let date = parse_date(raw_date).ok_or_else(|| {
            ForecastError::InvalidParameter(format!(
                "row {}: invalid date '{}' (expected YYYY-MM-DD)",
                line + 1,
                raw_date
            ))
        })?;

        let mut values = BTreeMap::new();
        for (index, (header, cell)) in headers.iter().zip(record.iter()).enumerate() {
            if index == date_index || non_numeric[index] {
                continue;
            }
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) => {
                    values.insert(header.to_string(), value);
                }
                Err(_) => non_numeric[index] = true,
            }
        }
        rows.push((date, values));
    }

    for (index, skipped) in non_numeric.iter().enumerate() {
        if *skipped {
            let name = headers.get(index).unwrap_or_default().to_string();
            tracing::warn!(column = %name, path = %path.display(), "Skipping non-numeric CSV column");
            for (_, values) in rows.iter_mut() {
                values.remove(&name);
            }
        }
    }

    let table = MetricsTable::from_rows(rows)?;
    tracing::debug!(
        path = %path.display(),
        rows = table.len(),
        "Loaded metrics table from CSV"
    );
    Ok(table)
}

/// Parse a `YYYY-MM-DD` date, also accepting a trailing time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}
