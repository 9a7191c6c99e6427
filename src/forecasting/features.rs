//! Feature engineering: raw metrics table to model-ready feature table.

use std::ops::Range;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{ForecastError, HolidayRegion, MetricsTable};

/// Trailing windows (in observations) for the rolling target statistics.
pub const ROLLING_WINDOWS: [usize; 2] = [7, 14];

/// Weekday indices (Monday = 0) treated as the weekend.
pub const WEEKEND_DAYS: [u32; 2] = [5, 6];

/// How a feature column is derived.
///
/// Calendar kinds can be recomputed for any date; the others come from
/// observed data and are held at their last known value when forecasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "param", rename_all = "snake_case")]
pub enum FeatureKind {
    Exogenous,
    DayOfWeek(u32),
    Weekend,
    Month,
    Quarter,
    Holiday,
    RollingMean(usize),
    RollingStd(usize),
}

impl FeatureKind {
    /// Value of a calendar feature for `date`, or `None` for data-derived kinds.
    pub fn calendar_value(&self, date: NaiveDate, region: HolidayRegion) -> Option<f64> {
        let weekday = date.weekday().num_days_from_monday();
        match self {
            FeatureKind::DayOfWeek(day) => Some(indicator(weekday == *day)),
            FeatureKind::Weekend => Some(indicator(WEEKEND_DAYS.contains(&weekday))),
            FeatureKind::Month => Some(date.month() as f64),
            FeatureKind::Quarter => Some(((date.month() - 1) / 3 + 1) as f64),
            FeatureKind::Holiday => Some(indicator(region.is_holiday(date))),
            FeatureKind::Exogenous | FeatureKind::RollingMean(_) | FeatureKind::RollingStd(_) => {
                None
            }
        }
    }

    pub fn is_calendar(&self) -> bool {
        !matches!(
            self,
            FeatureKind::Exogenous | FeatureKind::RollingMean(_) | FeatureKind::RollingStd(_)
        )
    }

    fn default_name(&self) -> Option<String> {
        match self {
            FeatureKind::Exogenous => None,
            FeatureKind::DayOfWeek(day) => Some(format!("day_{day}")),
            FeatureKind::Weekend => Some("is_weekend".to_string()),
            FeatureKind::Month => Some("month".to_string()),
            FeatureKind::Quarter => Some("quarter".to_string()),
            FeatureKind::Holiday => Some("is_holiday".to_string()),
            FeatureKind::RollingMean(window) => Some(format!("rolling_mean_{window}d")),
            FeatureKind::RollingStd(window) => Some(format!("rolling_std_{window}d")),
        }
    }
}

fn indicator(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
    pub values: Vec<f64>,
}

impl FeatureColumn {
    fn derived(kind: FeatureKind, values: Vec<f64>) -> Self {
        Self {
            name: kind.default_name().unwrap_or_default(),
            kind,
            values,
        }
    }
}

/// Model-ready table: dates, target and regressor columns aligned row by row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    dates: Vec<NaiveDate>,
    target: Vec<f64>,
    columns: Vec<FeatureColumn>,
    region: HolidayRegion,
}

impl FeatureTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        target: Vec<f64>,
        columns: Vec<FeatureColumn>,
        region: HolidayRegion,
    ) -> Result<Self, ForecastError> {
        if target.len() != dates.len() {
            return Err(ForecastError::SchemaMismatch(format!(
                "target has {} values for {} dates",
                target.len(),
                dates.len()
            )));
        }
        if let Some(column) = columns.iter().find(|c| c.values.len() != dates.len()) {
            return Err(ForecastError::SchemaMismatch(format!(
                "column '{}' has {} values for {} dates",
                column.name,
                column.values.len(),
                dates.len()
            )));
        }
        if dates.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ForecastError::InvalidParameter(
                "feature table dates must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            dates,
            target,
            columns,
            region,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn region(&self) -> HolidayRegion {
        self.region
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Most recent value of a regressor column.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.values.last().copied())
    }

    /// Copy of the rows in `range`.
    pub fn slice(&self, range: Range<usize>) -> FeatureTable {
        FeatureTable {
            dates: self.dates[range.clone()].to_vec(),
            target: self.target[range.clone()].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    kind: c.kind,
                    values: c.values[range.clone()].to_vec(),
                })
                .collect(),
            region: self.region,
        }
    }
}

/// Derive the feature table from a raw metrics table.
///
/// Rows without a target value are dropped first. The remaining rows get:
/// the listed exogenous columns that exist in `table` (gaps back-filled,
/// then forward-filled at the tail), `day_0`..`day_6` one-hot weekday
/// indicators (Monday = 0), `is_weekend`, `month`, `quarter`, `is_holiday`
/// from `region`, and trailing rolling mean / sample standard deviation of
/// the target for each window in [`ROLLING_WINDOWS`]. Rolling values are
/// undefined for the first `window - 1` rows and are back-filled from the
/// first complete window.
#[tracing::instrument(name = "forecast.build_features", skip(table, exogenous), fields(rows = table.len()))]
pub fn build_features<S: AsRef<str>>(
    table: &MetricsTable,
    target: &str,
    exogenous: &[S],
    region: HolidayRegion,
) -> Result<FeatureTable, ForecastError> {
    let target_column = table
        .column(target)
        .ok_or_else(|| ForecastError::MissingColumn(target.to_string()))?;

    let kept: Vec<usize> = target_column
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|v| v.is_finite()).map(|_| i))
        .collect();
    if kept.len() < table.len() {
        tracing::debug!(
            dropped = table.len() - kept.len(),
            "Dropping rows without a target value"
        );
    }

    let dates: Vec<NaiveDate> = kept.iter().map(|&i| table.dates()[i]).collect();
    let y: Vec<f64> = kept.iter().filter_map(|&i| target_column[i]).collect();

    let mut columns = Vec::new();

    for name in exogenous.iter().map(AsRef::as_ref) {
        if name == target {
            continue;
        }
        let Some(raw) = table.column(name) else {
            tracing::debug!(column = %name, "Exogenous column not present, skipping");
            continue;
        };
        let values: Vec<Option<f64>> = kept.iter().map(|&i| raw[i]).collect();
        match fill_gaps(&values) {
            Some(values) => columns.push(FeatureColumn {
                name: name.to_string(),
                kind: FeatureKind::Exogenous,
                values,
            }),
            None => tracing::warn!(column = %name, "Exogenous column has no values, skipping"),
        }
    }

    let calendar_kinds = (0..7)
        .map(FeatureKind::DayOfWeek)
        .chain([
            FeatureKind::Weekend,
            FeatureKind::Month,
            FeatureKind::Quarter,
            FeatureKind::Holiday,
        ]);
    for kind in calendar_kinds {
        let values = dates
            .iter()
            .filter_map(|d| kind.calendar_value(*d, region))
            .collect();
        columns.push(FeatureColumn::derived(kind, values));
    }

    for window in ROLLING_WINDOWS {
        if y.len() < window {
            tracing::debug!(window, rows = y.len(), "Series shorter than rolling window");
            continue;
        }
        if let Some(mean) = fill_gaps(&rolling_mean(&y, window)) {
            columns.push(FeatureColumn::derived(FeatureKind::RollingMean(window), mean));
        }
        if let Some(std) = fill_gaps(&rolling_std(&y, window)) {
            columns.push(FeatureColumn::derived(FeatureKind::RollingStd(window), std));
        }
    }

    FeatureTable::new(dates, y, columns, region)
}

/// Trailing mean over `window` observations, inclusive of the current row.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |slice| {
        Some(slice.iter().sum::<f64>() / slice.len() as f64)
    })
}

/// Trailing sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |slice| {
        if slice.len() < 2 {
            return None;
        }
        let n = slice.len() as f64;
        let mean = slice.iter().sum::<f64>() / n;
        let ss: f64 = slice.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (n - 1.0)).sqrt())
    })
}

fn rolling<F>(values: &[f64], window: usize, stat: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                stat(&values[i + 1 - window..=i])
            }
        })
        .collect()
}

/// Back-fill missing values from the next defined value, then forward-fill
/// any trailing gap. Returns `None` when no value is defined at all.
pub fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let mut filled = vec![None; values.len()];
    let mut next = None;
    for (i, value) in values.iter().enumerate().rev() {
        if value.is_some() {
            next = *value;
        }
        filled[i] = next;
    }

    let mut previous = None;
    filled
        .into_iter()
        .map(|v| {
            let v = v.or(previous);
            previous = v;
            v
        })
        .collect()
}
