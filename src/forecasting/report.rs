//! Forecast report writers: plain text, SVG chart and CSV.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate};

use super::{DATE_FORMAT, ForecastError, ForecastRow};

pub const DEFAULT_REPORT_TITLE: &str = "Forecast Results";

const RULE_WIDTH: usize = 30;

const CHART_WIDTH: f64 = 1200.0;
const CHART_HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 90.0;
const MAX_X_LABELS: usize = 24;
const Y_TICKS: usize = 6;

/// Render forecast rows as the plain-text report.
///
/// ```text
/// Forecast Results
/// ==============================
///
/// Date: 2025-06-20
/// Forecast: 1234.56
/// Lower Bound (95%): 1100.00
/// Upper Bound (95%): 1369.12
/// ------------------------------
/// ```
pub fn render_text(rows: &[ForecastRow], title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    out.push('\n');
    for row in rows {
        let _ = writeln!(out, "Date: {}", row.ds.format(DATE_FORMAT));
        let _ = writeln!(out, "Forecast: {:.2}", row.yhat);
        let _ = writeln!(out, "Lower Bound (95%): {:.2}", row.yhat_lower);
        let _ = writeln!(out, "Upper Bound (95%): {:.2}", row.yhat_upper);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    }
    out
}

pub fn write_text_report(
    rows: &[ForecastRow],
    title: &str,
    path: impl AsRef<Path>,
) -> Result<PathBuf, ForecastError> {
    write_file(path.as_ref(), render_text(rows, title).as_bytes())
}

/// Render an SVG chart of history points, the forecast line and its
/// shaded 95% band, with dated x-axis labels.
pub fn render_svg(history: &[(NaiveDate, f64)], rows: &[ForecastRow], title: &str) -> String {
    let dates = history
        .iter()
        .map(|(d, _)| *d)
        .chain(rows.iter().map(|r| r.ds));
    let (Some(first), Some(last)) = (dates.clone().min(), dates.max()) else {
        return empty_svg(title);
    };

    let values = history
        .iter()
        .map(|(_, v)| *v)
        .chain(rows.iter().flat_map(|r| [r.yhat_lower, r.yhat_upper]));
    let (mut low, mut high) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !(low.is_finite() && high.is_finite()) {
        return empty_svg(title);
    }
    if high - low < f64::EPSILON {
        low -= 1.0;
        high += 1.0;
    }
    let pad = (high - low) * 0.05;
    let axis = Axis {
        first,
        span_days: ((last - first).num_days() as f64).max(1.0),
        low: low - pad,
        high: high + pad,
    };

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CHART_WIDTH}" height="{CHART_HEIGHT}" viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
        CHART_WIDTH / 2.0,
        escape(title)
    );

    axis.write_grid(&mut svg);

    if !rows.is_empty() {
        let upper = rows.iter().map(|r| axis.point(r.ds, r.yhat_upper));
        let lower = rows.iter().rev().map(|r| axis.point(r.ds, r.yhat_lower));
        let band: Vec<String> = upper.chain(lower).collect();
        let _ = writeln!(
            svg,
            r#"<polygon class="interval" points="{}" fill="blue" fill-opacity="0.2" stroke="none"/>"#,
            band.join(" ")
        );
        let line: Vec<String> = rows.iter().map(|r| axis.point(r.ds, r.yhat)).collect();
        let _ = writeln!(
            svg,
            r#"<polyline class="forecast" points="{}" fill="none" stroke="blue" stroke-width="1.5"/>"#,
            line.join(" ")
        );
    }

    for (date, value) in history {
        let _ = writeln!(
            svg,
            r#"<circle class="history" cx="{:.1}" cy="{:.1}" r="1.8" fill="black"/>"#,
            axis.x(*date),
            axis.y(*value)
        );
    }

    write_legend(&mut svg);
    svg.push_str("</svg>\n");
    svg
}

pub fn write_chart(
    history: &[(NaiveDate, f64)],
    rows: &[ForecastRow],
    title: &str,
    path: impl AsRef<Path>,
) -> Result<PathBuf, ForecastError> {
    write_file(path.as_ref(), render_svg(history, rows, title).as_bytes())
}

/// Write forecast rows as CSV with a `ds,yhat,yhat_lower,yhat_upper` header.
pub fn write_csv(rows: &[ForecastRow], path: impl AsRef<Path>) -> Result<PathBuf, ForecastError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["ds", "yhat", "yhat_lower", "yhat_upper"])?;
    for row in rows {
        writer.write_record([
            row.ds.format(DATE_FORMAT).to_string(),
            row.yhat.to_string(),
            row.yhat_lower.to_string(),
            row.yhat_upper.to_string(),
        ])?;
    }
    writer.flush().map_err(|e| ForecastError::io(e, path))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Forecast CSV written");
    Ok(path.to_path_buf())
}

struct Axis {
    first: NaiveDate,
    span_days: f64,
    low: f64,
    high: f64,
}

impl Axis {
    fn x(&self, date: NaiveDate) -> f64 {
        let plot = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        MARGIN_LEFT + (date - self.first).num_days() as f64 / self.span_days * plot
    }

    fn y(&self, value: f64) -> f64 {
        let plot = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + (self.high - value) / (self.high - self.low) * plot
    }

    fn point(&self, date: NaiveDate, value: f64) -> String {
        format!("{:.1},{:.1}", self.x(date), self.y(value))
    }

    fn write_grid(&self, svg: &mut String) {
        let bottom = CHART_HEIGHT - MARGIN_BOTTOM;
        let right = CHART_WIDTH - MARGIN_RIGHT;

        for i in 0..=Y_TICKS {
            let value = self.low + (self.high - self.low) * i as f64 / Y_TICKS as f64;
            let y = self.y(value);
            let _ = writeln!(
                svg,
                r##"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{right}" y2="{y:.1}" stroke="#ddd"/>"##
            );
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{:.1}" text-anchor="end">{value:.0}</text>"#,
                MARGIN_LEFT - 8.0,
                y + 4.0
            );
        }

        // Month starts, thinned to at most MAX_X_LABELS labels
        let last = self.first + chrono::Duration::days(self.span_days as i64);
        let mut ticks = Vec::new();
        let mut month = NaiveDate::from_ymd_opt(self.first.year(), self.first.month(), 1);
        while let Some(date) = month {
            if date > last {
                break;
            }
            if date >= self.first {
                ticks.push(date);
            }
            month = date.checked_add_months(chrono::Months::new(1));
        }
        if ticks.is_empty() {
            ticks.push(self.first);
        }
        let step = ticks.len().div_ceil(MAX_X_LABELS).max(1);

        for date in ticks.iter().step_by(step) {
            let x = self.x(*date);
            let _ = writeln!(
                svg,
                r##"<line x1="{x:.1}" y1="{MARGIN_TOP}" x2="{x:.1}" y2="{bottom}" stroke="#eee"/>"##
            );
            let _ = writeln!(
                svg,
                r#"<text x="{x:.1}" y="{:.1}" text-anchor="end" transform="rotate(-30 {x:.1} {:.1})">{}</text>"#,
                bottom + 18.0,
                bottom + 18.0,
                date.format(DATE_FORMAT)
            );
        }

        let _ = writeln!(
            svg,
            r#"<line x1="{MARGIN_LEFT}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="black"/>"#
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{MARGIN_LEFT}" y1="{MARGIN_TOP}" x2="{MARGIN_LEFT}" y2="{bottom}" stroke="black"/>"#
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">Date</text>"#,
            (MARGIN_LEFT + right) / 2.0,
            CHART_HEIGHT - 10.0
        );
    }
}

fn write_legend(svg: &mut String) {
    let x = CHART_WIDTH - MARGIN_RIGHT - 150.0;
    let y = MARGIN_TOP + 10.0;
    let _ = writeln!(
        svg,
        r#"<circle cx="{}" cy="{y}" r="3" fill="black"/><text x="{}" y="{}">Historical</text>"#,
        x + 10.0,
        x + 25.0,
        y + 4.0
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{x}" y1="{}" x2="{}" y2="{}" stroke="blue" stroke-width="1.5"/><text x="{}" y="{}">Forecast</text>"#,
        y + 20.0,
        x + 20.0,
        y + 20.0,
        x + 25.0,
        y + 24.0
    );
    let _ = writeln!(
        svg,
        r#"<rect x="{x}" y="{}" width="20" height="10" fill="blue" fill-opacity="0.2"/><text x="{}" y="{}">95% CI</text>"#,
        y + 35.0,
        x + 25.0,
        y + 44.0
    );
}

fn empty_svg(title: &str) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\">\
         <text x=\"{}\" y=\"30\" text-anchor=\"middle\">{} (no data)</text></svg>\n",
        CHART_WIDTH / 2.0,
        escape(title)
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn ensure_parent(path: &Path) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ForecastError::io(e, parent))?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<PathBuf, ForecastError> {
    ensure_parent(path)?;
    std::fs::write(path, contents).map_err(|e| ForecastError::io(e, path))?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn rows() -> Vec<ForecastRow> {
        vec![
            ForecastRow {
                ds: date("2025-06-20"),
                yhat: 1234.5678,
                yhat_lower: 1100.0,
                yhat_upper: 1369.126,
            },
            ForecastRow {
                ds: date("2025-07-01"),
                yhat: 980.0,
                yhat_lower: 870.456,
                yhat_upper: 1089.5,
            },
        ]
    }

    #[test]
    fn test_render_text_blocks() {
        let text = render_text(&rows(), DEFAULT_REPORT_TITLE);
        let expected = "Forecast Results\n\
            ==============================\n\
            \n\
            Date: 2025-06-20\n\
            Forecast: 1234.57\n\
            Lower Bound (95%): 1100.00\n\
            Upper Bound (95%): 1369.13\n\
            ------------------------------\n\
            Date: 2025-07-01\n\
            Forecast: 980.00\n\
            Lower Bound (95%): 870.46\n\
            Upper Bound (95%): 1089.50\n\
            ------------------------------\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_write_text_report_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("forecast.txt");
        let written = write_text_report(&rows(), "Next Month", &path).unwrap();
        assert_eq!(written, path);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Next Month\n"));
        assert_eq!(contents.matches("Date: ").count(), 2);
    }

    #[test]
    fn test_render_svg_contains_layers_and_dates() {
        let history = vec![(date("2025-05-01"), 1000.0), (date("2025-06-01"), 1100.0)];
        let svg = render_svg(&history, &rows(), "Revenue <30 days>");

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches(r#"class="history""#).count(), 2);
        assert!(svg.contains(r#"class="forecast""#));
        assert!(svg.contains(r#"class="interval""#));
        assert!(svg.contains("2025-06-01"));
        assert!(svg.contains("Revenue &lt;30 days&gt;"));
    }

    #[test]
    fn test_render_svg_without_data() {
        let svg = render_svg(&[], &[], "Empty");
        assert!(svg.contains("no data"));
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forecast.csv");
        write_csv(&rows(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, ["ds", "yhat", "yhat_lower", "yhat_upper"]);
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "2025-06-20");
        assert_eq!(records[1][1].parse::<f64>().unwrap(), 980.0);
    }
}
