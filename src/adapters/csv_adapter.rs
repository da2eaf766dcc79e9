//! CSV directory series adapter.
//!
//! One file per instrument, `<dir>/<INSTRUMENT>.csv`, with a header row.
//! The `date` and `close` columns are found by name; `adj close` is used
//! when there is no plain `close` column.

use crate::domain::error::NormbenchError;
use crate::domain::price_series::{PricePoint, PriceSeries};
use crate::ports::series_port::SeriesPort;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvSeriesAdapter {
    base_path: PathBuf,
}

impl CsvSeriesAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", instrument))
    }
}

fn column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

impl SeriesPort for CsvSeriesAdapter {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, NormbenchError> {
        let path = self.csv_path(instrument);
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| NormbenchError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let headers = rdr.headers()?.clone();
        let date_col = column_index(&headers, &["date"]).ok_or_else(|| NormbenchError::Data {
            reason: format!("{}: missing date column", path.display()),
        })?;
        let close_col =
            column_index(&headers, &["close", "adj close"]).ok_or_else(|| NormbenchError::Data {
                reason: format!("{}: missing close column", path.display()),
            })?;

        let mut points = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            // header is line 1
            let line = row + 2;

            let date_str = record.get(date_col).unwrap_or("").trim();
            let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| {
                NormbenchError::Data {
                    reason: format!(
                        "{}:{}: invalid date '{}': {}",
                        path.display(),
                        line,
                        date_str,
                        e
                    ),
                }
            })?;

            let close_str = record.get(close_col).unwrap_or("").trim();
            let close: f64 = close_str.parse().map_err(|e| NormbenchError::Data {
                reason: format!(
                    "{}:{}: invalid close '{}': {}",
                    path.display(),
                    line,
                    close_str,
                    e
                ),
            })?;

            points.push(PricePoint { date, close });
        }

        points.sort_by_key(|p| p.date);
        PriceSeries::new(instrument, points)
    }

    fn list_instruments(&self) -> Result<Vec<String>, NormbenchError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| NormbenchError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                instruments.push(stem.to_string_lossy().into_owned());
            }
        }

        instruments.sort();
        Ok(instruments)
    }
}
