//! SQLite series adapter.

use crate::domain::error::NormbenchError;
use crate::domain::price_series::{PricePoint, PriceSeries};
use crate::ports::series_port::SeriesPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

fn db_error(e: impl std::fmt::Display) -> NormbenchError {
    NormbenchError::Data {
        reason: format!("sqlite: {}", e),
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn open(path: &str, pool_size: u32) -> Result<Self, NormbenchError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, NormbenchError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_error)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, NormbenchError> {
        self.pool.get().map_err(db_error)
    }

    pub fn initialize_schema(&self) -> Result<(), NormbenchError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    instrument TEXT NOT NULL,
                    date TEXT NOT NULL,
                    close REAL NOT NULL,
                    PRIMARY KEY (instrument, date)
                );",
            )
            .map_err(db_error)
    }

    /// Insert or replace every point of `series`.
    pub fn insert_series(&self, series: &PriceSeries) -> Result<(), NormbenchError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;
        for point in series.points() {
            tx.execute(
                "INSERT OR REPLACE INTO prices (instrument, date, close) VALUES (?1, ?2, ?3)",
                params![
                    series.instrument(),
                    point.date.format("%Y-%m-%d").to_string(),
                    point.close
                ],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }
}

impl SeriesPort for SqliteAdapter {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, NormbenchError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, close FROM prices
                 WHERE instrument = ?1
                 ORDER BY date ASC",
            )
            .map_err(db_error)?;

        let rows = stmt
            .query_map(params![instrument], |row| {
                let date_str: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(PricePoint {
                    date,
                    close: row.get(1)?,
                })
            })
            .map_err(db_error)?;

        let points = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        PriceSeries::new(instrument, points)
    }

    fn list_instruments(&self) -> Result<Vec<String>, NormbenchError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT instrument FROM prices ORDER BY instrument")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn series(instrument: &str, closes: &[f64]) -> PriceSeries {
        PriceSeries::from_closes(instrument, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), closes)
            .unwrap()
    }

    #[test]
    fn schema_is_idempotent() {
        let adapter = adapter();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn insert_then_fetch() {
        let adapter = adapter();
        let original = series("BHP", &[100.5, 101.5, 99.0]);
        adapter.insert_series(&original).unwrap();

        let fetched = adapter.fetch_series("BHP").unwrap();
        assert_eq!(fetched, original);
    }

    #[test]
    fn insert_replaces_existing_dates() {
        let adapter = adapter();
        adapter.insert_series(&series("BHP", &[1.0, 2.0])).unwrap();
        adapter.insert_series(&series("BHP", &[3.0])).unwrap();

        assert_eq!(adapter.fetch_series("BHP").unwrap().closes(), vec![3.0, 2.0]);
    }

    #[test]
    fn unknown_instrument_is_empty_series() {
        let adapter = adapter();
        assert!(matches!(
            adapter.fetch_series("NOPE"),
            Err(NormbenchError::EmptySeries { .. })
        ));
    }

    #[test]
    fn list_instruments_is_sorted_and_distinct() {
        let adapter = adapter();
        adapter.insert_series(&series("CBA", &[150.0, 151.0])).unwrap();
        adapter.insert_series(&series("BHP", &[100.0])).unwrap();

        assert_eq!(adapter.list_instruments().unwrap(), vec!["BHP", "CBA"]);
    }

    #[test]
    fn missing_table_is_data_error() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        assert!(matches!(
            adapter.fetch_series("BHP"),
            Err(NormbenchError::Data { .. })
        ));
    }
}
