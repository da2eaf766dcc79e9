//! CSV report adapter implementing ReportPort.
//!
//! Every table lands in `output_dir`, which is created on first write.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::benchmark::SkippedInstrument;
use crate::domain::error::NormbenchError;
use crate::domain::executor::SimulationResult;
use crate::domain::normalizer::NormalizationMethod;
use crate::domain::walk_forward::{BestMethodSelection, MethodMetrics, SkippedMethod};
use crate::ports::report_port::ReportPort;

pub const LEADERBOARD_FILE: &str = "leaderboard.csv";
pub const SELECTIONS_FILE: &str = "best_methods.csv";
pub const SKIPPED_FILE: &str = "skipped.csv";

/// A skipped method, or a whole instrument when `method` is empty.
#[derive(Serialize)]
struct SkippedRow<'a> {
    instrument: &'a str,
    method: Option<NormalizationMethod>,
    reason: &'a str,
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn equity_path(&self, instrument: &str) -> PathBuf {
        self.output_dir.join(format!("{}_equity.csv", instrument))
    }

    pub fn trades_path(&self, instrument: &str) -> PathBuf {
        self.output_dir.join(format!("{}_trades.csv", instrument))
    }

    fn write_rows<T: Serialize>(&self, path: &Path, rows: &[T]) -> Result<(), NormbenchError> {
        fs::create_dir_all(&self.output_dir)?;
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Like `write_rows`, but an empty table still gets its header line.
    fn write_table<T: Serialize>(
        &self,
        path: &Path,
        header: &[&str],
        rows: &[T],
    ) -> Result<(), NormbenchError> {
        if !rows.is_empty() {
            return self.write_rows(path, rows);
        }
        fs::create_dir_all(&self.output_dir)?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(header)?;
        writer.flush()?;
        Ok(())
    }
}

const METRICS_HEADER: &[&str] = &["instrument", "method", "mae", "mse", "r2"];

impl ReportPort for CsvReportAdapter {
    fn write_leaderboard(&self, rows: &[MethodMetrics]) -> Result<(), NormbenchError> {
        self.write_table(&self.output_dir.join(LEADERBOARD_FILE), METRICS_HEADER, rows)
    }

    fn write_selections(&self, rows: &[BestMethodSelection]) -> Result<(), NormbenchError> {
        self.write_table(&self.output_dir.join(SELECTIONS_FILE), METRICS_HEADER, rows)
    }

    fn write_skipped(
        &self,
        methods: &[SkippedMethod],
        instruments: &[SkippedInstrument],
    ) -> Result<(), NormbenchError> {
        let rows: Vec<SkippedRow> = instruments
            .iter()
            .map(|s| SkippedRow {
                instrument: &s.instrument,
                method: None,
                reason: &s.reason,
            })
            .chain(methods.iter().map(|s| SkippedRow {
                instrument: &s.instrument,
                method: Some(s.method),
                reason: &s.reason,
            }))
            .collect();
        self.write_table(
            &self.output_dir.join(SKIPPED_FILE),
            &["instrument", "method", "reason"],
            &rows,
        )
    }

    fn write_simulation(&self, result: &SimulationResult) -> Result<(), NormbenchError> {
        self.write_table(
            &self.equity_path(&result.instrument),
            &["bar_index", "date", "equity"],
            &result.equity_curve,
        )?;
        self.write_table(
            &self.trades_path(&result.instrument),
            &["bar_index", "date", "side", "quantity", "price", "cash_after"],
            &result.trades,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountState, EquityPoint, Side, TradeRecord};
    use crate::domain::executor::{ForecastHistory, Phase};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn metrics(instrument: &str, method: NormalizationMethod, r2: f64) -> MethodMetrics {
        MethodMetrics {
            instrument: instrument.to_string(),
            method,
            mae: 0.5,
            mse: 0.25,
            r2,
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn leaderboard_has_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path().join("out"));

        adapter
            .write_leaderboard(&[
                metrics("BHP", NormalizationMethod::ZScore, 0.9),
                metrics("BHP", NormalizationMethod::BoxCox, 0.8),
            ])
            .unwrap();

        let content = read(&dir.path().join("out").join(LEADERBOARD_FILE));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "instrument,method,mae,mse,r2");
        assert_eq!(lines[1], "BHP,zscore,0.5,0.25,0.9");
        assert_eq!(lines[2], "BHP,boxcox,0.5,0.25,0.8");
    }

    #[test]
    fn empty_tables_keep_their_header() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path());

        adapter.write_selections(&[]).unwrap();
        adapter.write_skipped(&[], &[]).unwrap();

        assert_eq!(read(&dir.path().join(SELECTIONS_FILE)).trim(), "instrument,method,mae,mse,r2");
        assert_eq!(read(&dir.path().join(SKIPPED_FILE)).trim(), "instrument,method,reason");
    }

    #[test]
    fn skipped_lists_instruments_then_methods() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path());

        adapter
            .write_skipped(
                &[SkippedMethod {
                    instrument: "CBA".to_string(),
                    method: NormalizationMethod::Log,
                    reason: "invalid domain".to_string(),
                }],
                &[SkippedInstrument {
                    instrument: "XYZ".to_string(),
                    reason: "no data".to_string(),
                }],
            )
            .unwrap();

        let content = read(&dir.path().join(SKIPPED_FILE));
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[1], "XYZ,,no data");
        assert_eq!(lines[2], "CBA,log,invalid domain");
    }

    #[test]
    fn simulation_writes_equity_and_trades() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let result = SimulationResult {
            instrument: "BHP".to_string(),
            phase: Phase::Finished,
            initial_cash: 1_000.0,
            account: AccountState::new(1_000.0),
            equity_curve: vec![EquityPoint {
                bar_index: 0,
                date,
                equity: 1_000.0,
            }],
            trades: vec![TradeRecord {
                bar_index: 0,
                date,
                side: Side::Buy,
                quantity: 2,
                price: 10.0,
                cash_after: 980.0,
            }],
            closed_trades: vec![],
            failures: vec![],
            forecasts: ForecastHistory::default(),
        };
        adapter.write_simulation(&result).unwrap();

        let equity = read(&adapter.equity_path("BHP"));
        assert_eq!(equity.lines().nth(1), Some("0,2024-01-02,1000.0"));

        let trades = read(&adapter.trades_path("BHP"));
        assert_eq!(trades.lines().next(), Some("bar_index,date,side,quantity,price,cash_after"));
        assert_eq!(trades.lines().nth(1), Some("0,2024-01-02,buy,2,10.0,980.0"));
    }
}
