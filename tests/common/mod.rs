#![allow(dead_code)]

use chrono::NaiveDate;
use normbench::domain::benchmark::SkippedInstrument;
use normbench::domain::error::NormbenchError;
use normbench::domain::executor::SimulationResult;
use normbench::domain::forecast::{ForecastModel, PriceWindow};
use normbench::domain::price_series::PriceSeries;
use normbench::domain::walk_forward::{BestMethodSelection, MethodMetrics, SkippedMethod};
use normbench::ports::report_port::ReportPort;
use normbench::ports::series_port::SeriesPort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub struct MockSeriesPort {
    pub data: HashMap<String, PriceSeries>,
    pub errors: HashMap<String, String>,
}

impl MockSeriesPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.data.insert(series.instrument().to_string(), series);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl SeriesPort for MockSeriesPort {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, NormbenchError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(NormbenchError::Data {
                reason: reason.clone(),
            });
        }
        self.data
            .get(instrument)
            .cloned()
            .ok_or_else(|| NormbenchError::EmptySeries {
                instrument: instrument.to_string(),
            })
    }

    fn list_instruments(&self) -> Result<Vec<String>, NormbenchError> {
        let mut names: Vec<String> = self
            .data
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Replays a fixed list of predictions; NaN entries and an exhausted
/// script are forecast failures.
pub struct ScriptedModel {
    values: Vec<f64>,
    cursor: Cell<usize>,
}

impl ScriptedModel {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.cursor.get()
    }
}

impl ForecastModel<PriceWindow> for ScriptedModel {
    fn predict(&self, _input: &PriceWindow) -> Result<f64, NormbenchError> {
        let i = self.cursor.get();
        self.cursor.set(i + 1);
        match self.values.get(i) {
            Some(v) if v.is_nan() => Err(NormbenchError::model_fit("scripted failure")),
            Some(&v) => Ok(v),
            None => Err(NormbenchError::model_fit("script exhausted")),
        }
    }
}

#[derive(Default)]
pub struct MemoryReportPort {
    pub leaderboard: RefCell<Vec<MethodMetrics>>,
    pub selections: RefCell<Vec<BestMethodSelection>>,
    pub skipped_methods: RefCell<Vec<SkippedMethod>>,
    pub skipped_instruments: RefCell<Vec<SkippedInstrument>>,
    pub simulations: RefCell<Vec<SimulationResult>>,
}

impl ReportPort for MemoryReportPort {
    fn write_leaderboard(&self, rows: &[MethodMetrics]) -> Result<(), NormbenchError> {
        self.leaderboard.borrow_mut().extend_from_slice(rows);
        Ok(())
    }

    fn write_selections(&self, rows: &[BestMethodSelection]) -> Result<(), NormbenchError> {
        self.selections.borrow_mut().extend_from_slice(rows);
        Ok(())
    }

    fn write_skipped(
        &self,
        methods: &[SkippedMethod],
        instruments: &[SkippedInstrument],
    ) -> Result<(), NormbenchError> {
        self.skipped_methods.borrow_mut().extend_from_slice(methods);
        self.skipped_instruments
            .borrow_mut()
            .extend_from_slice(instruments);
        Ok(())
    }

    fn write_simulation(&self, result: &SimulationResult) -> Result<(), NormbenchError> {
        self.simulations.borrow_mut().push(result.clone());
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_series(instrument: &str, closes: &[f64]) -> PriceSeries {
    PriceSeries::from_closes(instrument, date(2023, 1, 2), closes).unwrap()
}

/// Upward drift with a sine wobble, strictly positive.
pub fn wavy_closes(count: usize, phase: f64) -> Vec<f64> {
    (0..count)
        .map(|i| 50.0 + 0.25 * i as f64 + 4.0 * (0.35 * i as f64 + phase).sin())
        .collect()
}

pub fn linear_closes(count: usize, start: f64, step: f64) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

pub fn series_csv(closes: &[f64]) -> String {
    let mut out = String::from("date,close\n");
    for (i, close) in closes.iter().enumerate() {
        let day = date(2023, 1, 2) + chrono::Duration::days(i as i64);
        out.push_str(&format!("{},{}\n", day.format("%Y-%m-%d"), close));
    }
    out
}
