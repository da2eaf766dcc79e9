//! Per-instrument close-price series.

use chrono::NaiveDate;

use super::error::NormbenchError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Ordered `(date, close)` series for one instrument.
///
/// Dates are strictly increasing and every close is finite. The series is
/// read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(
        instrument: impl Into<String>,
        points: Vec<PricePoint>,
    ) -> Result<Self, NormbenchError> {
        let instrument = instrument.into();

        if points.is_empty() {
            return Err(NormbenchError::EmptySeries { instrument });
        }

        for (index, pair) in points.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(NormbenchError::UnorderedSeries {
                    instrument,
                    index: index + 1,
                });
            }
        }

        if let Some(bad) = points.iter().find(|p| !p.close.is_finite()) {
            return Err(NormbenchError::degenerate(format!(
                "{} has a non-finite close on {}",
                instrument, bad.date
            )));
        }

        Ok(Self { instrument, points })
    }

    /// Build a series from closes on consecutive calendar days starting at `start`.
    pub fn from_closes(
        instrument: impl Into<String>,
        start: NaiveDate,
        closes: &[f64],
    ) -> Result<Self, NormbenchError> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect();
        Self::new(instrument, points)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// The points from `start` onwards as a series of their own.
    pub fn tail_from(&self, start: usize) -> Result<PriceSeries, NormbenchError> {
        let points = self.points.get(start..).unwrap_or_default().to_vec();
        Self::new(self.instrument.clone(), points)
    }

    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        (self.first_date(), self.last_date())
    }
}
