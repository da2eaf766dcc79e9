//! Price series source port.

use crate::domain::error::NormbenchError;
use crate::domain::price_series::PriceSeries;

pub trait SeriesPort {
    fn fetch_series(&self, instrument: &str) -> Result<PriceSeries, NormbenchError>;

    fn list_instruments(&self) -> Result<Vec<String>, NormbenchError>;
}
