//! Risk-budget position sizing.

use super::error::NormbenchError;

pub const DEFAULT_RISK_PERCENT: f64 = 2.0;

/// Whole shares affordable with `risk_percent` of `equity` at `price`.
///
/// `floor(equity * risk_percent / 100 / price)`, clamped to zero when the
/// budget buys nothing. A non-positive or non-finite price is degenerate.
pub fn position_size(equity: f64, risk_percent: f64, price: f64) -> Result<u64, NormbenchError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(NormbenchError::degenerate(format!(
            "cannot size a position at price {}",
            price
        )));
    }
    if !equity.is_finite() || !risk_percent.is_finite() {
        return Err(NormbenchError::degenerate(format!(
            "cannot size with equity {} and risk {}%",
            equity, risk_percent
        )));
    }

    let shares = (equity * risk_percent / 100.0 / price).floor();
    if shares <= 0.0 {
        return Ok(0);
    }
    Ok(shares as u64)
}
