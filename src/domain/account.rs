//! Virtual account state and the records produced by order application.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One applied order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub side: Side,
    pub quantity: u64,
    pub price: f64,
    pub cash_after: f64,
}

/// A completed entry/exit pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub quantity: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    bar_index: usize,
    date: NaiveDate,
}

/// Cash plus at most one long position.
///
/// `position_size` is zero exactly when `entry_price` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub cash: f64,
    pub position_size: u64,
    pub entry_price: Option<f64>,
    entry: Option<OpenEntry>,
}

impl AccountState {
    pub fn new(initial_cash: f64) -> Self {
        AccountState {
            cash: initial_cash,
            position_size: 0,
            entry_price: None,
            entry: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position_size == 0
    }

    pub fn has_position(&self) -> bool {
        self.position_size > 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.position_size as f64 * price
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.market_value(price)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.entry_price {
            Some(entry) => self.position_size as f64 * (price - entry),
            None => 0.0,
        }
    }

    /// Open a long position. Returns `None` (no order) when already long
    /// or when `quantity` is zero.
    pub fn open_long(
        &mut self,
        quantity: u64,
        price: f64,
        bar_index: usize,
        date: NaiveDate,
    ) -> Option<TradeRecord> {
        if self.has_position() || quantity == 0 {
            return None;
        }

        self.cash -= quantity as f64 * price;
        self.position_size = quantity;
        self.entry_price = Some(price);
        self.entry = Some(OpenEntry { bar_index, date });

        Some(TradeRecord {
            bar_index,
            date,
            side: Side::Buy,
            quantity,
            price,
            cash_after: self.cash,
        })
    }

    /// Close the whole position. Returns `None` when flat.
    pub fn close(
        &mut self,
        price: f64,
        bar_index: usize,
        date: NaiveDate,
    ) -> Option<(TradeRecord, ClosedTrade)> {
        let entry_price = self.entry_price?;
        let entry = self.entry?;
        let quantity = self.position_size;

        self.cash += quantity as f64 * price;
        self.position_size = 0;
        self.entry_price = None;
        self.entry = None;

        let record = TradeRecord {
            bar_index,
            date,
            side: Side::Sell,
            quantity,
            price,
            cash_after: self.cash,
        };
        let closed = ClosedTrade {
            entry_bar: entry.bar_index,
            exit_bar: bar_index,
            entry_date: entry.date,
            exit_date: date,
            quantity,
            entry_price,
            exit_price: price,
            pnl: quantity as f64 * (price - entry_price),
        };
        Some((record, closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn new_account_is_flat() {
        let account = AccountState::new(10_000.0);
        assert!(account.is_flat());
        assert_eq!(account.entry_price, None);
        assert_abs_diff_eq!(account.equity(123.0), 10_000.0);
    }

    #[test]
    fn open_long_debits_cash() {
        let mut account = AccountState::new(10_000.0);
        let record = account.open_long(20, 50.0, 3, day(4)).unwrap();

        assert_eq!(record.side, Side::Buy);
        assert_eq!(record.quantity, 20);
        assert_abs_diff_eq!(account.cash, 9_000.0);
        assert_abs_diff_eq!(record.cash_after, 9_000.0);
        assert_eq!(account.position_size, 20);
        assert_eq!(account.entry_price, Some(50.0));
        assert_abs_diff_eq!(account.equity(55.0), 10_100.0);
        assert_abs_diff_eq!(account.unrealized_pnl(55.0), 100.0);
    }

    #[test]
    fn open_long_while_long_is_noop() {
        let mut account = AccountState::new(10_000.0);
        account.open_long(10, 50.0, 0, day(1)).unwrap();
        let before = account.clone();
        assert!(account.open_long(5, 40.0, 1, day(2)).is_none());
        assert_eq!(account, before);
    }

    #[test]
    fn open_zero_quantity_is_noop() {
        let mut account = AccountState::new(10_000.0);
        assert!(account.open_long(0, 50.0, 0, day(1)).is_none());
        assert!(account.is_flat());
    }

    #[test]
    fn close_credits_cash_and_records_trade() {
        let mut account = AccountState::new(10_000.0);
        account.open_long(10, 100.0, 2, day(2)).unwrap();
        let (record, closed) = account.close(110.0, 7, day(7)).unwrap();

        assert_eq!(record.side, Side::Sell);
        assert_eq!(record.quantity, 10);
        assert_abs_diff_eq!(account.cash, 10_100.0);
        assert!(account.is_flat());
        assert_eq!(account.entry_price, None);

        assert_eq!(closed.entry_bar, 2);
        assert_eq!(closed.exit_bar, 7);
        assert_eq!(closed.entry_date, day(2));
        assert_eq!(closed.exit_date, day(7));
        assert_abs_diff_eq!(closed.pnl, 100.0);
    }

    #[test]
    fn close_when_flat_is_noop() {
        let mut account = AccountState::new(10_000.0);
        assert!(account.close(100.0, 0, day(1)).is_none());
        assert_abs_diff_eq!(account.cash, 10_000.0);
    }

    #[test]
    fn round_trip_at_constant_price_conserves_equity() {
        let mut account = AccountState::new(10_000.0);
        account.open_long(37, 81.25, 0, day(1)).unwrap();
        assert_abs_diff_eq!(account.equity(81.25), 10_000.0, epsilon = 1e-9);
        account.close(81.25, 1, day(2)).unwrap();
        assert_abs_diff_eq!(account.cash, 10_000.0, epsilon = 1e-9);
    }
}
