//! Summary statistics over a finished simulation.

use super::account::{ClosedTrade, EquityPoint};
use super::executor::SimulationResult;

const PERIODS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Performance {
    pub final_equity: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below the running peak.
    pub max_drawdown_duration: usize,
    pub sharpe_ratio: f64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl Performance {
    pub fn compute(result: &SimulationResult, initial_cash: f64) -> Self {
        let final_equity = result
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_cash);

        let total_return = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = drawdown(&result.equity_curve);
        let sharpe_ratio = sharpe(&result.equity_curve);
        let stats = TradeStats::from_trades(&result.closed_trades);

        Performance {
            final_equity,
            total_return,
            max_drawdown,
            max_drawdown_duration,
            sharpe_ratio,
            trades_won: stats.won,
            trades_lost: stats.lost,
            trades_breakeven: stats.breakeven,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
        }
    }

    pub fn total_trades(&self) -> usize {
        self.trades_won + self.trades_lost + self.trades_breakeven
    }
}

#[derive(Default)]
struct TradeStats {
    won: usize,
    lost: usize,
    breakeven: usize,
    gross_profit: f64,
    gross_loss: f64,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        for trade in trades {
            if trade.pnl > 0.0 {
                stats.won += 1;
                stats.gross_profit += trade.pnl;
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                stats.gross_loss += trade.pnl.abs();
            } else {
                stats.breakeven += 1;
            }
        }
        stats
    }

    fn win_rate(&self) -> f64 {
        let total = self.won + self.lost + self.breakeven;
        if total > 0 {
            self.won as f64 / total as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

fn drawdown(curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut longest = 0usize;
    let mut current = 0usize;

    for point in curve {
        if point.equity >= peak {
            peak = point.equity;
            current = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            current += 1;
            longest = longest.max(current);
        }
    }

    (max_dd, longest)
}

fn sharpe(curve: &[EquityPoint]) -> f64 {
    if curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 {
        mean / stddev * PERIODS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
