//! Forecast-driven strategy simulation.
//!
//! Bars are processed strictly in time order. Each bar passes through
//! [`step`], which takes the model, the configuration and the explicit
//! [`SimulationState`]; no state lives on the model or the executor.
//!
//! Phases: `Warming` until `lookback` closes have been seen, then
//! `Forecasting`. A run ends in `Finished` when the feed is exhausted,
//! `Aborted` when the model fails on `max_consecutive_failures` bars in a
//! row, or `Cancelled` when the token trips between bars.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::account::{AccountState, ClosedTrade, EquityPoint, TradeRecord};
use super::cancel::CancelToken;
use super::error::NormbenchError;
use super::forecast::{ForecastModel, PriceWindow};
use super::price_series::{PricePoint, PriceSeries};
use super::sizing::{DEFAULT_RISK_PERCENT, position_size};

pub const DEFAULT_LOOKBACK: usize = 20;
pub const DEFAULT_INITIAL_CASH: f64 = 10_000.0;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub lookback: usize,
    pub risk_percent: f64,
    pub initial_cash: f64,
    /// Consecutive failed bars that abort the run; 0 never aborts.
    pub max_consecutive_failures: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            lookback: DEFAULT_LOOKBACK,
            risk_percent: DEFAULT_RISK_PERCENT,
            initial_cash: DEFAULT_INITIAL_CASH,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), NormbenchError> {
        if self.lookback == 0 {
            return Err(NormbenchError::config_invalid(
                "strategy",
                "lookback",
                "lookback must be at least 1",
            ));
        }
        if !(0.0..=100.0).contains(&self.risk_percent) {
            return Err(NormbenchError::config_invalid(
                "strategy",
                "risk_percent",
                "risk_percent must be between 0 and 100",
            ));
        }
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return Err(NormbenchError::config_invalid(
                "strategy",
                "initial_cash",
                "initial_cash must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Warming,
    Forecasting,
    Finished,
    Aborted,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finished | Phase::Aborted | Phase::Cancelled)
    }
}

/// Fixed-capacity window of the most recent closes.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        RollingWindow {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn to_price_window(&self) -> PriceWindow {
        PriceWindow::new(self.values.iter().copied().collect())
    }
}

/// Append-only record of predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastHistory {
    values: Vec<f64>,
}

impl ForecastHistory {
    pub fn push(&mut self, prediction: f64) {
        self.values.push(prediction);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hold,
    EnterLong,
    Exit,
}

/// Compare consecutive predictions against the current position.
pub fn derive_signal(previous: f64, current: f64, account: &AccountState) -> Signal {
    if current > previous && account.is_flat() {
        Signal::EnterLong
    } else if current < previous && account.has_position() {
        Signal::Exit
    } else {
        Signal::Hold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarFailure {
    pub bar_index: usize,
    pub date: NaiveDate,
    pub reason: String,
}

/// What a single bar did.
#[derive(Debug, Clone, PartialEq)]
pub enum BarOutcome {
    Warming,
    /// First prediction; nothing to compare against yet.
    NoSignal,
    Hold,
    Entered(TradeRecord),
    Exited(TradeRecord),
    /// The model failed; nothing but the equity point was recorded.
    Skipped,
}

/// Everything a run mutates, passed explicitly into each [`step`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub phase: Phase,
    pub window: RollingWindow,
    pub history: ForecastHistory,
    pub account: AccountState,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub closed_trades: Vec<ClosedTrade>,
    pub failures: Vec<BarFailure>,
    pub consecutive_failures: usize,
}

impl SimulationState {
    pub fn new(config: &ExecutorConfig) -> Self {
        SimulationState {
            phase: Phase::Warming,
            window: RollingWindow::new(config.lookback),
            history: ForecastHistory::default(),
            account: AccountState::new(config.initial_cash),
            equity_curve: Vec::new(),
            trades: Vec::new(),
            closed_trades: Vec::new(),
            failures: Vec::new(),
            consecutive_failures: 0,
        }
    }

    pub fn bars_processed(&self) -> usize {
        self.equity_curve.len()
    }
}

/// Process one bar.
///
/// The order decision is computed before anything is written, so the state
/// is either fully updated for this bar or untouched apart from the window,
/// the failure log and the equity point.
pub fn step<M>(
    model: &M,
    config: &ExecutorConfig,
    state: &mut SimulationState,
    bar_index: usize,
    bar: &PricePoint,
) -> BarOutcome
where
    M: ForecastModel<PriceWindow> + ?Sized,
{
    let price = bar.close;
    state.window.push(price);

    let outcome = if !state.window.is_full() {
        state.phase = Phase::Warming;
        BarOutcome::Warming
    } else {
        state.phase = Phase::Forecasting;
        forecast_bar(model, config, state, bar_index, bar)
    };

    let equity = state.account.equity(price);
    state.equity_curve.push(EquityPoint {
        bar_index,
        date: bar.date,
        equity,
    });

    outcome
}

fn forecast_bar<M>(
    model: &M,
    config: &ExecutorConfig,
    state: &mut SimulationState,
    bar_index: usize,
    bar: &PricePoint,
) -> BarOutcome
where
    M: ForecastModel<PriceWindow> + ?Sized,
{
    let prediction = model
        .predict(&state.window.to_price_window())
        .and_then(|p| {
            if p.is_finite() {
                Ok(p)
            } else {
                Err(NormbenchError::model_fit("prediction is not finite"))
            }
        });

    let prediction = match prediction {
        Ok(p) => p,
        Err(e) => {
            state.consecutive_failures += 1;
            warn!(
                bar = bar_index,
                date = %bar.date,
                consecutive = state.consecutive_failures,
                error = %e,
                "forecast failed, bar skipped"
            );
            state.failures.push(BarFailure {
                bar_index,
                date: bar.date,
                reason: e.to_string(),
            });
            if config.max_consecutive_failures > 0
                && state.consecutive_failures >= config.max_consecutive_failures
            {
                state.phase = Phase::Aborted;
            }
            return BarOutcome::Skipped;
        }
    };

    state.consecutive_failures = 0;
    let previous = state.history.last();
    state.history.push(prediction);

    let previous = match previous {
        Some(p) => p,
        None => return BarOutcome::NoSignal,
    };

    let price = bar.close;
    match derive_signal(previous, prediction, &state.account) {
        Signal::Hold => BarOutcome::Hold,
        Signal::EnterLong => {
            let equity = state.account.equity(price);
            let quantity = match position_size(equity, config.risk_percent, price) {
                Ok(q) => q,
                Err(e) => {
                    warn!(bar = bar_index, error = %e, "entry not sized");
                    state.failures.push(BarFailure {
                        bar_index,
                        date: bar.date,
                        reason: e.to_string(),
                    });
                    return BarOutcome::Hold;
                }
            };
            match state.account.open_long(quantity, price, bar_index, bar.date) {
                Some(record) => {
                    debug!(bar = bar_index, quantity, price, "entered long");
                    state.trades.push(record.clone());
                    BarOutcome::Entered(record)
                }
                None => BarOutcome::Hold,
            }
        }
        Signal::Exit => match state.account.close(price, bar_index, bar.date) {
            Some((record, closed)) => {
                debug!(
                    bar = bar_index,
                    quantity = record.quantity,
                    price,
                    pnl = closed.pnl,
                    "exited"
                );
                state.trades.push(record.clone());
                state.closed_trades.push(closed);
                BarOutcome::Exited(record)
            }
            None => BarOutcome::Hold,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub instrument: String,
    pub phase: Phase,
    pub initial_cash: f64,
    pub account: AccountState,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub closed_trades: Vec<ClosedTrade>,
    pub failures: Vec<BarFailure>,
    pub forecasts: ForecastHistory,
}

impl SimulationResult {
    pub fn bars_processed(&self) -> usize {
        self.equity_curve.len()
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_cash)
    }
}

#[derive(Debug, Clone)]
pub struct StrategyExecutor {
    config: ExecutorConfig,
}

impl StrategyExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, NormbenchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn run<M>(
        &self,
        model: &M,
        series: &PriceSeries,
        cancel: &CancelToken,
    ) -> Result<SimulationResult, NormbenchError>
    where
        M: ForecastModel<PriceWindow> + ?Sized,
    {
        if series.len() < self.config.lookback {
            return Err(NormbenchError::InsufficientData {
                instrument: series.instrument().to_string(),
                have: series.len(),
                need: self.config.lookback,
            });
        }

        let mut state = SimulationState::new(&self.config);

        for (bar_index, bar) in series.points().iter().enumerate() {
            if cancel.is_cancelled() {
                state.phase = Phase::Cancelled;
                break;
            }
            step(model, &self.config, &mut state, bar_index, bar);
            if state.phase == Phase::Aborted {
                warn!(
                    instrument = series.instrument(),
                    bar = bar_index,
                    failures = state.consecutive_failures,
                    "simulation aborted after consecutive forecast failures"
                );
                break;
            }
        }

        if !state.phase.is_terminal() {
            state.phase = Phase::Finished;
        }

        let result = SimulationResult {
            instrument: series.instrument().to_string(),
            phase: state.phase,
            initial_cash: self.config.initial_cash,
            account: state.account,
            equity_curve: state.equity_curve,
            trades: state.trades,
            closed_trades: state.closed_trades,
            failures: state.failures,
            forecasts: state.history,
        };

        info!(
            instrument = %result.instrument,
            phase = ?result.phase,
            bars = result.bars_processed(),
            trades = result.trades.len(),
            failures = result.failures.len(),
            final_equity = result.final_equity(),
            "simulation finished"
        );

        Ok(result)
    }
}
