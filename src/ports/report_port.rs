//! Report output port trait.

use crate::domain::benchmark::{BenchmarkReport, SkippedInstrument};
use crate::domain::error::NormbenchError;
use crate::domain::executor::SimulationResult;
use crate::domain::walk_forward::{BestMethodSelection, MethodMetrics, SkippedMethod};

/// Port for persisting benchmark tables and simulation logs.
pub trait ReportPort {
    fn write_leaderboard(&self, rows: &[MethodMetrics]) -> Result<(), NormbenchError>;

    fn write_selections(&self, rows: &[BestMethodSelection]) -> Result<(), NormbenchError>;

    fn write_skipped(
        &self,
        methods: &[SkippedMethod],
        instruments: &[SkippedInstrument],
    ) -> Result<(), NormbenchError>;

    fn write_simulation(&self, result: &SimulationResult) -> Result<(), NormbenchError>;

    /// Default implementation: writes the three benchmark tables in turn.
    fn write_benchmark(&self, report: &BenchmarkReport) -> Result<(), NormbenchError> {
        self.write_leaderboard(&report.leaderboard())?;
        self.write_selections(&report.selections)?;
        self.write_skipped(&report.skipped_methods(), &report.skipped_instruments)
    }
}
