//! Domain error types.

/// Top-level error type for normbench.
#[derive(Debug, thiserror::Error)]
pub enum NormbenchError {
    #[error("degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("invalid domain: {reason}")]
    InvalidDomain { reason: String },

    #[error("model fit error: {reason}")]
    ModelFit { reason: String },

    #[error("insufficient data for {instrument}: have {have} points, need {need}")]
    InsufficientData {
        instrument: String,
        have: usize,
        need: usize,
    },

    #[error("empty series for {instrument}")]
    EmptySeries { instrument: String },

    #[error("series for {instrument} is not strictly increasing at index {index}")]
    UnorderedSeries { instrument: String, index: usize },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl NormbenchError {
    pub fn degenerate(reason: impl Into<String>) -> Self {
        NormbenchError::DegenerateInput {
            reason: reason.into(),
        }
    }

    pub fn invalid_domain(reason: impl Into<String>) -> Self {
        NormbenchError::InvalidDomain {
            reason: reason.into(),
        }
    }

    pub fn model_fit(reason: impl Into<String>) -> Self {
        NormbenchError::ModelFit {
            reason: reason.into(),
        }
    }

    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        NormbenchError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Numeric conditions that skip a single method or bar instead of
    /// failing the whole run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NormbenchError::DegenerateInput { .. }
                | NormbenchError::InvalidDomain { .. }
                | NormbenchError::ModelFit { .. }
                | NormbenchError::InsufficientData { .. }
        )
    }
}

impl From<&NormbenchError> for std::process::ExitCode {
    fn from(err: &NormbenchError) -> Self {
        let code: u8 = match err {
            NormbenchError::Io(_) | NormbenchError::Csv(_) => 1,
            NormbenchError::ConfigParse { .. }
            | NormbenchError::ConfigMissing { .. }
            | NormbenchError::ConfigInvalid { .. } => 2,
            NormbenchError::Data { .. }
            | NormbenchError::EmptySeries { .. }
            | NormbenchError::UnorderedSeries { .. }
            | NormbenchError::InsufficientData { .. } => 3,
            NormbenchError::DegenerateInput { .. }
            | NormbenchError::InvalidDomain { .. }
            | NormbenchError::ModelFit { .. } => 4,
            NormbenchError::Cancelled => 130,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_errors_are_recoverable() {
        assert!(NormbenchError::degenerate("zero variance").is_recoverable());
        assert!(NormbenchError::invalid_domain("negative").is_recoverable());
        assert!(NormbenchError::model_fit("singular").is_recoverable());
        assert!(
            NormbenchError::InsufficientData {
                instrument: "AAPL".into(),
                have: 3,
                need: 33,
            }
            .is_recoverable()
        );
    }

    #[test]
    fn structural_errors_are_fatal() {
        assert!(
            !NormbenchError::EmptySeries {
                instrument: "AAPL".into()
            }
            .is_recoverable()
        );
        assert!(!NormbenchError::Cancelled.is_recoverable());
        assert!(!NormbenchError::config_invalid("strategy", "lookback", "zero").is_recoverable());
    }

    fn exit_code(err: &NormbenchError) -> String {
        format!("{:?}", std::process::ExitCode::from(err))
    }

    #[test]
    fn exit_codes_follow_the_error_family() {
        let code = |n: u8| format!("{:?}", std::process::ExitCode::from(n));
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(exit_code(&NormbenchError::Io(io)), code(1));
        assert_eq!(
            exit_code(&NormbenchError::config_invalid("strategy", "lags", "zero")),
            code(2)
        );
        let data = NormbenchError::Data {
            reason: "no instruments".into(),
        };
        assert_eq!(exit_code(&data), code(3));
        assert_eq!(
            exit_code(&NormbenchError::InsufficientData {
                instrument: "AAPL".into(),
                have: 3,
                need: 33,
            }),
            code(3)
        );
        assert_eq!(exit_code(&NormbenchError::model_fit("singular")), code(4));
        assert_eq!(exit_code(&NormbenchError::degenerate("flat")), code(4));
        assert_eq!(exit_code(&NormbenchError::Cancelled), code(130));
    }

    #[test]
    fn display_includes_context() {
        let err = NormbenchError::InsufficientData {
            instrument: "MSFT".into(),
            have: 10,
            need: 33,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for MSFT: have 10 points, need 33"
        );

        let err = NormbenchError::config_invalid("strategy", "risk_percent", "must be <= 100");
        assert_eq!(
            err.to_string(),
            "invalid config value [strategy] risk_percent: must be <= 100"
        );
    }
}
