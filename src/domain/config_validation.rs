//! Configuration loading and validation.
//!
//! Every key is checked before a run starts. Absent keys take their
//! defaults; present but malformed keys are `ConfigInvalid`.

use std::str::FromStr;

use crate::domain::error::NormbenchError;
use crate::domain::executor::{
    DEFAULT_INITIAL_CASH, DEFAULT_LOOKBACK, DEFAULT_MAX_CONSECUTIVE_FAILURES, ExecutorConfig,
};
use crate::domain::forecast::ModelKind;
use crate::domain::normalizer::{DEFAULT_EPSILON, NormalizationMethod, parse_methods};
use crate::domain::sizing::DEFAULT_RISK_PERCENT;
use crate::domain::walk_forward::{BenchmarkConfig, DEFAULT_TAIL_LENGTH};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LAGS: usize = 5;
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Where price series are read from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Csv { dir: String },
    Sqlite { path: String, pool_size: u32 },
}

fn parse_key<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, NormbenchError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            NormbenchError::config_invalid(section, key, format!("cannot parse '{}'", raw.trim()))
        }),
    }
}

fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, NormbenchError> {
    match config.get_string(section, key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(NormbenchError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

pub fn load_benchmark_config(config: &dyn ConfigPort) -> Result<BenchmarkConfig, NormbenchError> {
    let methods = match config.get_string("benchmark", "methods") {
        Some(raw) if !raw.trim().is_empty() => parse_methods(&raw)
            .map_err(|reason| NormbenchError::config_invalid("benchmark", "methods", reason))?,
        _ => NormalizationMethod::ALL.to_vec(),
    };

    let benchmark = BenchmarkConfig {
        tail_length: parse_key(config, "benchmark", "tail_length", DEFAULT_TAIL_LENGTH)?,
        epsilon: parse_key(config, "benchmark", "epsilon", DEFAULT_EPSILON)?,
        methods,
        workers: parse_key(config, "benchmark", "workers", 1)?,
    };
    benchmark.validate()?;
    Ok(benchmark)
}

pub fn load_executor_config(config: &dyn ConfigPort) -> Result<ExecutorConfig, NormbenchError> {
    let executor = ExecutorConfig {
        lookback: parse_key(config, "strategy", "lookback", DEFAULT_LOOKBACK)?,
        risk_percent: parse_key(config, "strategy", "risk_percent", DEFAULT_RISK_PERCENT)?,
        initial_cash: parse_key(config, "strategy", "initial_cash", DEFAULT_INITIAL_CASH)?,
        max_consecutive_failures: parse_key(
            config,
            "strategy",
            "max_consecutive_failures",
            DEFAULT_MAX_CONSECUTIVE_FAILURES,
        )?,
    };
    executor.validate()?;
    Ok(executor)
}

pub fn load_model_kind(config: &dyn ConfigPort) -> Result<ModelKind, NormbenchError> {
    let name = config
        .get_string("strategy", "model")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "trend".to_string());

    match name.as_str() {
        "" | "trend" => Ok(ModelKind::Trend),
        "lagged" => {
            let lags = parse_key(config, "strategy", "lags", DEFAULT_LAGS)?;
            if lags == 0 {
                return Err(NormbenchError::config_invalid(
                    "strategy",
                    "lags",
                    "lags must be at least 1",
                ));
            }
            let train_bars = match config.get_string("strategy", "train_bars") {
                Some(raw) if !raw.trim().is_empty() => {
                    let bars: usize = parse_key(config, "strategy", "train_bars", 0)?;
                    if bars <= lags {
                        return Err(NormbenchError::config_invalid(
                            "strategy",
                            "train_bars",
                            format!("train_bars must exceed lags ({})", lags),
                        ));
                    }
                    Some(bars)
                }
                _ => None,
            };
            Ok(ModelKind::Lagged { lags, train_bars })
        }
        other => Err(NormbenchError::config_invalid(
            "strategy",
            "model",
            format!("unknown model '{}', expected trend or lagged", other),
        )),
    }
}

pub fn load_data_source(config: &dyn ConfigPort) -> Result<DataSource, NormbenchError> {
    let source = config
        .get_string("data", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());

    match source.as_str() {
        "" | "csv" => Ok(DataSource::Csv {
            dir: required_string(config, "data", "dir")?,
        }),
        "sqlite" => {
            let pool_size = parse_key(config, "sqlite", "pool_size", DEFAULT_POOL_SIZE)?;
            if pool_size == 0 {
                return Err(NormbenchError::config_invalid(
                    "sqlite",
                    "pool_size",
                    "pool_size must be at least 1",
                ));
            }
            Ok(DataSource::Sqlite {
                path: required_string(config, "sqlite", "path")?,
                pool_size,
            })
        }
        other => Err(NormbenchError::config_invalid(
            "data",
            "source",
            format!("unknown source '{}', expected csv or sqlite", other),
        )),
    }
}

/// Instruments named in `[benchmark] instruments`, or `None` to use every
/// instrument the source lists.
pub fn load_instruments(config: &dyn ConfigPort) -> Result<Option<Vec<String>>, NormbenchError> {
    let Some(raw) = config.get_string("benchmark", "instruments") else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let mut instruments: Vec<String> = Vec::new();
    for token in raw.split(',') {
        let name = token.trim();
        if name.is_empty() {
            return Err(NormbenchError::config_invalid(
                "benchmark",
                "instruments",
                "empty instrument name in list",
            ));
        }
        if !instruments.iter().any(|i| i == name) {
            instruments.push(name.to_string());
        }
    }
    Ok(Some(instruments))
}

pub fn validate_benchmark_config(config: &dyn ConfigPort) -> Result<(), NormbenchError> {
    load_data_source(config)?;
    load_instruments(config)?;
    load_benchmark_config(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), NormbenchError> {
    let executor = load_executor_config(config)?;
    let model = load_model_kind(config)?;
    if executor.lookback < model.min_window() {
        return Err(NormbenchError::config_invalid(
            "strategy",
            "lookback",
            format!(
                "lookback {} is shorter than the {} closes the {} model needs",
                executor.lookback,
                model.min_window(),
                model
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestConfig {
        values: HashMap<(String, String), String>,
    }

    impl TestConfig {
        fn new(pairs: &[(&str, &str, &str)]) -> Self {
            let values = pairs
                .iter()
                .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                .collect();
            Self { values }
        }
    }

    impl ConfigPort for TestConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }
    }

    fn invalid_key(err: NormbenchError) -> String {
        match err {
            NormbenchError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = TestConfig::new(&[]);
        assert_eq!(load_benchmark_config(&config).unwrap(), BenchmarkConfig::default());
        assert_eq!(load_executor_config(&config).unwrap(), ExecutorConfig::default());
        assert_eq!(load_model_kind(&config).unwrap(), ModelKind::Trend);
        assert_eq!(load_instruments(&config).unwrap(), None);
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn benchmark_section_is_parsed() {
        let config = TestConfig::new(&[
            ("benchmark", "tail_length", "12"),
            ("benchmark", "epsilon", "0.001"),
            ("benchmark", "methods", "zscore, log"),
            ("benchmark", "workers", "3"),
        ]);
        let benchmark = load_benchmark_config(&config).unwrap();
        assert_eq!(benchmark.tail_length, 12);
        assert_eq!(benchmark.epsilon, 0.001);
        assert_eq!(
            benchmark.methods,
            vec![NormalizationMethod::ZScore, NormalizationMethod::Log]
        );
        assert_eq!(benchmark.workers, 3);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let config = TestConfig::new(&[("benchmark", "tail_length", "thirty")]);
        assert_eq!(invalid_key(load_benchmark_config(&config).unwrap_err()), "tail_length");

        let config = TestConfig::new(&[("strategy", "risk_percent", "lots")]);
        assert_eq!(invalid_key(load_executor_config(&config).unwrap_err()), "risk_percent");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases: &[(&str, &str, &str)] = &[
            ("benchmark", "tail_length", "1"),
            ("benchmark", "epsilon", "-0.5"),
            ("benchmark", "workers", "0"),
            ("benchmark", "methods", "zscore,zscore"),
            ("benchmark", "methods", "median"),
        ];
        for &(section, key, value) in cases {
            let config = TestConfig::new(&[(section, key, value)]);
            assert_eq!(invalid_key(load_benchmark_config(&config).unwrap_err()), key);
        }

        let cases: &[(&str, &str, &str)] = &[
            ("strategy", "lookback", "0"),
            ("strategy", "risk_percent", "101"),
            ("strategy", "risk_percent", "-1"),
            ("strategy", "initial_cash", "-10"),
        ];
        for &(section, key, value) in cases {
            let config = TestConfig::new(&[(section, key, value)]);
            assert_eq!(invalid_key(load_executor_config(&config).unwrap_err()), key);
        }
    }

    #[test]
    fn negative_counts_do_not_parse() {
        let config = TestConfig::new(&[("strategy", "max_consecutive_failures", "-1")]);
        assert_eq!(
            invalid_key(load_executor_config(&config).unwrap_err()),
            "max_consecutive_failures"
        );
    }

    #[test]
    fn model_selection() {
        let config = TestConfig::new(&[("strategy", "model", "Lagged"), ("strategy", "lags", "3")]);
        assert_eq!(
            load_model_kind(&config).unwrap(),
            ModelKind::Lagged {
                lags: 3,
                train_bars: None
            }
        );

        let config = TestConfig::new(&[("strategy", "model", "lagged")]);
        assert_eq!(
            load_model_kind(&config).unwrap(),
            ModelKind::Lagged {
                lags: DEFAULT_LAGS,
                train_bars: None
            }
        );

        let config = TestConfig::new(&[("strategy", "model", "neural")]);
        assert_eq!(invalid_key(load_model_kind(&config).unwrap_err()), "model");

        let config = TestConfig::new(&[("strategy", "model", "lagged"), ("strategy", "lags", "0")]);
        assert_eq!(invalid_key(load_model_kind(&config).unwrap_err()), "lags");
    }

    #[test]
    fn lagged_training_prefix() {
        let config = TestConfig::new(&[
            ("strategy", "model", "lagged"),
            ("strategy", "lags", "3"),
            ("strategy", "train_bars", "120"),
        ]);
        assert_eq!(
            load_model_kind(&config).unwrap(),
            ModelKind::Lagged {
                lags: 3,
                train_bars: Some(120)
            }
        );

        for bad in ["3", "-5", "half"] {
            let config = TestConfig::new(&[
                ("strategy", "model", "lagged"),
                ("strategy", "lags", "3"),
                ("strategy", "train_bars", bad),
            ]);
            assert_eq!(invalid_key(load_model_kind(&config).unwrap_err()), "train_bars");
        }
    }

    #[test]
    fn lookback_must_fit_model() {
        let config = TestConfig::new(&[
            ("strategy", "model", "lagged"),
            ("strategy", "lags", "10"),
            ("strategy", "lookback", "5"),
        ]);
        assert_eq!(invalid_key(validate_strategy_config(&config).unwrap_err()), "lookback");

        let config = TestConfig::new(&[("strategy", "lookback", "1")]);
        assert!(validate_strategy_config(&config).is_err());
    }

    #[test]
    fn data_source_csv_requires_dir() {
        let config = TestConfig::new(&[]);
        assert!(matches!(
            load_data_source(&config),
            Err(NormbenchError::ConfigMissing { .. })
        ));

        let config = TestConfig::new(&[("data", "dir", "/tmp/prices")]);
        assert_eq!(
            load_data_source(&config).unwrap(),
            DataSource::Csv {
                dir: "/tmp/prices".to_string()
            }
        );
    }

    #[test]
    fn data_source_sqlite() {
        let config = TestConfig::new(&[
            ("data", "source", "sqlite"),
            ("sqlite", "path", "prices.db"),
            ("sqlite", "pool_size", "2"),
        ]);
        assert_eq!(
            load_data_source(&config).unwrap(),
            DataSource::Sqlite {
                path: "prices.db".to_string(),
                pool_size: 2
            }
        );

        let config = TestConfig::new(&[("data", "source", "parquet")]);
        assert_eq!(invalid_key(load_data_source(&config).unwrap_err()), "source");
    }

    #[test]
    fn instrument_list() {
        let config = TestConfig::new(&[("benchmark", "instruments", " BHP, CBA ,BHP")]);
        assert_eq!(
            load_instruments(&config).unwrap(),
            Some(vec!["BHP".to_string(), "CBA".to_string()])
        );

        let config = TestConfig::new(&[("benchmark", "instruments", "BHP,,CBA")]);
        assert_eq!(invalid_key(load_instruments(&config).unwrap_err()), "instruments");
    }

    #[test]
    fn validate_benchmark_checks_every_section() {
        let config = TestConfig::new(&[("data", "dir", "d"), ("benchmark", "epsilon", "nan")]);
        assert_eq!(invalid_key(validate_benchmark_config(&config).unwrap_err()), "epsilon");

        let config = TestConfig::new(&[("data", "dir", "d")]);
        assert!(validate_benchmark_config(&config).is_ok());
    }
}
