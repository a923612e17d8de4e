//! Error types for configuration and report output.
//!
//! The kernels themselves have no failure path. Errors only arise where
//! values come from outside the process (environment variables, CLI flags)
//! or where results are written out.

use thiserror::Error;

/// Invalid runtime or benchmark configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `OMP_SCHEDULE` (or `--schedule`) named a kind we do not know.
    #[error("unknown schedule kind '{0}' (expected static, dynamic, guided or auto)")]
    UnknownScheduleKind(String),

    /// The chunk part of a schedule string is not a non-negative integer.
    #[error("invalid chunk size '{0}' in schedule")]
    InvalidChunk(String),

    /// Thread count was zero or not a number.
    #[error("invalid thread count '{0}' (expected an integer >= 1)")]
    InvalidThreads(String),

    /// `OMP_PROC_BIND` value not recognized.
    #[error("invalid proc-bind value '{0}'")]
    InvalidProcBind(String),

    /// A benchmark parameter failed validation.
    #[error("invalid benchmark parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name as the user spelled it.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure writing benchmark output.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Output file could not be created or written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path (or `<stdout>`).
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Report could not be serialized.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ReportError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ReportError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Any failure of a benchmark run or sweep.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),

    /// The worker team could not be started.
    #[error("failed to start {threads} worker threads: {source}")]
    Spawn {
        threads: usize,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    /// Process exit code: 2 for bad input, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            BenchError::Config(_) => 2,
            BenchError::Report(_) | BenchError::Spawn { .. } => 1,
        }
    }
}

/// Result alias for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_readable_messages() {
        let cases = [
            (
                ConfigError::UnknownScheduleKind("fast".into()),
                "unknown schedule kind 'fast' (expected static, dynamic, guided or auto)",
            ),
            (
                ConfigError::InvalidChunk("x".into()),
                "invalid chunk size 'x' in schedule",
            ),
            (
                ConfigError::InvalidThreads("0".into()),
                "invalid thread count '0' (expected an integer >= 1)",
            ),
            (
                ConfigError::InvalidParameter {
                    name: "reps",
                    reason: "must be >= 1".into(),
                },
                "invalid benchmark parameter reps: must be >= 1",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn report_error_keeps_io_source() {
        let err = ReportError::io(
            "out.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("failed to write out.csv"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn bench_error_exit_codes() {
        let config: BenchError = ConfigError::InvalidThreads("x".into()).into();
        assert_eq!(config.exit_code(), 2);
        assert_eq!(config.to_string(), "invalid thread count 'x' (expected an integer >= 1)");

        let spawn = BenchError::Spawn {
            threads: 4,
            source: std::io::Error::new(std::io::ErrorKind::Other, "no threads"),
        };
        assert_eq!(spawn.exit_code(), 1);
    }
}
