//! # Schedule Model
//!
//! A schedule is a `(kind, chunk)` pair in the shape used by the
//! `OMP_SCHEDULE` environment variable: `kind[,chunk]`.
//!
//! ## Chunk Semantics
//!
//! | Kind    | `chunk == 0` (runtime default)       | `chunk == k`                         |
//! |---------|--------------------------------------|--------------------------------------|
//! | static  | one balanced block per worker        | k-sized chunks dealt round-robin     |
//! | dynamic | 1                                    | next k iterations from shared cursor |
//! | guided  | minimum 1                            | `max(ceil(remaining / T), k)`        |
//! | auto    | balanced blocks (chunk ignored)      | balanced blocks (chunk ignored)      |
//!
//! `auto` delegates the choice to the runtime. This runtime resolves it to
//! static balanced blocks, which is what the GNU OpenMP runtime does.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling policy family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Static,
    Dynamic,
    Guided,
    Auto,
}

impl ScheduleKind {
    /// All kinds, in reporting order.
    pub const ALL: [ScheduleKind; 4] = [
        ScheduleKind::Static,
        ScheduleKind::Dynamic,
        ScheduleKind::Guided,
        ScheduleKind::Auto,
    ];

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::Static => "static",
            ScheduleKind::Dynamic => "dynamic",
            ScheduleKind::Guided => "guided",
            ScheduleKind::Auto => "auto",
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let trimmed = s.trim();
        // OpenMP 4.5 ordering modifiers carry no meaning for this runtime.
        let bare = trimmed
            .split_once(':')
            .map(|(modifier, kind)| match modifier.trim().to_ascii_lowercase().as_str() {
                "monotonic" | "nonmonotonic" => kind,
                _ => trimmed,
            })
            .unwrap_or(trimmed);

        match bare.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(ScheduleKind::Static),
            "dynamic" => Ok(ScheduleKind::Dynamic),
            "guided" => Ok(ScheduleKind::Guided),
            "auto" => Ok(ScheduleKind::Auto),
            _ => Err(ConfigError::UnknownScheduleKind(trimmed.to_string())),
        }
    }
}

/// Schedule kind plus chunk size.
///
/// `chunk == 0` means "use the kind's default", mirroring how
/// `omp_get_schedule` reports an unset chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schedule {
    pub kind: ScheduleKind,
    pub chunk: usize,
}

impl Schedule {
    pub const fn new(kind: ScheduleKind, chunk: usize) -> Self {
        Self { kind, chunk }
    }

    /// Static balanced blocks, one per worker.
    pub const fn static_blocks() -> Self {
        Self::new(ScheduleKind::Static, 0)
    }

    /// Static round-robin of fixed-size chunks.
    pub const fn fixed_chunk(chunk: usize) -> Self {
        Self::new(ScheduleKind::Static, chunk)
    }

    pub const fn dynamic(chunk: usize) -> Self {
        Self::new(ScheduleKind::Dynamic, chunk)
    }

    pub const fn guided(chunk: usize) -> Self {
        Self::new(ScheduleKind::Guided, chunk)
    }

    pub const fn auto() -> Self {
        Self::new(ScheduleKind::Auto, 0)
    }

    /// Chunk size the runtime actually uses for claiming work.
    ///
    /// Zero only for static block partitioning, where there is no chunk.
    pub const fn effective_chunk(&self) -> usize {
        match self.kind {
            ScheduleKind::Static => self.chunk,
            ScheduleKind::Dynamic | ScheduleKind::Guided => {
                if self.chunk == 0 {
                    1
                } else {
                    self.chunk
                }
            }
            ScheduleKind::Auto => 0,
        }
    }
}

impl Default for Schedule {
    /// `dynamic,1`, the GNU OpenMP default run-sched-var.
    fn default() -> Self {
        Self::dynamic(1)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chunk == 0 {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{},{}", self.kind, self.chunk)
        }
    }
}

impl FromStr for Schedule {
    type Err = ConfigError;

    /// Parses `kind[,chunk]`.
    fn from_str(s: &str) -> ConfigResult<Self> {
        let (kind, chunk) = match s.split_once(',') {
            Some((kind, chunk)) => {
                let chunk = chunk.trim();
                let chunk = chunk
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidChunk(chunk.to_string()))?;
                (kind, chunk)
            }
            None => (s, 0),
        };
        Ok(Schedule::new(kind.parse()?, chunk))
    }
}
