//! Synthetic time series for the benchmark suite.
//!
//! A [`Simulator`] walks a fleet of hosts through time, producing one [`Point`] per host and
//! measurement every log interval. [`generate`] serializes those points in one of the
//! [`Format`]s the loaders understand.

use std::path::PathBuf;

use thiserror::Error;

mod generate;
pub mod host;
pub mod point;
pub mod serialize;
pub mod simulator;
pub mod specification;

pub use generate::{GenerateSummary, Interleave, generate};
pub use point::Point;
pub use serialize::Format;
pub use simulator::{Simulator, SimulatorConfig};
pub use specification::{DataSpec, FieldSpec, MeasurementSpec, TagSpec, UseCase};

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read data spec from {path:?}: {source}")]
    ReadSpec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data spec JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid data spec: {0}")]
    InvalidSpec(String),

    #[error("unknown use case {0:?}, expected one of devops, cpu-only, cpu-single")]
    UnknownUseCase(String),

    #[error("unknown format {0:?}, expected one of influx, clickhouse, timescaledb")]
    UnknownFormat(String),

    #[error("timestamp end {end} must be after timestamp start {start}")]
    InvalidTimeRange { start: String, end: String },

    #[error("log interval must be greater than zero")]
    ZeroLogInterval,

    #[error("scale must be at least 1 and initial scale ({initial}) at most scale ({scale})")]
    InvalidScale { initial: u64, scale: u64 },

    #[error("interleaved group id {group_id} must be less than the number of groups {groups}")]
    InvalidInterleave { group_id: u32, groups: u32 },

    #[error("failed to write generated data: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
