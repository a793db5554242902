//! Resource pressure sampling and admission control
//!
//! - `ResourceSnapshot`: one reading of memory, CPU and connection usage
//! - `ResourceProbe`: where readings come from (`ProcProbe` on Linux, fakes in tests)
//! - `ResourceGuard`: turns readings into admit/deny decisions for the scheduler

mod guard;
mod procfs;

pub use guard::{Pressure, ResourceGuard, ResourceLimits};
pub use procfs::ProcProbe;

use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// A point-in-time reading of system resource usage
///
/// Never persisted; a fresh one is taken on every admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub active_connections: usize,
    pub sampled_at: Instant,
}

impl ResourceSnapshot {
    pub fn new(memory_percent: f64, cpu_percent: f64, active_connections: usize) -> Self {
        Self {
            memory_percent,
            cpu_percent,
            active_connections,
            sampled_at: Instant::now(),
        }
    }
}

/// Errors raised while reading resource usage
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unexpected format in {0}")]
    Format(String),
}

/// Source of resource snapshots
///
/// Takes `&mut self` so implementations can keep state between samples,
/// such as the previous CPU counters needed to compute a utilisation delta.
pub trait ResourceProbe: Send {
    fn sample(&mut self) -> Result<ResourceSnapshot, ProbeError>;
}
