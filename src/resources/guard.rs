use crate::config::ResourceSettings;
use crate::resources::{ProbeError, ResourceProbe, ResourceSnapshot};
use std::fmt;
use tracing::{debug, warn};

/// Thresholds at or above which admission is refused
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub max_memory_percent: f64,
    pub max_cpu_percent: f64,
    pub max_connections: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from(&ResourceSettings::default())
    }
}

impl From<&ResourceSettings> for ResourceLimits {
    fn from(settings: &ResourceSettings) -> Self {
        Self {
            max_memory_percent: settings.max_memory_percent,
            max_cpu_percent: settings.max_cpu_percent,
            max_connections: settings.max_connections,
        }
    }
}

/// The limit that caused admission to be refused
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pressure {
    Memory { percent: f64, limit: f64 },
    Cpu { percent: f64, limit: f64 },
    Connections { count: usize, limit: usize },
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory { percent, limit } => {
                write!(f, "memory at {percent:.1}% (limit {limit:.1}%)")
            }
            Self::Cpu { percent, limit } => write!(f, "CPU at {percent:.1}% (limit {limit:.1}%)"),
            Self::Connections { count, limit } => {
                write!(f, "{count} open connections (limit {limit})")
            }
        }
    }
}

/// Answers "is it safe to start another fetch right now?"
///
/// One guard is built per run and owned by the scheduler, which is the only
/// caller, so the probe needs no synchronisation.
pub struct ResourceGuard {
    limits: ResourceLimits,
    probe: Box<dyn ResourceProbe>,
    last: Option<ResourceSnapshot>,
}

impl ResourceGuard {
    pub fn new(limits: ResourceLimits, probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            limits,
            probe,
            last: None,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// The most recent successful sample
    pub fn last_snapshot(&self) -> Option<&ResourceSnapshot> {
        self.last.as_ref()
    }

    /// Reads current resource usage
    pub fn sample(&mut self) -> Result<ResourceSnapshot, ProbeError> {
        let snapshot = self.probe.sample()?;
        self.last = Some(snapshot);
        Ok(snapshot)
    }

    /// Returns the limit `snapshot` violates, if any
    ///
    /// `pending` is the number of fetches already in flight. Each of them
    /// holds a connection, so it is a lower bound on the connection count
    /// even when the probe cannot see them.
    pub fn pressure(&self, snapshot: &ResourceSnapshot, pending: usize) -> Option<Pressure> {
        if snapshot.memory_percent >= self.limits.max_memory_percent {
            return Some(Pressure::Memory {
                percent: snapshot.memory_percent,
                limit: self.limits.max_memory_percent,
            });
        }

        if snapshot.cpu_percent >= self.limits.max_cpu_percent {
            return Some(Pressure::Cpu {
                percent: snapshot.cpu_percent,
                limit: self.limits.max_cpu_percent,
            });
        }

        let connections = snapshot.active_connections.max(pending);
        if connections >= self.limits.max_connections {
            return Some(Pressure::Connections {
                count: connections,
                limit: self.limits.max_connections,
            });
        }

        None
    }

    /// Decides whether one more fetch may start given `pending` in flight
    ///
    /// Fails open: if sampling itself breaks, admission is granted and the
    /// problem is logged, so missing telemetry never stalls a run.
    pub fn admit(&mut self, pending: usize) -> bool {
        match self.sample() {
            Ok(snapshot) => match self.pressure(&snapshot, pending) {
                Some(pressure) => {
                    debug!(%pressure, pending, "Admission denied");
                    false
                }
                None => true,
            },
            Err(e) => {
                warn!(error = %e, "Resource sampling failed; admitting anyway");
                true
            }
        }
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("limits", &self.limits)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
