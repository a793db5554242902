//! Resource sampling from the Linux `/proc` filesystem

use crate::resources::{ProbeError, ResourceProbe, ResourceSnapshot};
use std::path::{Path, PathBuf};

/// TCP state code for ESTABLISHED in `/proc/net/tcp`
const TCP_ESTABLISHED: &str = "01";

/// Cumulative CPU counters from the aggregate `cpu` line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

/// Reads memory, CPU and TCP connection usage from `/proc`
///
/// CPU usage is the busy share of jiffies since the previous sample; the
/// first sample falls back to the average since boot.
#[derive(Debug)]
pub struct ProcProbe {
    root: PathBuf,
    previous_cpu: Option<CpuTimes>,
}

impl ProcProbe {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Reads from an alternative proc root (used by tests with fixture files)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            previous_cpu: None,
        }
    }

    fn read(&self, relative: &str) -> Result<String, ProbeError> {
        let path = self.root.join(relative);
        std::fs::read_to_string(&path).map_err(|source| ProbeError::Io { path, source })
    }

    fn read_optional(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(relative)).ok()
    }

    fn cpu_percent(&mut self, current: CpuTimes) -> f64 {
        let (idle, total) = match self.previous_cpu {
            Some(prev) if current.total > prev.total => (
                current.idle.saturating_sub(prev.idle),
                current.total - prev.total,
            ),
            _ => (current.idle, current.total),
        };
        self.previous_cpu = Some(current);

        if total == 0 {
            0.0
        } else {
            (total.saturating_sub(idle)) as f64 / total as f64 * 100.0
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for ProcProbe {
    fn sample(&mut self) -> Result<ResourceSnapshot, ProbeError> {
        let memory_percent = parse_meminfo(&self.read("meminfo")?)?;
        let cpu = parse_cpu_times(&self.read("stat")?)?;
        let cpu_percent = self.cpu_percent(cpu);

        // tcp6 is absent when IPv6 is disabled
        let mut active_connections = count_established(&self.read("net/tcp")?);
        if let Some(tcp6) = self.read_optional("net/tcp6") {
            active_connections += count_established(&tcp6);
        }

        Ok(ResourceSnapshot::new(
            memory_percent,
            cpu_percent,
            active_connections,
        ))
    }
}

/// Used memory as a percentage, from `MemTotal` and `MemAvailable`
fn parse_meminfo(content: &str) -> Result<f64, ProbeError> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next().and_then(|v| v.parse::<u64>().ok())) {
            (Some("MemTotal:"), Some(kb)) => total = Some(kb),
            (Some("MemAvailable:"), Some(kb)) => available = Some(kb),
            _ => {}
        }
    }

    match (total, available) {
        (Some(total), Some(available)) if total > 0 => {
            Ok(total.saturating_sub(available) as f64 / total as f64 * 100.0)
        }
        _ => Err(ProbeError::Format("meminfo".to_string())),
    }
}

/// Idle and total jiffies from the aggregate `cpu` line
fn parse_cpu_times(content: &str) -> Result<CpuTimes, ProbeError> {
    let line = content
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| ProbeError::Format("stat".to_string()))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ProbeError::Format("stat".to_string()))?;

    if values.len() < 4 {
        return Err(ProbeError::Format("stat".to_string()));
    }

    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    // guest time is already counted in user/nice
    let total = values.iter().take(8).sum();

    Ok(CpuTimes { idle, total })
}

/// Counts ESTABLISHED sockets in a `/proc/net/tcp`-style table
fn count_established(content: &str) -> usize {
    content
        .lines()
        .skip(1)
        .filter(|line| line.split_whitespace().nth(3) == Some(TCP_ESTABLISHED))
        .count()
}
