use crate::collectors::{HostProbe, NetInterface, ProbeError};
use crate::config::{ConfigError, Thresholds, LOAD_WINDOWS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::debug;

const BYTES_PER_GIGABYTE: f64 = 1_000_000_000.0;

/// Per-call overrides. Unknown keys are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOptions {
    pub cpu_utilization: Option<f64>,
    pub available_memory: Option<f64>,
    pub disk_space: Option<f64>,
    pub interval: Option<u32>,
    pub alias: Option<String>,
}

/// One host reading and its verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu_utilization: f64,
    pub available_memory: f64,
    pub disk_space: f64,
    pub interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<BTreeMap<String, Ipv4Addr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub is_healthy: bool,
}

/// The only failure `get_stats` reports; carries the underlying cause as text.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("не удалось получить состояние хоста: {0}")]
    OperationFailed(String),
}

impl From<ConfigError> for StatsError {
    fn from(err: ConfigError) -> Self {
        Self::OperationFailed(err.to_string())
    }
}

impl From<ProbeError> for StatsError {
    fn from(err: ProbeError) -> Self {
        Self::OperationFailed(err.to_string())
    }
}

impl From<JoinError> for StatsError {
    fn from(err: JoinError) -> Self {
        Self::OperationFailed(format!("запрос свободного места прерван: {err}"))
    }
}

/// Decimal gigabytes (1 GB = 10^9 bytes).
pub fn bytes_to_gigs(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIGABYTE
}

/// Load per logical core. Not clamped: values above 1.0 mean the run queue is
/// longer than the number of cores.
pub fn calculate_cpu_load(load_average: f64, cpus: usize) -> f64 {
    load_average / cpus as f64
}

/// Index into the `[1, 5, 15]` minute load averages.
pub fn convert_interval_to_index(interval: u32) -> Result<usize, ConfigError> {
    LOAD_WINDOWS
        .iter()
        .position(|window| *window == interval)
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "недопустимый интервал {interval}: ожидается 1, 5 или 15"
            ))
        })
}

/// Applies overrides field by field on top of `defaults`.
///
/// Only truthy values win: `0`, `NaN` and a zero interval leave the default in
/// place, so a caller cannot lower a limit to exactly zero.
pub fn set_thresholds(overrides: Option<&StatsOptions>, defaults: Thresholds) -> Thresholds {
    let Some(overrides) = overrides else {
        return defaults;
    };
    Thresholds {
        cpu_utilization: truthy(overrides.cpu_utilization).unwrap_or(defaults.cpu_utilization),
        available_memory: truthy(overrides.available_memory)
            .unwrap_or(defaults.available_memory),
        disk_space: truthy(overrides.disk_space).unwrap_or(defaults.disk_space),
        interval: overrides
            .interval
            .filter(|interval| *interval != 0)
            .unwrap_or(defaults.interval),
    }
}

fn truthy(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}

/// Measured values compared against [`Thresholds`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub cpu_utilization: f64,
    pub available_memory: f64,
    pub disk_space: f64,
}

/// True only when load, memory and disk all stay within their limits.
pub fn system_healthy(readings: &Readings, thresholds: &Thresholds) -> bool {
    readings.cpu_utilization <= thresholds.cpu_utilization
        && readings.available_memory >= thresholds.available_memory
        && readings.disk_space >= thresholds.disk_space
}

/// IPv4 addresses of non-loopback interfaces keyed by interface name. The
/// second and later addresses of one interface become `name.1`, `name.2`, ...
/// in the order the interface reported them.
pub fn build_address_map(interfaces: &[NetInterface]) -> BTreeMap<String, Ipv4Addr> {
    let mut out = BTreeMap::new();
    for iface in interfaces.iter().filter(|iface| !iface.loopback) {
        let external = iface.addrs.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        });
        for (alias, addr) in external.enumerate() {
            let key = if alias == 0 {
                iface.name.clone()
            } else {
                format!("{}.{alias}", iface.name)
            };
            out.insert(key, addr);
        }
    }
    out
}

/// Produces point-in-time host snapshots. Cheap to clone; clones share the
/// probe but nothing mutable.
pub struct HealthSnapshot<P> {
    probe: Arc<P>,
    defaults: Thresholds,
    disk_path: PathBuf,
    expose_addresses: bool,
}

impl<P> Clone for HealthSnapshot<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            defaults: self.defaults,
            disk_path: self.disk_path.clone(),
            expose_addresses: self.expose_addresses,
        }
    }
}

impl<P: HostProbe + 'static> HealthSnapshot<P> {
    /// `disk_path` names the volume whose free space is reported.
    pub fn new(probe: P, defaults: Thresholds, disk_path: impl Into<PathBuf>) -> Self {
        Self {
            probe: Arc::new(probe),
            defaults,
            disk_path: disk_path.into(),
            expose_addresses: false,
        }
    }

    /// Adds the `addresses` map to every snapshot.
    pub fn with_addresses(mut self, expose: bool) -> Self {
        self.expose_addresses = expose;
        self
    }

    /// Resolves thresholds, reads the host and returns a fresh snapshot.
    /// An invalid `interval` fails before any host reading.
    pub async fn get_stats(&self, options: Option<&StatsOptions>) -> Result<Snapshot, StatsError> {
        let thresholds = set_thresholds(options, self.defaults);
        let index = convert_interval_to_index(thresholds.interval)?;

        let load_average = self.probe.load_average()?[index];
        let cores = self.probe.logical_cores()?;
        if cores == 0 {
            return Err(ProbeError::NoCpus.into());
        }
        let cpu_utilization = calculate_cpu_load(load_average, cores);
        let available_memory = bytes_to_gigs(self.probe.available_memory_bytes()?);
        let addresses = if self.expose_addresses {
            Some(build_address_map(&self.probe.interfaces()?))
        } else {
            None
        };

        let probe = Arc::clone(&self.probe);
        let disk_path = self.disk_path.clone();
        let free = tokio::task::spawn_blocking(move || probe.free_disk_bytes(&disk_path)).await??;
        let disk_space = bytes_to_gigs(free);

        let readings = Readings {
            cpu_utilization,
            available_memory,
            disk_space,
        };
        let is_healthy = system_healthy(&readings, &thresholds);
        debug!(
            cpu_utilization,
            available_memory,
            disk_space,
            interval = thresholds.interval,
            is_healthy,
            "host snapshot computed"
        );

        Ok(Snapshot {
            cpu_utilization,
            available_memory,
            disk_space,
            interval: thresholds.interval,
            addresses,
            alias: options.and_then(|o| o.alias.clone()),
            is_healthy,
        })
    }
}
