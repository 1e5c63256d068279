pub mod system;

use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

pub use system::SysinfoProbe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub loopback: bool,
    /// Addresses in the order the OS enumerated them.
    pub addrs: Vec<IpAddr>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("не удалось получить свободное место для {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },
    #[error("ОС не сообщила ни одного логического ядра CPU")]
    NoCpus,
    #[error("показатель {0} недоступен")]
    Unavailable(&'static str),
    #[error("не удалось перечислить сетевые интерфейсы: {0}")]
    Interfaces(String),
}

/// Raw host readings.
///
/// All methods are blocking. `free_disk_bytes` may touch the filesystem and is
/// expected to be driven from a blocking-capable thread.
pub trait HostProbe: Send + Sync {
    /// Load averages for the 1, 5 and 15 minute windows, in that order.
    fn load_average(&self) -> Result<[f64; 3], ProbeError>;

    fn logical_cores(&self) -> Result<usize, ProbeError>;

    fn available_memory_bytes(&self) -> Result<u64, ProbeError>;

    /// Interfaces in discovery order.
    fn interfaces(&self) -> Result<Vec<NetInterface>, ProbeError>;

    fn free_disk_bytes(&self, path: &Path) -> Result<u64, ProbeError>;
}
