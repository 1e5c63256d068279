use crate::collectors::{HostProbe, NetInterface, ProbeError};
use std::net::IpAddr;
use std::path::Path;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

/// [`HostProbe`] backed by `sysinfo` for CPU and memory, `getifaddrs` for
/// interfaces and a `statvfs`-style query for filesystem space.
///
/// Holds no state: every reading starts from a fresh `sysinfo` handle so
/// concurrent snapshots never share refresh buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProbe;

impl SysinfoProbe {
    pub fn new() -> Self {
        Self
    }
}

impl HostProbe for SysinfoProbe {
    fn load_average(&self) -> Result<[f64; 3], ProbeError> {
        let load = System::load_average();
        Ok([load.one, load.five, load.fifteen])
    }

    fn logical_cores(&self) -> Result<usize, ProbeError> {
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        match system.cpus().len() {
            0 => Err(ProbeError::NoCpus),
            n => Ok(n),
        }
    }

    fn available_memory_bytes(&self) -> Result<u64, ProbeError> {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );
        if system.total_memory() == 0 {
            return Err(ProbeError::Unavailable("memory"));
        }
        Ok(system.available_memory())
    }

    fn interfaces(&self) -> Result<Vec<NetInterface>, ProbeError> {
        let out = group_by_interface(enumerate_addresses()?);
        debug!(count = out.len(), "network interfaces enumerated");
        Ok(out)
    }

    fn free_disk_bytes(&self, path: &Path) -> Result<u64, ProbeError> {
        fs2::available_space(path).map_err(|source| ProbeError::Disk {
            path: path.display().to_string(),
            source,
        })
    }
}

/// One `getifaddrs` entry: interface name, loopback flag, address if any.
type AddressEntry = (String, bool, Option<IpAddr>);

#[cfg(unix)]
fn enumerate_addresses() -> Result<Vec<AddressEntry>, ProbeError> {
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags;
    use std::net::{SocketAddrV4, SocketAddrV6};

    let addrs = getifaddrs().map_err(|err| ProbeError::Interfaces(err.to_string()))?;
    Ok(addrs
        .map(|ifa| {
            let ip = ifa.address.as_ref().and_then(|addr| {
                if let Some(v4) = addr.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()))
                } else {
                    addr.as_sockaddr_in6()
                        .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
                }
            });
            let loopback = ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK);
            (ifa.interface_name, loopback, ip)
        })
        .collect())
}

#[cfg(not(unix))]
fn enumerate_addresses() -> Result<Vec<AddressEntry>, ProbeError> {
    let networks = sysinfo::Networks::new_with_refreshed_list();
    let mut out = Vec::new();
    for (name, data) in networks.list() {
        let mut nets: Vec<IpAddr> = data.ip_networks().iter().map(|net| net.addr).collect();
        nets.sort();
        let loopback = !nets.is_empty() && nets.iter().all(|ip| ip.is_loopback());
        for ip in nets {
            out.push((name.clone(), loopback, Some(ip)));
        }
    }
    Ok(out)
}

/// Folds per-address entries into interfaces, keeping the first-seen order of
/// interfaces and the enumeration order of each interface's addresses.
fn group_by_interface(entries: impl IntoIterator<Item = AddressEntry>) -> Vec<NetInterface> {
    let mut out: Vec<NetInterface> = Vec::new();
    for (name, loopback, ip) in entries {
        let idx = match out.iter().position(|iface| iface.name == name) {
            Some(idx) => idx,
            None => {
                out.push(NetInterface {
                    name,
                    loopback,
                    addrs: Vec::new(),
                });
                out.len() - 1
            }
        };
        let iface = &mut out[idx];
        iface.loopback |= loopback;
        if let Some(ip) = ip {
            iface.addrs.push(ip);
        }
    }
    out
}
