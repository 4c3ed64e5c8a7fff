//! mDNS advertisement so the dashboard answers at `<hostname>.local`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceInfo};

const SERVICE_TYPE: &str = "_http._tcp.local.";
const INSTANCE_NAME: &str = "Naphome Status Server";

/// Handle for an active mDNS advertisement.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

/// Advertise the dashboard under `hostname`. `None` when mDNS is unavailable.
pub fn spawn_mdns_advertiser(
    hostname: &str,
    board_name: &str,
    http_bind: SocketAddr,
) -> Option<MdnsAdvertiser> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "mdns: daemon start failed");
            return None;
        }
    };
    let host = mdns_host(hostname);
    let ip = if http_bind.ip().is_unspecified() {
        local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    } else {
        http_bind.ip()
    };
    let properties: HashMap<String, String> = [
        ("board".to_string(), board_name.to_string()),
        ("path".to_string(), "/".to_string()),
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ]
    .into_iter()
    .collect();
    let info = match ServiceInfo::new(
        SERVICE_TYPE,
        INSTANCE_NAME,
        &host,
        ip,
        http_bind.port(),
        properties,
    ) {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(error = %e, "mdns: bad service info");
            return None;
        }
    };
    let fullname = info.get_fullname().to_string();
    if let Err(e) = daemon.register(info) {
        tracing::warn!(error = %e, "mdns: register failed");
        return None;
    }
    tracing::info!(
        host = %host,
        http_addr = %SocketAddr::new(ip, http_bind.port()),
        "mdns: advertised dashboard"
    );
    Some(MdnsAdvertiser { daemon, fullname })
}

impl MdnsAdvertiser {
    /// Unregister and shut the daemon down.
    pub fn shutdown(&self) {
        if let Ok(rx) = self.daemon.unregister(&self.fullname) {
            let _ = rx.recv_timeout(Duration::from_secs(1));
        }
        if let Ok(rx) = self.daemon.shutdown() {
            let _ = rx.recv_timeout(Duration::from_secs(1));
        }
    }
}

/// `nap` → `nap.local.`; an empty name falls back to the machine hostname.
fn mdns_host(hostname: &str) -> String {
    let base = hostname.trim().trim_end_matches('.');
    let base = if base.is_empty() {
        gethostname::gethostname().to_string_lossy().to_string()
    } else {
        base.to_string()
    };
    if base.ends_with(".local") {
        format!("{base}.")
    } else {
        format!("{base}.local.")
    }
}

/// Best-effort outward-facing address.
fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    if socket.connect("8.8.8.8:80").is_err() && socket.connect("1.1.1.1:80").is_err() {
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_gain_local_suffix_once() {
        assert_eq!(mdns_host("nap"), "nap.local.");
        assert_eq!(mdns_host("nap.local"), "nap.local.");
        assert_eq!(mdns_host("nap.local."), "nap.local.");
        assert!(mdns_host("  ").ends_with(".local."));
    }
}
