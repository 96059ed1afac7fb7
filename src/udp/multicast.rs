//! Multicast target resolution and group membership.

use crate::error::{RelayError, Result};
use log::warn;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// Parse the `ip:port` path parameter of a request into a multicast group.
pub fn parse_target(target: &str) -> Result<SocketAddrV4> {
    let invalid = |reason: &str| RelayError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let addr: SocketAddrV4 = target
        .trim()
        .parse()
        .map_err(|_| invalid("expected an IPv4 `ip:port` pair"))?;
    if !addr.ip().is_multicast() {
        return Err(invalid("not a multicast address"));
    }
    if addr.port() == 0 {
        return Err(invalid("port must not be zero"));
    }
    Ok(addr)
}

/// Find the IPv4 address of the interface called `name`.
///
/// An IPv4 literal is accepted as is, which also allows `0.0.0.0` to let the
/// kernel pick the interface.
pub fn resolve_interface(name: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = name.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| RelayError::InterfaceLookup(e.to_string()))?;
    interfaces
        .into_iter()
        .find_map(|(ifname, ip)| match ip {
            IpAddr::V4(v4) if ifname == name => Some(v4),
            _ => None,
        })
        .ok_or_else(|| RelayError::InterfaceNotFound(name.to_string()))
}

/// Open a socket that receives the datagrams of `group` on `interface`.
///
/// Must be called from within a tokio runtime.
pub fn join_multicast(group: SocketAddrV4, interface: Ipv4Addr) -> Result<UdpSocket> {
    open_socket(group, interface).map_err(|source| RelayError::Join {
        target: group.to_string(),
        source,
    })
}

fn open_socket(group: SocketAddrV4, interface: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // binding to the group keeps unrelated unicast traffic on the port out
    #[cfg(unix)]
    let bind_ip = *group.ip();
    #[cfg(not(unix))]
    let bind_ip = Ipv4Addr::UNSPECIFIED;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(bind_ip, group.port())).into())?;

    socket.join_multicast_v4(group.ip(), &interface)?;
    socket.set_multicast_loop_v4(false)?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        warn!("failed to set receive buffer size on {}: {}", group, e);
    }
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("239.1.1.1:5004").unwrap(),
            SocketAddrV4::new(Ipv4Addr::new(239, 1, 1, 1), 5004)
        );
    }

    #[test]
    fn test_parse_target_rejects_malformed() {
        for bad in ["", "239.1.1.1", "239.1.1.1:abc", "host:5004", "[ff02::1]:5004"] {
            assert!(
                matches!(parse_target(bad), Err(RelayError::InvalidTarget { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_parse_target_rejects_unicast_and_port_zero() {
        assert!(matches!(
            parse_target("192.168.1.10:5004"),
            Err(RelayError::InvalidTarget { .. })
        ));
        assert!(matches!(
            parse_target("239.1.1.1:0"),
            Err(RelayError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_resolve_interface_literal() {
        assert_eq!(resolve_interface("0.0.0.0").unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            resolve_interface("10.0.0.7").unwrap(),
            Ipv4Addr::new(10, 0, 0, 7)
        );
    }

    #[test]
    fn test_resolve_interface_missing() {
        assert!(matches!(
            resolve_interface("no-such-if0"),
            Err(RelayError::InterfaceNotFound(_)) | Err(RelayError::InterfaceLookup(_))
        ));
    }
}
