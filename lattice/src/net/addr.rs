//! Socket addresses as the library sees them: a tagged union of IPv4 and
//! IPv6 endpoints that orders and hashes deterministically and can ride
//! inside messages.

use crate::error::{Error, Result};
use crate::serialize::{deserialize_bytes, serialize_bytes, ByteBuffer, Deserialize, Serialize};
use std::ffi::CString;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};

/// A transport endpoint. Ordering is family first (IPv4 before IPv6), then
/// the raw address bytes, then zone and port, which matches comparing the
/// serialized forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NetAddr {
    V4 { ip: [u8; 4], port: u16 },
    V6 { ip: [u8; 16], zone: u32, port: u16 },
}

const TAG_V4: u8 = 4;
const TAG_V6: u8 = 6;

impl NetAddr {
    /// Resolves a host string. An empty string names this host's primary
    /// address; a dotted-quad or colon-hex literal (with optional `%zone`)
    /// parses directly; anything else goes through DNS.
    pub fn resolve(host: &str, port: u16) -> Result<NetAddr> {
        if host.is_empty() {
            return NetAddr::resolve(&host_name()?, port);
        }

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(NetAddr::V4 {
                ip: ip.octets(),
                port,
            });
        }

        let (literal, zone) = match host.find('%') {
            Some(split) => (&host[..split], Some(&host[split + 1..])),
            None => (host, None),
        };

        if let Ok(ip) = literal.parse::<Ipv6Addr>() {
            let zone = match zone {
                Some(name) => zone_index(name)?,
                None => 0,
            };

            return Ok(NetAddr::V6 {
                ip: ip.octets(),
                zone,
                port,
            });
        }

        let mut candidates = (host, port).to_socket_addrs()?;

        match candidates.next() {
            Some(addr) => Ok(NetAddr::from(addr)),
            None => Err(Error::Io(io::ErrorKind::NotFound)),
        }
    }

    /// The IPv4 wildcard address, for binding.
    #[inline]
    pub fn any_v4(port: u16) -> NetAddr {
        NetAddr::V4 { ip: [0; 4], port }
    }

    /// The IPv6 wildcard address, for binding.
    #[inline]
    pub fn any_v6(port: u16) -> NetAddr {
        NetAddr::V6 {
            ip: [0; 16],
            zone: 0,
            port,
        }
    }

    /// The IPv4 loopback address.
    #[inline]
    pub fn loopback_v4(port: u16) -> NetAddr {
        NetAddr::V4 {
            ip: [127, 0, 0, 1],
            port,
        }
    }

    /// The IPv6 loopback address.
    #[inline]
    pub fn loopback_v6(port: u16) -> NetAddr {
        NetAddr::V6 {
            ip: Ipv6Addr::LOCALHOST.octets(),
            zone: 0,
            port,
        }
    }

    #[inline]
    pub fn port(&self) -> u16 {
        match self {
            NetAddr::V4 { port, .. } => *port,
            NetAddr::V6 { port, .. } => *port,
        }
    }

    #[inline]
    pub fn set_port(&mut self, new_port: u16) {
        match self {
            NetAddr::V4 { port, .. } => *port = new_port,
            NetAddr::V6 { port, .. } => *port = new_port,
        }
    }

    #[inline]
    pub fn is_v4(&self) -> bool {
        matches!(self, NetAddr::V4 { .. })
    }

    #[inline]
    pub fn is_v6(&self) -> bool {
        matches!(self, NetAddr::V6 { .. })
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetAddr::V4 { ip, port } => write!(f, "{}:{}", Ipv4Addr::from(*ip), port),
            NetAddr::V6 { ip, zone, port } => {
                if *zone != 0 {
                    write!(f, "[{}%{}]:{}", Ipv6Addr::from(*ip), zone, port)
                } else {
                    write!(f, "[{}]:{}", Ipv6Addr::from(*ip), port)
                }
            }
        }
    }
}

impl From<SocketAddr> for NetAddr {
    fn from(addr: SocketAddr) -> NetAddr {
        match addr {
            SocketAddr::V4(v4) => NetAddr::V4 {
                ip: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => NetAddr::V6 {
                ip: v6.ip().octets(),
                zone: v6.scope_id(),
                port: v6.port(),
            },
        }
    }
}

impl From<NetAddr> for SocketAddr {
    fn from(addr: NetAddr) -> SocketAddr {
        match addr {
            NetAddr::V4 { ip, port } => SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(ip), port)),
            NetAddr::V6 { ip, zone, port } => {
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(ip), port, 0, zone))
            }
        }
    }
}

impl Serialize for NetAddr {
    fn serialize(&self, buf: &mut ByteBuffer) {
        match self {
            NetAddr::V4 { ip, port } => {
                TAG_V4.serialize(buf);
                serialize_bytes(buf, ip);
                port.serialize(buf);
            }
            NetAddr::V6 { ip, zone, port } => {
                TAG_V6.serialize(buf);
                serialize_bytes(buf, ip);
                zone.serialize(buf);
                port.serialize(buf);
            }
        }
    }
}

impl Deserialize for NetAddr {
    fn deserialize(buf: &[u8], pos: &mut usize) -> Result<Self> {
        match u8::deserialize(buf, pos)? {
            TAG_V4 => {
                let mut ip = [0u8; 4];
                deserialize_bytes(buf, pos, &mut ip)?;
                let port = u16::deserialize(buf, pos)?;
                Ok(NetAddr::V4 { ip, port })
            }
            TAG_V6 => {
                let mut ip = [0u8; 16];
                deserialize_bytes(buf, pos, &mut ip)?;
                let zone = u32::deserialize(buf, pos)?;
                let port = u16::deserialize(buf, pos)?;
                Ok(NetAddr::V6 { ip, zone, port })
            }
            _ => Err(Error::InvalidVariantTag),
        }
    }
}

/// This host's name, for resolving the empty address.
fn host_name() -> Result<String> {
    let mut buf = [0u8; 256];

    if unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) } != 0 {
        return Err(Error::from(io::Error::last_os_error()));
    }

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// A `%zone` suffix: either a numeric scope id or an interface name.
fn zone_index(zone: &str) -> Result<u32> {
    if let Ok(index) = zone.parse::<u32>() {
        return Ok(index);
    }

    let name = CString::new(zone).map_err(|_| Error::Io(io::ErrorKind::InvalidInput))?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };

    if index == 0 {
        return Err(Error::Io(io::ErrorKind::NotFound));
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v4_literal() {
        let addr = NetAddr::resolve("192.168.1.7", 8080).unwrap();

        assert_eq!(
            addr,
            NetAddr::V4 {
                ip: [192, 168, 1, 7],
                port: 8080
            }
        );
        assert!(addr.is_v4());
        assert_eq!(addr.to_string(), "192.168.1.7:8080");
    }

    #[test]
    fn test_parse_v6_literal() {
        let addr = NetAddr::resolve("::1", 443).unwrap();

        match addr {
            NetAddr::V6 { ip, zone, port } => {
                assert_eq!(ip, Ipv6Addr::LOCALHOST.octets());
                assert_eq!(zone, 0);
                assert_eq!(port, 443);
            }
            _ => panic!("expected a v6 address"),
        }

        assert_eq!(addr.to_string(), "[::1]:443");
    }

    #[test]
    fn test_parse_v6_with_numeric_zone() {
        let addr = NetAddr::resolve("fe80::1%3", 9000).unwrap();

        match addr {
            NetAddr::V6 { zone, .. } => assert_eq!(zone, 3),
            _ => panic!("expected a v6 address"),
        }
    }

    #[test]
    fn test_empty_host_resolves_to_something() {
        let addr = NetAddr::resolve("", 1234).unwrap();
        assert_eq!(addr.port(), 1234);
    }

    #[test]
    fn test_localhost_resolves_via_dns() {
        let addr = NetAddr::resolve("localhost", 80).unwrap();
        assert_eq!(addr.port(), 80);
    }

    #[test]
    fn test_family_ordering() {
        let v4 = NetAddr::resolve("255.255.255.255", 1).unwrap();
        let v6 = NetAddr::resolve("::1", 1).unwrap();

        assert!(v4 < v6);
    }

    #[test]
    fn test_byte_ordering_within_family() {
        let low = NetAddr::V4 {
            ip: [10, 0, 0, 1],
            port: 9,
        };
        let high = NetAddr::V4 {
            ip: [10, 0, 0, 2],
            port: 1,
        };

        // Address bytes dominate the port.
        assert!(low < high);

        let same_ip_low_port = NetAddr::V4 {
            ip: [10, 0, 0, 1],
            port: 1,
        };
        assert!(same_ip_low_port < low);
    }

    #[test]
    fn test_socket_addr_conversions() {
        let original = NetAddr::V6 {
            ip: [0; 16],
            zone: 7,
            port: 4242,
        };

        let std_addr: SocketAddr = original.into();
        let back = NetAddr::from(std_addr);

        assert_eq!(back, original);
    }

    #[test]
    fn test_wire_roundtrip() {
        for addr in &[
            NetAddr::V4 {
                ip: [1, 2, 3, 4],
                port: 5,
            },
            NetAddr::V6 {
                ip: [9; 16],
                zone: 2,
                port: 6,
            },
        ] {
            let mut buf = ByteBuffer::new();
            addr.serialize(&mut buf);

            let mut pos = 0;
            let back = NetAddr::deserialize(&buf, &mut pos).unwrap();

            assert_eq!(back, *addr);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn test_wire_bad_tag() {
        let buf = vec![9u8];
        let mut pos = 0;

        assert_eq!(
            NetAddr::deserialize(&buf, &mut pos).unwrap_err(),
            Error::InvalidVariantTag
        );
    }

    #[test]
    fn test_well_known_constructors() {
        assert_eq!(NetAddr::any_v4(80).to_string(), "0.0.0.0:80");
        assert_eq!(NetAddr::loopback_v4(80).to_string(), "127.0.0.1:80");
        assert_eq!(NetAddr::any_v6(81).to_string(), "[::]:81");
        assert_eq!(NetAddr::loopback_v6(81).to_string(), "[::1]:81");
    }

    #[test]
    fn test_port_update() {
        let mut addr = NetAddr::V4 {
            ip: [127, 0, 0, 1],
            port: 0,
        };
        addr.set_port(8080);

        assert_eq!(addr.port(), 8080);
    }
}
