//! Decoding of the sender address filled in by the kernel.
//!
//! The fields of a `sockaddr_in` are stored in network byte order. These helpers are pure and
//! only meaningful on an address slot that a successful receive has populated.
use core::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use byteorder::{ByteOrder, NetworkEndian};

/// The ipv4 address of a sender, in host byte order.
pub fn ip(addr: &libc::sockaddr_in) -> u32 {
    NetworkEndian::read_u32(&addr.sin_addr.s_addr.to_ne_bytes())
}

/// The port of a sender, in host byte order.
pub fn port(addr: &libc::sockaddr_in) -> u16 {
    NetworkEndian::read_u16(&addr.sin_port.to_ne_bytes())
}

/// A decoded sender address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SenderAddr {
    /// The address in host byte order.
    pub ip: u32,
    /// The port in host byte order.
    pub port: u16,
}

impl SenderAddr {
    pub fn from_sockaddr(addr: &libc::sockaddr_in) -> Self {
        SenderAddr {
            ip: ip(addr),
            port: port(addr),
        }
    }

    pub fn to_socket_addr(self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port)
    }
}

impl From<SenderAddr> for SocketAddrV4 {
    fn from(addr: SenderAddr) -> Self {
        addr.to_socket_addr()
    }
}

impl fmt::Display for SenderAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.to_socket_addr(), f)
    }
}
