//! Tools for exercising the UDP side of the DataChannel bridge: JSON control
//! messages, a datagram sender and a listener that acknowledges commands.

pub mod control;
pub mod listener;
pub mod message;
pub mod payload;
pub mod sender;
pub mod stress;

use anyhow::Context;
use std::net::{SocketAddr, ToSocketAddrs};

/// Resolves an address, preferring IPv4 so `localhost` matches a bridge bound to 127.0.0.1.
pub fn resolve(addr: impl ToSocketAddrs) -> anyhow::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .context("Address did not resolve")
}
