//! A udp receiver
//!
//! Binds a socket to the given address and receives datagrams through io-uring until the
//! configured count was reached or the socket was idle for the timeout. Prints iperf-like
//! statistics at the end. Call example:
//!
//! * `uring-udp-recv 127.0.0.1:5001 --depth 8 -l 1470 --timeout-ms 1000`
use std::net::UdpSocket;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uring_udp::Ring;
use uring_udp_recv::config::Config;

fn main() -> Result<()> {
    let config = Config::from_args();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let socket = UdpSocket::bind(config.bind)
        .with_context(|| format!("Couldn't bind {}", config.bind))?;
    let mut ring = Ring::with_config(&config.ring())
        .context("Failed to initiate io uring")?;

    info!(local = %socket.local_addr()?, depth = config.depth, "receiving");

    let score = uring_udp_recv::serve(&mut ring, &socket, &config)?;

    println!("[+] Done\n");
    println!("{}", score);
    Ok(())
}
