use std::net;
use std::time::Duration;

use structopt::StructOpt;
use uring_udp::RingConfig;

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "uring-udp-recv", about = "Receive udp datagrams through io-uring")]
pub struct Config {
    /// Local address to bind the receiving socket to.
    pub bind: net::SocketAddrV4,

    /// Submission queue entries of the ring.
    #[structopt(long, default_value = "32")]
    pub entries: u32,

    /// Bytes per receive buffer, longer datagrams are truncated.
    #[structopt(short = "l", long = "buffer", default_value = "2048")]
    pub buffer_bytes: usize,

    /// Number of receives kept in flight.
    #[structopt(long, default_value = "1")]
    pub depth: usize,

    /// Stop after this many datagrams, 0 to run until idle or killed.
    #[structopt(short = "n", long, default_value = "0")]
    pub count: u64,

    /// Stop when no datagram arrived for this many milliseconds.
    #[structopt(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Log every received payload.
    #[structopt(long)]
    pub echo: bool,
}

impl Config {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }

    pub fn ring(&self) -> RingConfig {
        RingConfig {
            entries: self.entries,
            ..RingConfig::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
