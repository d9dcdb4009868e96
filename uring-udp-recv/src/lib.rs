//! A receive loop on top of `uring-udp`.
//!
//! Keeps a configured number of receives in flight on one ring, resubmitting each buffer as soon
//! as its completion was accounted for.
mod score;

pub mod config;
pub use score::Score;

use std::net::UdpSocket;
use std::time::Instant;

use tracing::{info, warn};
use uring_udp::{Error, Ring};

use crate::config::Config;

/// Receive until `config.count` datagrams arrived or the socket was idle for the timeout.
///
/// Failed receives are counted and resubmitted. Any other error ends the run.
pub fn serve(ring: &mut Ring, socket: &UdpSocket, config: &Config) -> Result<Score, Error> {
    let start = Instant::now();
    let mut score = Score::default();

    let depth = config.depth.max(1);
    if depth > ring.capacity() {
        warn!(depth, capacity = ring.capacity(), "depth exceeds the ring, clamping");
    }

    for _ in 0..depth.min(ring.capacity()) {
        ring.submit_recv(socket, vec![0; config.buffer_bytes])?;
    }

    loop {
        let outcome = match config.timeout() {
            Some(timeout) => ring.wait_timeout(timeout),
            None => ring.wait(),
        };

        let buffer = match outcome {
            Ok(received) => {
                score.record(&received);
                if config.echo {
                    info!(
                        from = %received.sender(),
                        len = received.len(),
                        data = ?String::from_utf8_lossy(received.data()),
                        "datagram"
                    );
                }
                received.into_buffer()
            },
            Err(Error::Failed(failed)) => {
                score.failures += 1;
                warn!(token = %failed.token, errno = %failed.errno, "receive failed, resubmitting");
                failed.into_buffer()
            },
            Err(Error::TimedOut) => {
                info!(datagrams = score.datagrams, "socket idle, stopping");
                break;
            },
            Err(err) => return Err(err),
        };

        if config.count != 0 && score.datagrams >= config.count {
            break;
        }

        ring.submit_recv(socket, buffer)?;
    }

    score.elapsed = start.elapsed();
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use structopt::StructOpt;

    #[test]
    fn counts_datagrams() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = socket.local_addr().unwrap();

        let config = Config::from_iter(&[
            "uring-udp-recv", "127.0.0.1:0", "--depth", "2", "-l", "4", "-n", "3",
            "--timeout-ms", "5000",
        ]);
        let mut ring = Ring::with_config(&config.ring()).unwrap();

        for data in [&b"ab"[..], b"cdef", b"ghijkl"].iter() {
            peer.send_to(data, target).unwrap();
        }

        let score = serve(&mut ring, &socket, &config).expect("Serving failed");
        assert_eq!(score.datagrams, 3);
        assert_eq!(score.bytes, 2 + 4 + 4);
        assert_eq!(score.truncated, 1);
        assert_eq!(score.failures, 0);
    }

    #[test]
    fn depth_is_clamped_to_the_ring() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = socket.local_addr().unwrap();

        let config = Config::from_iter(&[
            "uring-udp-recv", "127.0.0.1:0", "--entries", "2", "--depth", "4", "-n", "1",
            "--timeout-ms", "5000",
        ]);
        let mut ring = Ring::with_config(&config.ring()).unwrap();
        assert!(ring.capacity() < config.depth);

        peer.send_to(b"hello", target).unwrap();
        let score = serve(&mut ring, &socket, &config).expect("Serving failed");
        assert_eq!(score.datagrams, 1);
        assert_eq!(score.bytes, 5);
    }

    #[test]
    fn idle_socket_stops() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = Config::from_iter(&["uring-udp-recv", "127.0.0.1:0", "--timeout-ms", "20"]);
        let mut ring = Ring::with_config(&config.ring()).unwrap();

        let score = serve(&mut ring, &socket, &config).expect("Serving failed");
        assert_eq!(score, Score { elapsed: score.elapsed, ..Score::default() });
    }
}
