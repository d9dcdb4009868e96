use core::fmt;
use std::time::Duration;

use uring_udp::Received;

/// The statistics of a receive run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Score {
    /// Number of datagrams that arrived.
    pub datagrams: u64,
    /// Bytes delivered into buffers, after truncation.
    pub bytes: u64,
    /// Datagrams longer than their buffer.
    pub truncated: u64,
    /// Receives that completed with an error.
    pub failures: u64,
    /// Duration from start to the end of the run.
    pub elapsed: Duration,
}

impl Score {
    pub(crate) fn record(&mut self, received: &Received) {
        self.datagrams += 1;
        self.bytes += received.len() as u64;
        if received.truncated() {
            self.truncated += 1;
        }
    }

    fn total_kb(&self) -> u64 {
        self.bytes / 1024
    }

    fn effective_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // In the iperf style:
        //
        // ```text
        // 0.0- 1.0 sec   131 KBytes  1.05 Mbits/sec   91 datagrams
        // ```
        write!(
            f,
            "0.0-{end:.1} sec\t{total} KBytes\t{rate:.0} Byte/sec\t{count} datagrams\t\
            {truncated} truncated\t{failures} failed",
            end = self.elapsed.as_secs_f32(),
            total = self.total_kb(),
            rate = self.effective_rate(),
            count = self.datagrams,
            truncated = self.truncated,
            failures = self.failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let score = Score {
            datagrams: 4,
            bytes: 4096,
            truncated: 1,
            failures: 0,
            elapsed: Duration::from_secs(2),
        };

        assert_eq!(
            score.to_string(),
            "0.0-2.0 sec\t4 KBytes\t2048 Byte/sec\t4 datagrams\t1 truncated\t0 failed",
        );
    }

    #[test]
    fn empty_run_has_no_rate() {
        assert_eq!(Score::default().effective_rate(), 0.0);
    }
}
