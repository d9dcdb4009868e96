use std::io;

use io_uring::IoUring;

/// Setup parameters of a ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of submission queue entries, rounded up to a power of two by the kernel.
    pub entries: u32,
    /// Size of the completion queue, twice the submission queue if unset.
    pub cq_entries: Option<u32>,
    /// Let a kernel thread poll the submission queue, idling after this many milliseconds.
    pub sqpoll_idle: Option<u32>,
}

impl RingConfig {
    pub fn build(&self) -> io::Result<IoUring> {
        let mut builder = IoUring::builder();
        if let Some(cq_entries) = self.cq_entries {
            builder.setup_cqsize(cq_entries);
        }
        if let Some(idle) = self.sqpoll_idle {
            builder.setup_sqpoll(idle);
        }
        builder.build(self.entries)
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            entries: 32,
            cq_entries: None,
            sqpoll_idle: None,
        }
    }
}
