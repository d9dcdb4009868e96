use core::fmt;
use core::time::Duration;
use std::io;
use std::os::unix::io::AsRawFd;

use io_uring::{opcode, squeue, types, IoUring};
use tracing::{debug, trace, warn};

use crate::config::RingConfig;
use crate::error::{retry_interrupted, Errno, Error, Failed, Result};
use crate::request::{RecvRequest, Received};
use crate::slots::Slots;
use crate::tag::{Tag, Token};

/// A single io-uring used to receive datagrams.
///
/// Owns the submission and completion queue pair and every request descriptor that is in flight.
/// Operations take `&mut self`; the ring is meant to be driven by one thread that alternates
/// between submitting and waiting.
///
/// Completions are matched to their request through the [`Token`] returned on submission and may
/// arrive in any order when more than one request is outstanding.
///
/// [`Token`]: struct.Token.html
pub struct Ring {
    /// The ring which we use for the socket.
    io_ring: IoUring,
    /// Descriptors of all receives in flight.
    pending: Slots<Box<RecvRequest>>,
    /// No-ops, timers and cancellations whose completion was not yet consumed.
    internal: usize,
    /// Completion queue room reserved for those, beyond the receives.
    internal_capacity: usize,
    /// The timespec of the last armed timer, read by the kernel on submission.
    timer: Box<types::Timespec>,
    /// Sequence of the last armed timer.
    timer_seq: u32,
}

impl Ring {
    pub fn new(entries: u32) -> io::Result<Self> {
        let config = RingConfig { entries, ..RingConfig::default() };
        Ring::with_config(&config)
    }

    pub fn with_config(config: &RingConfig) -> io::Result<Self> {
        Ok(Ring::from_ring(config.build()?))
    }

    /// Adopt an already configured ring.
    ///
    /// At most as many receives as the submission queue has entries may be in flight at once.
    /// No-ops, timers and cancellations share the rest of the completion queue, so completions
    /// never overflow. A completion queue no larger than the submission queue still admits one
    /// internal operation; its overflow then relies on the kernel's `IORING_FEAT_NODROP`.
    pub fn from_ring(io_ring: IoUring) -> Self {
        let capacity = io_ring.params().sq_entries() as usize;
        let cq_entries = io_ring.params().cq_entries() as usize;
        Ring {
            io_ring,
            pending: Slots::with_capacity(capacity),
            internal: 0,
            internal_capacity: cq_entries.saturating_sub(capacity).max(1),
            timer: Box::new(types::Timespec::new()),
            timer_seq: 0,
        }
    }

    /// Enqueue one receive into `buffer` and hand it to the kernel.
    ///
    /// The buffer's length bounds the datagram, longer ones are truncated. Until the matching
    /// completion was returned by one of the wait methods the ring owns the buffer.
    ///
    /// Fails with `Exhausted` when there is no room for another request, in which case the buffer
    /// is dropped. A `Queue` error means the entry could not be flushed yet; it stays queued and
    /// goes out with the next submission or wait.
    pub fn submit_recv(&mut self, socket: &impl AsRawFd, buffer: Vec<u8>) -> Result<Token> {
        if self.pending.len() >= self.pending.capacity() || self.submission_full() {
            return Err(Error::Exhausted);
        }

        let fd = socket.as_raw_fd();
        let mut request = RecvRequest::new(buffer);
        // The box keeps the header in place when moved into the table.
        let hdr = request.msghdr();
        let token = self.pending.insert(request)
            .map_err(|_| Error::Exhausted)?;

        let entry = opcode::RecvMsg::new(types::Fd(fd), hdr)
            .build()
            .user_data(Tag::Request(token).encode());

        if let Err(err) = self.push(&entry) {
            self.pending.remove(token);
            return Err(err);
        }

        trace!(%token, fd, "submitted recvmsg");
        self.flush()?;
        Ok(token)
    }

    /// Enqueue an operation without any payload.
    ///
    /// Its completion is reported as `Error::NoPayload`.
    pub fn submit_nop(&mut self) -> Result<()> {
        let entry = opcode::Nop::new()
            .build()
            .user_data(Tag::Nop.encode());
        self.push_internal(&entry)?;
        trace!("submitted nop");
        self.flush()
    }

    /// Ask the kernel to abort a pending receive.
    ///
    /// The request still completes through a wait, with `ECANCELED` or with data if it finished
    /// before the cancellation took effect.
    pub fn cancel(&mut self, token: Token) -> Result<()> {
        if !self.pending.contains(token) {
            return Err(Error::Stale);
        }

        let entry = opcode::AsyncCancel::new(Tag::Request(token).encode())
            .build()
            .user_data(Tag::Cancel.encode());
        self.push_internal(&entry)?;
        debug!(%token, "cancelling");
        self.flush()
    }

    /// Block until one receive or no-op completes.
    ///
    /// Waits interrupted by a signal are retried. Exactly one completion visible to the caller is
    /// consumed per call.
    pub fn wait(&mut self) -> Result<Received> {
        match self.complete(None, true) {
            Some(result) => result,
            None => unreachable!("blocking wait returned without completion"),
        }
    }

    /// Decode a completion if one is ready, without blocking.
    pub fn try_wait(&mut self) -> Option<Result<Received>> {
        self.complete(None, false)
    }

    /// Like `wait`, but give up with `Error::TimedOut` after `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Received> {
        if let Some(ready) = self.try_wait() {
            return ready;
        }

        let seq = self.arm_timer(timeout)?;
        let result = match self.complete(Some(seq), true) {
            Some(result) => result,
            None => unreachable!("blocking wait returned without completion"),
        };

        if !matches!(result, Err(Error::TimedOut)) {
            self.disarm_timer(seq);
        }

        result
    }

    /// The number of receives in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// The maximum number of receives in flight.
    pub fn capacity(&self) -> usize {
        self.pending.capacity()
    }

    /// Whether the receive has not yet been returned by a wait.
    pub fn is_pending(&self, token: Token) -> bool {
        self.pending.contains(token)
    }

    /// Pop completions until one is meant for the caller.
    ///
    /// Each popped entry advances the completion head exactly once, when the queue view is
    /// dropped at the end of the statement.
    fn complete(&mut self, armed: Option<u32>, block: bool) -> Option<Result<Received>> {
        loop {
            let entry = self.io_ring.completion().next();

            let entry = match entry {
                Some(entry) => entry,
                None if !block => return None,
                None => {
                    if let Err(err) = retry_interrupted(|| self.io_ring.submit_and_wait(1)) {
                        return Some(Err(Error::Queue(Errno::from_io(&err))));
                    }
                    continue;
                },
            };

            if let Some(result) = self.decode(entry.user_data(), entry.result(), armed) {
                return Some(result);
            }
        }
    }

    /// Interpret one completion, `None` if it was internal bookkeeping.
    ///
    /// A negative result is checked before the correlation handle, so its code is never lost
    /// behind a missing descriptor.
    fn decode(&mut self, user_data: u64, result: i32, armed: Option<u32>) -> Option<Result<Received>> {
        let tag = Tag::decode(user_data);

        match tag {
            Some(Tag::Nop) | Some(Tag::Timeout(_)) | Some(Tag::TimeoutRemove(_)) | Some(Tag::Cancel) => {
                self.internal = self.internal.saturating_sub(1);
            },
            _ => {},
        }

        match tag {
            Some(Tag::Timeout(seq)) if armed == Some(seq) => {
                trace!(seq, result, "wait timed out");
                return Some(Err(Error::TimedOut));
            },
            Some(Tag::Timeout(_)) | Some(Tag::TimeoutRemove(_)) | Some(Tag::Cancel) => {
                debug!(?tag, result, "internal completion");
                return None;
            },
            _ => {},
        }

        let request = match tag {
            Some(Tag::Request(token)) => self.pending.remove(token).map(|request| (token, request)),
            _ => None,
        };

        if result < 0 {
            let errno = Errno::from_result(result);
            return Some(Err(match request {
                Some((token, request)) => {
                    warn!(%token, %errno, "recvmsg failed");
                    Error::Failed(Failed { token, errno, request })
                },
                None => {
                    warn!(user_data, %errno, "completion failed");
                    Error::Completion(errno)
                },
            }));
        }

        match (tag, request) {
            (_, Some((token, request))) => {
                trace!(%token, len = result, "recvmsg completed");
                Some(Ok(Received {
                    token,
                    len: result as usize,
                    request,
                }))
            },
            (Some(Tag::Nop), None) => {
                trace!(result, "nop completed");
                Some(Err(Error::NoPayload))
            },
            (_, None) => {
                warn!(user_data, result, "completion for unknown request");
                Some(Err(Error::Stale))
            },
        }
    }

    fn arm_timer(&mut self, timeout: Duration) -> Result<u32> {
        self.timer_seq = self.timer_seq.wrapping_add(1);
        let seq = self.timer_seq;

        *self.timer = types::Timespec::new()
            .sec(timeout.as_secs())
            .nsec(timeout.subsec_nanos());

        let entry = opcode::Timeout::new(&*self.timer)
            .build()
            .user_data(Tag::Timeout(seq).encode());
        self.push_internal(&entry)?;
        self.flush()?;
        Ok(seq)
    }

    /// Remove a timer that did not fire.
    ///
    /// If this fails the timer fires later and its completion is skipped by some other wait.
    fn disarm_timer(&mut self, seq: u32) {
        let entry = opcode::TimeoutRemove::new(Tag::Timeout(seq).encode())
            .build()
            .user_data(Tag::TimeoutRemove(seq).encode());

        let result = self.push_internal(&entry).and_then(|()| self.flush());
        match result {
            Ok(()) => debug!(seq, "disarmed timer"),
            Err(err) => debug!(seq, %err, "could not disarm timer"),
        }
    }

    /// Push an operation whose completion is not tracked in the table of receives.
    fn push_internal(&mut self, entry: &squeue::Entry) -> Result<()> {
        if self.internal >= self.internal_capacity {
            return Err(Error::Exhausted);
        }
        self.push(entry)?;
        self.internal += 1;
        Ok(())
    }

    fn submission_full(&mut self) -> bool {
        self.io_ring.submission().is_full()
    }

    fn push(&mut self, entry: &squeue::Entry) -> Result<()> {
        let mut submission = self.io_ring.submission();
        // SAFETY: all memory referenced by our entries lives in boxes owned by `self` until the
        // matching completion is consumed.
        match unsafe { submission.push(entry) } {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::Exhausted),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match retry_interrupted(|| self.io_ring.submit()) {
            Ok(_) => Ok(()),
            Err(err) => Err(Error::Queue(Errno::from_io(&err))),
        }
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Ring")
            .field("in_flight", &self.pending.len())
            .field("capacity", &self.pending.capacity())
            .finish()
    }
}

impl Drop for Ring {
    /// The kernel may still write into pending descriptors, so they are cancelled and reaped
    /// before the table frees them. If that is impossible they are leaked instead.
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        // Free completion queue room for the cancellations.
        while self.try_wait().is_some() {}

        let tokens: Vec<Token> = self.pending.tokens().collect();
        for token in tokens {
            if let Err(err) = self.cancel(token) {
                warn!(%token, %err, "leaking receives that can not be cancelled");
                self.pending.leak();
                return;
            }
        }

        while !self.pending.is_empty() {
            if let Some(Err(Error::Queue(errno))) = self.complete(None, true) {
                warn!(%errno, "leaking receives that can not be reaped");
                self.pending.leak();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_ring() -> Ring {
        Ring::new(2).expect("Failed to initiate io uring")
    }

    #[test]
    fn failing_nop_keeps_its_code() {
        let mut ring = create_ring();
        match ring.decode(Tag::Nop.encode(), -libc::EINVAL, None) {
            Some(Err(Error::Completion(errno))) => assert_eq!(errno, Errno(libc::EINVAL)),
            other => panic!("Expected failed completion, got {:?}", other),
        }
        match ring.decode(Tag::Nop.encode(), 0, None) {
            Some(Err(Error::NoPayload)) => {},
            other => panic!("Expected no payload, got {:?}", other),
        }
    }

    #[test]
    fn failing_unknown_request_keeps_its_code() {
        let mut ring = create_ring();
        let unknown = Tag::Request(Token { index: 5, generation: 0 }).encode();
        match ring.decode(unknown, -libc::EBADF, None) {
            Some(Err(Error::Completion(errno))) => assert_eq!(errno, Errno(libc::EBADF)),
            other => panic!("Expected failed completion, got {:?}", other),
        }
        match ring.decode(unknown, 3, None) {
            Some(Err(Error::Stale)) => {},
            other => panic!("Expected stale handle, got {:?}", other),
        }
    }

    #[test]
    fn stale_timers_are_skipped() {
        let mut ring = create_ring();
        assert!(ring.decode(Tag::Timeout(1).encode(), -libc::ETIME, Some(2)).is_none());
        match ring.decode(Tag::Timeout(2).encode(), -libc::ETIME, Some(2)) {
            Some(Err(Error::TimedOut)) => {},
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn nops_are_bounded_by_the_completion_queue() {
        let mut ring = create_ring();
        let room = ring.io_ring.params().cq_entries() as usize - ring.capacity();
        assert_eq!(ring.internal_capacity, room);

        for _ in 0..room {
            ring.submit_nop().expect("Submission failed");
        }
        match ring.submit_nop() {
            Err(Error::Exhausted) => {},
            other => panic!("Expected exhaustion, got {:?}", other),
        }

        for _ in 0..room {
            match ring.wait() {
                Err(Error::NoPayload) => {},
                other => panic!("Expected no payload, got {:?}", other),
            }
        }
        assert_eq!(ring.internal, 0);
        ring.submit_nop().expect("Submission failed");
    }

    #[test]
    fn ring_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<Ring>();
    }
}
