use core::fmt;
use std::io;

use crate::request::RecvRequest;
use crate::tag::Token;

/// The result type of ring operations.
pub type Result<T> = core::result::Result<T, Error>;

/// An errno value.
///
/// Used both for failures of the `io_uring_enter` call itself and for the negated result of a
/// completion. Converts into a `std::io::Error` for much more extensive error information.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

/// The error type of submission and completion.
#[derive(Debug)]
pub enum Error {
    /// There was no room for another request.
    ///
    /// Either the submission queue had no free entry or the number of requests in flight reached
    /// the capacity of the ring. Nothing was submitted.
    Exhausted,

    /// Entering the ring failed for a reason other than a signal interruption.
    ///
    /// This is unrecoverable for the current call. Interrupted waits are retried internally and
    /// never produce this error.
    Queue(Errno),

    /// A receive completed with a negative result.
    ///
    /// The request was retired and its descriptor is handed back so that its buffer can be
    /// reused.
    Failed(Failed),

    /// A completion without a descriptor reported a negative result.
    ///
    /// Raised for a failing no-op or a failing completion whose handle is unknown. The code is
    /// kept for diagnostics.
    Completion(Errno),

    /// The completion belonged to a no-op and never carried data.
    NoPayload,

    /// A bounded wait expired before any completion arrived.
    TimedOut,

    /// The correlation handle is not known to the ring.
    ///
    /// Returned when cancelling a request that already completed or when a completion carries a
    /// handle that was never issued.
    Stale,
}

/// A receive request whose completion reported an error.
#[derive(Debug)]
pub struct Failed {
    /// The handle under which the request was submitted.
    pub token: Token,
    /// The negated completion result.
    pub errno: Errno,
    /// The retired descriptor.
    pub request: Box<RecvRequest>,
}

impl Errno {
    /// Interpret a negative completion result.
    pub fn from_result(result: i32) -> Self {
        debug_assert!(result < 0);
        Errno(-result)
    }

    /// Extract the os error, falling back to `EIO` for synthetic errors.
    pub fn from_io(err: &io::Error) -> Self {
        Errno(err.raw_os_error().unwrap_or(libc::EIO))
    }
}

impl Failed {
    /// Take back the receive buffer.
    pub fn into_buffer(self) -> Vec<u8> {
        self.request.into_buffer()
    }
}

/// Call `op` until it returns something other than an interruption.
pub(crate) fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&io::Error::from_raw_os_error(self.0), f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Exhausted => write!(f, "no free submission slot"),
            Error::Queue(errno) => write!(f, "entering the ring failed: {}", errno),
            Error::Failed(failed) => write!(f, "receive {} failed: {}", failed.token, failed.errno),
            Error::Completion(errno) => write!(f, "completion failed: {}", errno),
            Error::NoPayload => write!(f, "completion carries no payload"),
            Error::TimedOut => write!(f, "wait timed out"),
            Error::Stale => write!(f, "unknown correlation handle"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_calls_are_retried() {
        let mut interrupts = 3;
        let result = retry_interrupted(|| {
            if interrupts > 0 {
                interrupts -= 1;
                Err(io::Error::from_raw_os_error(libc::EINTR))
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(interrupts, 0);
    }

    #[test]
    fn other_errors_surface() {
        let mut calls = 0;
        let result: io::Result<()> = retry_interrupted(|| {
            calls += 1;
            Err(io::Error::from_raw_os_error(libc::EBADF))
        });

        let err = result.unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(Errno::from_io(&err), Errno(libc::EBADF));
    }

    #[test]
    fn negative_results_negate() {
        assert_eq!(Errno::from_result(-libc::ECANCELED), Errno(libc::ECANCELED));
        let io: io::Error = Errno(libc::EAGAIN).into();
        assert_eq!(io.raw_os_error(), Some(libc::EAGAIN));
    }
}
