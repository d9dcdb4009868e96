//! Receive udp datagrams through a single io-uring.
//!
//! The caller owns an already bound datagram socket and a [`Ring`]. Each call to
//! [`Ring::submit_recv`] enqueues one `recvmsg` into a caller supplied buffer and returns a
//! [`Token`] for it. The wait methods block until a completion arrives, match it back to its
//! request through that token and return the byte count together with the buffer and the sender
//! address.
//!
//! ```no_run
//! use std::net::UdpSocket;
//! use uring_udp::Ring;
//!
//! let socket = UdpSocket::bind("127.0.0.1:0")?;
//! let mut ring = Ring::new(8)?;
//!
//! ring.submit_recv(&socket, vec![0; 2048])?;
//! let received = ring.wait()?;
//! println!("{} bytes from {}", received.len(), received.sender());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Errors
//!
//! Signals interrupting a wait are retried internally. Everything else is reported to the
//! caller: a failing `io_uring_enter` as [`Error::Queue`], a receive with a negative result as
//! [`Error::Failed`] (handing back its buffer), and the completion of a no-op as
//! [`Error::NoPayload`], which is never confused with a numeric result.
//!
//! [`Ring`]: struct.Ring.html
//! [`Ring::submit_recv`]: struct.Ring.html#method.submit_recv
//! [`Token`]: struct.Token.html
//! [`Error::Queue`]: enum.Error.html#variant.Queue
//! [`Error::Failed`]: enum.Error.html#variant.Failed
//! [`Error::NoPayload`]: enum.Error.html#variant.NoPayload
#![warn(missing_debug_implementations)]

pub mod addr;
mod config;
mod error;
mod request;
mod ring;
mod slots;
mod tag;

pub use addr::SenderAddr;
pub use config::RingConfig;
pub use error::{Errno, Error, Failed, Result};
pub use request::{RecvRequest, Received};
pub use ring::Ring;
pub use tag::Token;
