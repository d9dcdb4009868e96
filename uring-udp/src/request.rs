use core::{fmt, mem, ptr};
use std::net::SocketAddrV4;

use crate::addr::SenderAddr;
use crate::tag::Token;

/// The descriptor of a single receive.
///
/// Bundles the buffer with the single-element io vector pointing into it, the slot for the sender
/// address and the message header tying them together. The kernel writes into all of these
/// asynchronously, so a descriptor is always boxed and owned by the ring while in flight. It must
/// not move before its completion was observed.
pub struct RecvRequest {
    buffer: Vec<u8>,
    io_vec: libc::iovec,
    sender: libc::sockaddr_in,
    io_hdr: libc::msghdr,
}

/// A successfully completed receive.
#[derive(Debug)]
pub struct Received {
    pub(crate) token: Token,
    pub(crate) len: usize,
    pub(crate) request: Box<RecvRequest>,
}

// SAFETY: the raw pointers only point into the descriptor's own fields and its owned buffer, the
// same as a `Vec`. There is no shared mutable state reachable through `&RecvRequest`.
unsafe impl Send for RecvRequest {}
unsafe impl Sync for RecvRequest {}

impl RecvRequest {
    /// Wrap a buffer. Its length, not its capacity, bounds the receive.
    pub(crate) fn new(buffer: Vec<u8>) -> Box<Self> {
        let mut request = Box::new(RecvRequest {
            buffer,
            io_vec: libc::iovec {
                iov_base: ptr::null_mut(),
                iov_len: 0,
            },
            // SAFETY: this is a valid initialization for a sockaddr_in
            sender: unsafe { mem::zeroed() },
            // SAFETY: this is a valid initialization for a msghdr
            io_hdr: unsafe { mem::zeroed() },
        });
        request.prepare();
        request
    }

    /// Point the header at our own fields.
    ///
    /// Must be called again whenever the descriptor itself moved.
    fn prepare(&mut self) {
        self.io_vec = libc::iovec {
            iov_base: self.buffer.as_mut_ptr() as *mut libc::c_void,
            iov_len: self.buffer.len(),
        };

        self.io_hdr.msg_iov = &mut self.io_vec;
        self.io_hdr.msg_iovlen = 1;
        self.io_hdr.msg_name = &mut self.sender as *mut libc::sockaddr_in as *mut libc::c_void;
        self.io_hdr.msg_namelen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        self.io_hdr.msg_control = ptr::null_mut();
        self.io_hdr.msg_controllen = 0;
        self.io_hdr.msg_flags = 0;
    }

    pub(crate) fn msghdr(&mut self) -> *mut libc::msghdr {
        &mut self.io_hdr
    }

    /// The number of bytes a receive can deliver.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The raw address slot.
    pub fn sockaddr(&self) -> &libc::sockaddr_in {
        &self.sender
    }

    /// Decode the sender, without checking that the kernel filled in an ipv4 address.
    pub fn sender(&self) -> SenderAddr {
        SenderAddr::from_sockaddr(&self.sender)
    }

    /// Decode the sender if the kernel reported an ipv4 address.
    pub fn sender_checked(&self) -> Option<SocketAddrV4> {
        let family_ok = i32::from(self.sender.sin_family) == libc::AF_INET;
        let len_ok = self.io_hdr.msg_namelen as usize == mem::size_of::<libc::sockaddr_in>();
        if family_ok && len_ok {
            Some(self.sender().to_socket_addr())
        } else {
            None
        }
    }

    /// Whether the datagram was longer than the buffer.
    pub fn truncated(&self) -> bool {
        self.io_hdr.msg_flags & libc::MSG_TRUNC != 0
    }

    pub fn into_buffer(self: Box<Self>) -> Vec<u8> {
        let this = *self;
        this.buffer
    }
}

impl Received {
    /// The handle returned when the receive was submitted.
    pub fn token(&self) -> Token {
        self.token
    }

    /// The number of bytes received, at most the buffer capacity.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The received bytes.
    pub fn data(&self) -> &[u8] {
        &self.request.buffer()[..self.len]
    }

    pub fn sender(&self) -> SenderAddr {
        self.request.sender()
    }

    pub fn truncated(&self) -> bool {
        self.request.truncated()
    }

    pub fn request(&self) -> &RecvRequest {
        &self.request
    }

    /// Take back the buffer, e.g. to submit it again.
    pub fn into_buffer(self) -> Vec<u8> {
        self.request.into_buffer()
    }
}

impl fmt::Debug for RecvRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RecvRequest")
            .field("capacity", &self.capacity())
            .field("sender", &self.sender())
            .field("flags", &self.io_hdr.msg_flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_points_into_descriptor() {
        let mut request = RecvRequest::new(vec![0; 64]);
        let buffer = request.buffer.as_ptr();
        let hdr = request.msghdr();

        // SAFETY: the header was just prepared and the box is alive.
        unsafe {
            assert_eq!((*hdr).msg_iovlen, 1);
            let iov = &*(*hdr).msg_iov;
            assert_eq!(iov.iov_base as *const u8, buffer);
            assert_eq!(iov.iov_len, 64);
            assert_eq!((*hdr).msg_name as *const libc::sockaddr_in, request.sockaddr() as *const _);
        }

        assert_eq!(request.capacity(), 64);
        assert!(!request.truncated());
        assert_eq!(request.sender_checked(), None);
    }

    #[test]
    fn buffer_comes_back() {
        let request = RecvRequest::new(vec![7; 4]);
        assert_eq!(request.into_buffer(), vec![7; 4]);
    }
}
