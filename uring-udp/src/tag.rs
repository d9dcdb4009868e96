//! Correlation of completions with their submissions.
//!
//! Every submission is tagged with a `u64` that the kernel echoes back in the completion. The
//! encoding never uses the address of a descriptor. Requests are identified by a [`Token`] into
//! the table of pending requests, everything else carries an explicit internal tag so that the
//! all-zero value stays a perfectly valid request handle.
//!
//! Layout of the encoded value:
//!
//! ```text
//!  63   62 .. 32        31 .. 0
//! +---+--------------+-------------+
//! | 0 | generation   | index       |   request token
//! +---+--------+-----+-------------+
//! | 1 | unused | kind| sequence    |   internal
//! +---+--------+-----+-------------+
//! ```
//!
//! [`Token`]: struct.Token.html
use core::fmt;

const INTERNAL: u64 = 1 << 63;
const KIND_SHIFT: u32 = 32;
const KIND_MASK: u64 = 0xff;
const LOW_MASK: u64 = 0xffff_ffff;

/// The largest generation a token can carry.
pub(crate) const GENERATION_MASK: u32 = 0x7fff_ffff;

/// The correlation handle of a submitted receive.
///
/// Stays unique among all requests in flight. A token whose request was completed is stale and
/// will not match a later request reusing the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// The decoded meaning of a completion's user data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tag {
    /// A receive, tracked in the pending table.
    Request(Token),
    /// A no-op without any attached request.
    Nop,
    /// A timer bounding one wait, identified by its arming sequence.
    Timeout(u32),
    /// The removal of the timer with that sequence.
    TimeoutRemove(u32),
    /// An asynchronous cancellation.
    Cancel,
}

#[derive(Clone, Copy)]
#[repr(u8)]
enum Kind {
    Nop = 0,
    Timeout = 1,
    TimeoutRemove = 2,
    Cancel = 3,
}

impl Token {
    /// The slot index in the table of pending requests.
    pub fn index(self) -> u32 {
        self.index
    }

    /// The generation of the slot at the time of submission.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl Tag {
    pub(crate) fn encode(self) -> u64 {
        let internal = |kind: Kind, seq: u32| {
            INTERNAL | (u64::from(kind as u8) << KIND_SHIFT) | u64::from(seq)
        };

        match self {
            Tag::Request(token) => {
                debug_assert!(token.generation <= GENERATION_MASK);
                (u64::from(token.generation) << 32) | u64::from(token.index)
            },
            Tag::Nop => internal(Kind::Nop, 0),
            Tag::Timeout(seq) => internal(Kind::Timeout, seq),
            Tag::TimeoutRemove(seq) => internal(Kind::TimeoutRemove, seq),
            Tag::Cancel => internal(Kind::Cancel, 0),
        }
    }

    /// Interpret user data, `None` if it was not produced by `encode`.
    pub(crate) fn decode(data: u64) -> Option<Self> {
        let low = (data & LOW_MASK) as u32;

        if data & INTERNAL == 0 {
            return Some(Tag::Request(Token {
                index: low,
                generation: (data >> 32) as u32,
            }));
        }

        if data & !(INTERNAL | (KIND_MASK << KIND_SHIFT) | LOW_MASK) != 0 {
            return None;
        }

        let tag = match ((data >> KIND_SHIFT) & KIND_MASK) as u8 {
            k if k == Kind::Nop as u8 => Tag::Nop,
            k if k == Kind::Timeout as u8 => Tag::Timeout(low),
            k if k == Kind::TimeoutRemove as u8 => Tag::TimeoutRemove(low),
            k if k == Kind::Cancel as u8 => Tag::Cancel,
            _ => return None,
        };

        Some(tag)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_token_is_not_the_nop() {
        let zero = Tag::Request(Token { index: 0, generation: 0 });
        assert_eq!(zero.encode(), 0);
        assert_ne!(Tag::Nop.encode(), 0);
        assert_eq!(Tag::decode(0), Some(zero));
        assert_eq!(Tag::decode(Tag::Nop.encode()), Some(Tag::Nop));
    }

    #[test]
    fn tags_survive_the_kernel() {
        let tags = [
            Tag::Request(Token { index: 17, generation: GENERATION_MASK }),
            Tag::Request(Token { index: u32::MAX, generation: 3 }),
            Tag::Timeout(9),
            Tag::TimeoutRemove(u32::MAX),
            Tag::Cancel,
        ];

        for &tag in tags.iter() {
            assert_eq!(Tag::decode(tag.encode()), Some(tag));
        }
    }

    #[test]
    fn foreign_user_data() {
        assert_eq!(Tag::decode(INTERNAL | (0x42 << KIND_SHIFT)), None);
        assert_eq!(Tag::decode(u64::MAX), None);
    }
}
