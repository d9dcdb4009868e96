//! The table of requests in flight.
use crate::tag::{Token, GENERATION_MASK};

/// An arena of pending values indexed by a small integer.
///
/// Each slot carries a generation that is bumped whenever its value is taken out. A `Token` is
/// only valid as long as the slot still has the generation it was issued with, so a completion
/// can never be attributed to a later request that happens to reuse the slot.
pub(crate) struct Slots<T> {
    entries: Vec<Slot<T>>,

    /// All remaining tickets (unused slots).
    free: Vec<u32>,

    /// The number of occupied slots.
    len: usize,

    /// The upper bound on occupied slots.
    capacity: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> Slots<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Slots {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
            capacity,
        }
    }

    /// Store a value, handing it back if the table is full.
    pub(crate) fn insert(&mut self, value: T) -> Result<Token, T> {
        if self.len >= self.capacity {
            return Err(value);
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Slot { generation: 0, value: None });
                index
            },
        };

        let slot = &mut self.entries[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        self.len += 1;

        Ok(Token { index, generation: slot.generation })
    }

    /// Take a value out, retiring the token.
    pub(crate) fn remove(&mut self, token: Token) -> Option<T> {
        let slot = self.entries.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        self.free.push(token.index);
        self.len -= 1;
        Some(value)
    }

    pub(crate) fn contains(&self, token: Token) -> bool {
        match self.entries.get(token.index as usize) {
            Some(slot) => slot.generation == token.generation && slot.value.is_some(),
            None => false,
        }
    }

    /// All currently valid tokens.
    pub(crate) fn tokens(&self) -> impl Iterator<Item=Token> + '_ {
        self.entries.iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Token { index: index as u32, generation: slot.generation })
    }

    /// Forget all values without running their destructors.
    ///
    /// For values whose memory may still be referenced by someone we can no longer wait for.
    pub(crate) fn leak(&mut self) {
        for slot in self.entries.iter_mut() {
            if let Some(value) = slot.value.take() {
                core::mem::forget(value);
            }
        }
        self.entries.clear();
        self.free.clear();
        self.len = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_bumps_generation() {
        let mut slots = Slots::with_capacity(4);
        let first = slots.insert("first").unwrap();
        assert_eq!(slots.remove(first), Some("first"));

        let second = slots.insert("second").unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());

        assert!(!slots.contains(first));
        assert_eq!(slots.remove(first), None);
        assert_eq!(slots.remove(second), Some("second"));
        assert!(slots.is_empty());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut slots = Slots::with_capacity(2);
        let a = slots.insert(1).unwrap();
        let _b = slots.insert(2).unwrap();
        assert_eq!(slots.insert(3), Err(3));

        slots.remove(a);
        assert!(slots.insert(3).is_ok());
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn tokens_list_occupied_slots() {
        let mut slots = Slots::with_capacity(3);
        let a = slots.insert('a').unwrap();
        let b = slots.insert('b').unwrap();
        let c = slots.insert('c').unwrap();
        slots.remove(b);

        let tokens: Vec<_> = slots.tokens().collect();
        assert_eq!(tokens, vec![a, c]);
    }

    #[test]
    fn leak_empties_the_table() {
        let mut slots = Slots::with_capacity(2);
        slots.insert(vec![0u8; 16]).unwrap();
        slots.leak();
        assert!(slots.is_empty());
        assert_eq!(slots.tokens().count(), 0);
    }
}
