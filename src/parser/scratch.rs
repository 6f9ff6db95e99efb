//! Fixed-inline-capacity scratch buffers used while a string or a
//! container is being assembled, spilling to the heap only once a
//! document actually needs more (spec §4.3 "Memory discipline for
//! temporary buffers").
//!
//! Grounded on `nf_json_parser.c`'s `CharBuffer`/`LocBuffer`: 128 inline
//! units cover the overwhelming majority of keys, string values and
//! container sizes with zero allocation. On the first element past
//! capacity the inline contents are copied once into a heap buffer grown
//! through the arena's own [`Allocator`] (spec §9 "Shared allocator": the
//! parser reuses the arena's allocator for its scratch buffers, rather than
//! going around it via a bare `Vec::push`), which then grows by doubling.

use crate::alloc::Allocator;
use crate::layout::{read_u32, write_u32};
use crate::loc::Loc;

pub const INLINE_CAPACITY: usize = 128;

/// Assembles a string literal's decoded bytes before interning.
pub struct CharBuffer {
    inline: [u8; INLINE_CAPACITY],
    heap: Vec<u8>,
    len: usize,
    spilled: bool,
}

impl CharBuffer {
    pub fn new() -> Self {
        CharBuffer {
            inline: [0; INLINE_CAPACITY],
            heap: Vec::new(),
            len: 0,
            spilled: false,
        }
    }

    pub fn push(&mut self, value: u8, allocator: &mut dyn Allocator) {
        if !self.spilled && self.len < INLINE_CAPACITY {
            self.inline[self.len] = value;
            self.len += 1;
            return;
        }
        if !self.spilled {
            allocator.grow(&mut self.heap, INLINE_CAPACITY, "scratch char buffer spill");
            self.heap[..INLINE_CAPACITY].copy_from_slice(&self.inline);
            self.spilled = true;
        }
        if self.len >= self.heap.len() {
            let new_len = self.heap.len() * 2;
            allocator.grow(&mut self.heap, new_len, "scratch char buffer growth");
        }
        self.heap[self.len] = value;
        self.len += 1;
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.spilled {
            &self.heap[..self.len]
        } else {
            &self.inline[..self.len]
        }
    }
}

/// Assembles an array's items, or an object's interleaved
/// `(key_loc, value_loc)` pairs, before committing them to the arena in
/// one pass with a correctly-sized block. Spilled storage is a packed byte
/// buffer (4 bytes per `Loc`, little-endian) rather than `Vec<Loc>`, so the
/// spill can grow through the same byte-oriented [`Allocator`] the arena
/// itself uses.
pub struct LocBuffer {
    inline: [Loc; INLINE_CAPACITY],
    heap: Vec<u8>,
    len: usize,
    spilled: bool,
}

const LOC_SIZE: usize = 4;

impl LocBuffer {
    pub fn new() -> Self {
        LocBuffer {
            inline: [Loc::null(); INLINE_CAPACITY],
            heap: Vec::new(),
            len: 0,
            spilled: false,
        }
    }

    pub fn push(&mut self, value: Loc, allocator: &mut dyn Allocator) {
        if !self.spilled && self.len < INLINE_CAPACITY {
            self.inline[self.len] = value;
            self.len += 1;
            return;
        }
        if !self.spilled {
            allocator.grow(&mut self.heap, INLINE_CAPACITY * LOC_SIZE, "scratch loc buffer spill");
            for (i, loc) in self.inline[..self.len].iter().enumerate() {
                write_u32(&mut self.heap, i * LOC_SIZE, loc.raw());
            }
            self.spilled = true;
        }
        if (self.len + 1) * LOC_SIZE > self.heap.len() {
            let new_len = self.heap.len() * 2;
            allocator.grow(&mut self.heap, new_len, "scratch loc buffer growth");
        }
        write_u32(&mut self.heap, self.len * LOC_SIZE, value.raw());
        self.len += 1;
    }

    pub fn get(&self, index: usize) -> Loc {
        if self.spilled {
            Loc::from_raw(read_u32(&self.heap, index * LOC_SIZE))
        } else {
            self.inline[index]
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapAllocator;
    use crate::loc::ValueType;

    #[test]
    fn char_buffer_spills_past_inline_capacity() {
        let mut allocator = HeapAllocator;
        let mut buf = CharBuffer::new();
        for i in 0..(INLINE_CAPACITY + 10) {
            buf.push((i % 256) as u8, &mut allocator);
        }
        assert_eq!(buf.as_slice().len(), INLINE_CAPACITY + 10);
        assert_eq!(buf.as_slice()[0], 0);
        assert_eq!(buf.as_slice()[INLINE_CAPACITY], (INLINE_CAPACITY % 256) as u8);
    }

    #[test]
    fn loc_buffer_spills_past_inline_capacity() {
        let mut allocator = HeapAllocator;
        let mut buf = LocBuffer::new();
        for i in 0..(INLINE_CAPACITY + 10) {
            buf.push(Loc::make(ValueType::Number, i as u32), &mut allocator);
        }
        assert_eq!(buf.len(), INLINE_CAPACITY + 10);
        assert_eq!(buf.get(0).offset(), 0);
        assert_eq!(buf.get(INLINE_CAPACITY).offset(), INLINE_CAPACITY as u32);
    }
}
