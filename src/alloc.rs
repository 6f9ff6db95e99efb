//! The arena's growth hook.
//!
//! The C reference design threads a single `realloc`-shaped callback
//! (`ud, old_ptr, old_size, new_size, file, line`) through the arena and the
//! parser's scratch buffers alike (spec §4.2, §9 "Shared allocator"). In
//! safe Rust the backing store is a `Vec<u8>`, so the callback collapses to
//! "grow this buffer to at least this many bytes" — but we keep it as a
//! trait, the way the teacher keeps `ShmRegion` as the single seam between
//! "a cache" and "how its bytes are obtained" (`src/shm/region.rs`), so a
//! caller can still plug in a different growth strategy (e.g. pre-faulting
//! pages, a pooled allocator) without touching arena logic.
pub trait Allocator: std::fmt::Debug {
    /// Grow `buf` in place to at least `new_len` bytes, zero-filling the
    /// new tail. Mirrors the C callback's `new_size` semantics; there is no
    /// `free` path because `Vec<u8>`'s `Drop` already covers it, and no
    /// `old_ptr = NULL` path because every `Vec` already exists.
    fn grow(&mut self, buf: &mut Vec<u8>, new_len: usize, site: &'static str);
}

/// The default allocator: a plain heap-backed growth via `Vec::resize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn grow(&mut self, buf: &mut Vec<u8>, new_len: usize, site: &'static str) {
        let old_len = buf.len();
        tracing::trace!(old_len, new_len, site, "growing arena buffer");
        buf.resize(new_len, 0);
    }
}
