//! String interning: deduplicated, NUL-terminated string storage with an
//! adaptive 16-bit/32-bit open-addressed hash table (spec §3.4, §4.1).
//!
//! Grounded on `nf_string_table.c` from the original `nflibs` C sources: the
//! Lua string hash, the linear-probe insert/lookup loop, the 50% fill-rate
//! cap, and the 16-to-32-bit slot-width transition are all carried over
//! unchanged. What differs is representation: the C version overlays a
//! `struct nfst_StringTable` header directly on a caller-managed byte
//! buffer so the whole thing can be `realloc`'d and `memmove`'d as one
//! blob. Here the header is ordinary Rust fields and the hash slots/string
//! bytes are two separately-owned `Vec<u8>`s sized to an explicit budget —
//! `grow`/`pack` resize those budgets rather than moving a shared buffer.
//! The externally observable contract (symbols are stable, `""` is always
//! symbol 0, `FULL` on overflow) is identical.

const HASH_FACTOR: f64 = 2.0;

/// Conceptual header overhead accounted for in the sizing formulas below,
/// mirroring `sizeof(struct nfst_StringTable)` in the C original (five
/// `int`/`u32` fields) even though this port keeps those fields as plain
/// Rust struct members rather than packed bytes.
const HEADER_OVERHEAD: u32 = 20;

/// Minimum total byte budget `init` will accept: header, one hash slot,
/// and room for the empty string's terminator.
const MIN_SIZE: u32 = HEADER_OVERHEAD + 2 + 1;

/// Returned by lookup/insert operations when the table cannot satisfy the
/// request without growing first (spec §4.1: "every mutating call that
/// might not fit returns `FULL` rather than aborting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

pub struct StringTable {
    count: u32,
    uses_16_bit_slots: bool,
    num_hash_slots: u32,
    string_bytes: u32,
    hash_slots: Vec<u8>,
    strings: Vec<u8>,
}

impl Clone for StringTable {
    fn clone(&self) -> Self {
        StringTable {
            count: self.count,
            uses_16_bit_slots: self.uses_16_bit_slots,
            num_hash_slots: self.num_hash_slots,
            string_bytes: self.string_bytes,
            hash_slots: self.hash_slots.clone(),
            strings: self.strings.clone(),
        }
    }
}

impl std::fmt::Debug for StringTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringTable")
            .field("count", &self.count)
            .field("uses_16_bit_slots", &self.uses_16_bit_slots)
            .field("num_hash_slots", &self.num_hash_slots)
            .field("string_bytes", &self.string_bytes)
            .finish()
    }
}

impl StringTable {
    /// Initialise a fresh table with a total byte budget of `bytes` split
    /// between hash slots and string storage, sized for strings whose
    /// average length is `avg_strlen`.
    pub fn init(bytes: u32, avg_strlen: u32) -> Result<Self, crate::ConfigError> {
        if bytes < MIN_SIZE {
            return Err(crate::ConfigError::BufferTooSmall {
                min: MIN_SIZE,
                got: bytes,
            });
        }

        let bytes_per_string = avg_strlen as f64 + 1.0 + 2.0 * HASH_FACTOR;
        let num_strings = (bytes - HEADER_OVERHEAD) as f64 / bytes_per_string;
        let num_hash_slots = ((num_strings * HASH_FACTOR) as u32).max(1);

        let uses_16_bit_slots = projected_fits_in_16_bit_region(bytes, num_hash_slots);
        let slot_width = if uses_16_bit_slots { 2 } else { 4 };
        let hash_slots = vec![0u8; num_hash_slots as usize * slot_width];

        let string_capacity = bytes.saturating_sub(HEADER_OVERHEAD + hash_slots.len() as u32);
        let mut strings = vec![0u8; string_capacity.max(1) as usize];
        strings[0] = 0; // "" lives at offset 0 and is always symbol 0

        tracing::trace!(num_hash_slots, uses_16_bit_slots, "string table initialized");

        Ok(StringTable {
            count: 0,
            uses_16_bit_slots,
            num_hash_slots,
            string_bytes: 1,
            hash_slots,
            strings,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn uses_16_bit_slots(&self) -> bool {
        self.uses_16_bit_slots
    }

    /// Current byte budget, header included — the value a caller would
    /// realloc to before calling [`StringTable::grow`].
    pub fn allocated_bytes(&self) -> u32 {
        HEADER_OVERHEAD + self.hash_slots.len() as u32 + self.strings.len() as u32
    }

    /// Intern `s`, inserting it if not already present. `""` always maps to
    /// symbol `0`. Returns [`Full`] if the table cannot hold the new entry
    /// without exceeding the 50% fill cap, running out of string-block
    /// room, or (in 16-bit mode) producing an offset that no longer fits
    /// in 16 bits.
    pub fn to_symbol(&mut self, s: &str) -> Result<u32, Full> {
        if s.is_empty() {
            return Ok(0);
        }

        let bytes = s.as_bytes();
        let hash = lua_hash(bytes);
        let mut i = (hash % self.num_hash_slots) as usize;

        loop {
            let slot = self.get_slot(i);
            if slot == 0 {
                break;
            }
            if self.string_at(slot) == s {
                return Ok(slot);
            }
            i = (i + 1) % self.num_hash_slots as usize;
        }

        if self.count + 1 >= self.num_hash_slots {
            return Err(Full);
        }
        if (self.num_hash_slots as f64) / ((self.count + 1) as f64) < HASH_FACTOR {
            return Err(Full);
        }

        let needed = bytes.len() as u32 + 1;
        if self.string_bytes + needed > self.strings.len() as u32 {
            return Err(Full);
        }

        let symbol = self.string_bytes;
        if self.uses_16_bit_slots && symbol > 64 * 1024 {
            return Err(Full);
        }

        let dest = symbol as usize;
        self.strings[dest..dest + bytes.len()].copy_from_slice(bytes);
        self.strings[dest + bytes.len()] = 0;
        self.string_bytes += needed;
        self.set_slot(i, symbol);
        self.count += 1;

        Ok(symbol)
    }

    /// As [`StringTable::to_symbol`], but never inserts.
    pub fn to_symbol_const(&self, s: &str) -> Option<u32> {
        if s.is_empty() {
            return Some(0);
        }

        let bytes = s.as_bytes();
        let hash = lua_hash(bytes);
        let mut i = (hash % self.num_hash_slots) as usize;

        loop {
            let slot = self.get_slot(i);
            if slot == 0 {
                return None;
            }
            if self.string_at(slot) == s {
                return Some(slot);
            }
            i = (i + 1) % self.num_hash_slots as usize;
        }
    }

    /// Dereference `symbol`. Undefined behavior (here: may panic or return
    /// garbage) if `symbol` was not returned by `to_symbol`/`to_symbol_const`
    /// on this table.
    pub fn to_string(&self, symbol: u32) -> &str {
        self.string_at(symbol)
    }

    fn string_at(&self, symbol: u32) -> &str {
        let start = symbol as usize;
        let end = self.strings[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|n| start + n)
            .unwrap_or(self.strings.len());
        std::str::from_utf8(&self.strings[start..end]).expect("interned strings are UTF-8")
    }

    /// Grow to a new overall byte budget (the caller has already decided
    /// `new_bytes >= allocated_bytes()`), recomputing slot count/width and
    /// rebuilding the hash table from the string block.
    pub fn grow(&mut self, new_bytes: u32) {
        debug_assert!(new_bytes >= self.allocated_bytes());

        let avg_strlen = if self.count > 0 {
            self.string_bytes as f64 / self.count as f64
        } else {
            15.0
        };
        let bytes_per_string = avg_strlen + 1.0 + 2.0 * HASH_FACTOR;
        let num_strings = (new_bytes - HEADER_OVERHEAD) as f64 / bytes_per_string;
        let new_num_slots = ((num_strings * HASH_FACTOR) as u32).max(self.num_hash_slots);

        let uses_16_bit_slots = projected_fits_in_16_bit_region(new_bytes, new_num_slots);
        let slot_width = if uses_16_bit_slots { 2 } else { 4 };

        let new_string_capacity =
            new_bytes.saturating_sub(HEADER_OVERHEAD + new_num_slots * slot_width as u32);

        let old_len = self.allocated_bytes();
        self.num_hash_slots = new_num_slots;
        self.uses_16_bit_slots = uses_16_bit_slots;
        self.hash_slots = vec![0u8; new_num_slots as usize * slot_width];
        self.strings.resize(new_string_capacity as usize, 0);

        self.rebuild_hash_table();
        tracing::trace!(
            old_len,
            new_len = new_bytes,
            num_hash_slots = new_num_slots,
            uses_16_bit_slots,
            "string table grown"
        );
    }

    /// Shrink to the minimum budget that still holds the current content.
    /// Returns the new `allocated_bytes()`.
    pub fn pack(&mut self) -> u32 {
        let mut num_hash_slots = ((self.count as f64 * HASH_FACTOR) as u32).max(1);
        if num_hash_slots < self.count + 1 {
            num_hash_slots = self.count + 1;
        }
        let uses_16_bit_slots = self.string_bytes <= 64 * 1024;
        let slot_width = if uses_16_bit_slots { 2 } else { 4 };

        self.num_hash_slots = num_hash_slots;
        self.uses_16_bit_slots = uses_16_bit_slots;
        self.hash_slots = vec![0u8; num_hash_slots as usize * slot_width];
        self.strings.truncate(self.string_bytes as usize);

        self.rebuild_hash_table();
        self.allocated_bytes()
    }

    fn rebuild_hash_table(&mut self) {
        for b in self.hash_slots.iter_mut() {
            *b = 0;
        }

        let mut offset = 1u32; // skip the empty string at 0
        while offset < self.string_bytes {
            let s = self.string_at(offset);
            let len = s.len() as u32;
            let hash = lua_hash(s.as_bytes());
            let mut i = (hash % self.num_hash_slots) as usize;
            while self.get_slot(i) != 0 {
                i = (i + 1) % self.num_hash_slots as usize;
            }
            self.set_slot(i, offset);
            offset += len + 1;
        }
    }

    fn slot_width(&self) -> usize {
        if self.uses_16_bit_slots {
            2
        } else {
            4
        }
    }

    fn get_slot(&self, i: usize) -> u32 {
        let w = self.slot_width();
        let o = i * w;
        if self.uses_16_bit_slots {
            u16::from_le_bytes(self.hash_slots[o..o + 2].try_into().unwrap()) as u32
        } else {
            u32::from_le_bytes(self.hash_slots[o..o + 4].try_into().unwrap())
        }
    }

    fn set_slot(&mut self, i: usize, value: u32) {
        let w = self.slot_width();
        let o = i * w;
        if self.uses_16_bit_slots {
            self.hash_slots[o..o + 2].copy_from_slice(&(value as u16).to_le_bytes());
        } else {
            self.hash_slots[o..o + 4].copy_from_slice(&value.to_le_bytes());
        }
    }
}

/// The hash function borrowed from Lua (spec §3.4): walk the bytes once,
/// folding each one into a rolling xor/shift. Good enough since we need to
/// walk the whole string anyway to find its length.
fn lua_hash(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in bytes {
        h ^= (h << 5).wrapping_add(h >> 2).wrapping_add(b as u32);
    }
    h
}

fn projected_fits_in_16_bit_region(total_bytes: u32, num_hash_slots: u32) -> bool {
    let bytes_for_strings_32 =
        total_bytes as i64 - HEADER_OVERHEAD as i64 - (num_hash_slots as i64) * 4;
    bytes_for_strings_32 <= 64 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_string_is_symbol_zero() {
        let mut st = StringTable::init(1024, 10).unwrap();
        assert_eq!(st.to_symbol("").unwrap(), 0);
        assert_eq!(st.to_string(0), "");
    }

    #[test]
    fn interning_is_stable_and_deduped() {
        let mut st = StringTable::init(1024, 10).unwrap();
        let a1 = st.to_symbol("niklas").unwrap();
        let b1 = st.to_symbol("frykholm").unwrap();
        let a2 = st.to_symbol("niklas").unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b1);
        assert_eq!(st.to_string(a1), "niklas");
        assert_eq!(st.to_string(b1), "frykholm");
    }

    #[test]
    fn const_lookup_never_inserts() {
        let mut st = StringTable::init(1024, 10).unwrap();
        let sym = st.to_symbol("niklas").unwrap();
        assert_eq!(st.to_symbol_const("niklas"), Some(sym));
        assert_eq!(st.to_symbol_const("missing"), None);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut st = StringTable::init(MIN_SIZE, 4).unwrap();
        assert_eq!(st.to_symbol("0123456789012345678901234567890"), Err(Full));

        let mut symbols = Vec::new();
        for i in 0..2000 {
            let s = i.to_string();
            loop {
                match st.to_symbol(&s) {
                    Ok(sym) => {
                        symbols.push((s.clone(), sym));
                        break;
                    }
                    Err(Full) => {
                        let new_size = st.allocated_bytes() * 2;
                        st.grow(new_size);
                    }
                }
            }
        }

        for (s, sym) in &symbols {
            assert_eq!(st.to_string(*sym), s.as_str());
        }
    }

    #[test]
    fn pack_shrinks_and_preserves_symbols() {
        let mut st = StringTable::init(1 << 16, 4).unwrap();
        let mut symbols = Vec::new();
        for i in 0..50 {
            let s = format!("item-{i}");
            symbols.push((s.clone(), st.to_symbol(&s).unwrap()));
        }
        st.pack();
        for (s, sym) in &symbols {
            assert_eq!(st.to_string(*sym), s.as_str());
        }
    }

    #[test]
    fn widens_slots_past_64kib_string_region() {
        // A large average string length pushes the projected string region
        // past 64 KiB, forcing 32-bit hash slots even at init time.
        let st = StringTable::init(1 << 20, 10_000).unwrap();
        assert!(!st.uses_16_bit_slots());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: if cfg!(miri) { 4 } else { 64 },
            .. ProptestConfig::default()
        })]

        #[test]
        fn interning_is_stable_under_growth(strings in proptest::collection::vec("[a-z]{0,12}", 0..200)) {
            let mut st = StringTable::init(MIN_SIZE, 4).unwrap();
            let mut symbols = Vec::new();
            for s in &strings {
                let sym = loop {
                    match st.to_symbol(s) {
                        Ok(sym) => break sym,
                        Err(Full) => {
                            let new_size = st.allocated_bytes() * 2;
                            st.grow(new_size);
                        }
                    }
                };
                symbols.push(sym);
            }

            for (s, sym) in strings.iter().zip(&symbols) {
                prop_assert_eq!(st.to_string(*sym), s.as_str());
            }
            for (s, sym) in strings.iter().zip(&symbols) {
                prop_assert_eq!(st.to_symbol_const(s), Some(*sym));
            }
        }
    }
}
