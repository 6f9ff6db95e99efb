//! `ConfigData`: the relocatable arena that owns a document tree plus its
//! string table (spec §3.3, §4.2).
//!
//! Grounded on the teacher's `shm::ShmCache`: one owning handle
//! (`src/shm/mod.rs`) wraps a growable backing store and a set of
//! `unsafe`-but-narrowly-scoped helpers (`ht_base`, `slab_base`, ...) that
//! turn header fields into byte offsets. The same shape recurs here —
//! `data`/`data_used` stand in for the teacher's mmap'd slab, and
//! `find_tail_block`/`locate` stand in for `ht_base`/`slab_base` — but
//! nothing is `unsafe`: offsets index a safe `Vec<u8>` instead of a raw
//! pointer into shared memory, because this arena never needs to be read
//! by a process that doesn't go through this crate's API.

use crate::alloc::{Allocator, HeapAllocator};
use crate::error::ConfigError;
use crate::layout::{read_f64, read_u32, write_f64, write_u32, BlockHeader};
use crate::layout::{ARRAY_SLOT_SIZE, BLOCK_HEADER_SIZE, OBJECT_SLOT_SIZE};
use crate::loc::{Loc, ValueType};
use crate::string_table::StringTable;

const DEFAULT_SECTION_SIZE: u32 = 8 * 1024;

pub struct ConfigData {
    data: Vec<u8>,
    data_used: u32,
    string_table: StringTable,
    root: Loc,
    allocator: Box<dyn Allocator>,
}

impl std::fmt::Debug for ConfigData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigData")
            .field("data_used", &self.data_used)
            .field("data_capacity", &self.data.len())
            .field("root", &self.root)
            .field("string_table", &self.string_table)
            .finish()
    }
}

impl Default for ConfigData {
    fn default() -> Self {
        ConfigData::new(0, 0)
    }
}

impl ConfigData {
    /// Create an arena with the default 8 KiB data section and 8 KiB
    /// string table, growing the heap on demand (spec §3.5).
    pub fn new(config_size: u32, string_table_size: u32) -> Self {
        ConfigData::with_allocator(Box::new(HeapAllocator), config_size, string_table_size)
            .expect("default/explicit sizes satisfy the string table minimum")
    }

    /// Create an arena whose growth goes through a caller-supplied
    /// [`Allocator`] instead of the default heap-backed one.
    pub fn with_allocator(
        mut allocator: Box<dyn Allocator>,
        config_size: u32,
        string_table_size: u32,
    ) -> Result<Self, ConfigError> {
        let config_size = if config_size == 0 {
            DEFAULT_SECTION_SIZE
        } else {
            config_size
        };
        let string_table_size = if string_table_size == 0 {
            DEFAULT_SECTION_SIZE
        } else {
            string_table_size
        };

        let string_table = StringTable::init(string_table_size, 15)?;

        let mut data = Vec::new();
        allocator.grow(&mut data, config_size as usize, "nfcd_make");

        Ok(ConfigData {
            data,
            data_used: 0,
            string_table,
            root: Loc::null(),
            allocator,
        })
    }

    /// Duplicate this arena into a fresh, independent one. Stands in for
    /// the C design's "memcpy the whole buffer" relocation guarantee
    /// (spec §5, §8 invariant 8): the copy shares no state with the
    /// original and answers every query identically. The allocator itself
    /// is not duplicated — spec §5 notes the copy "may or may not wish to
    /// reuse" it — so the clone always gets a fresh [`HeapAllocator`].
    pub fn clone_arena(&self) -> ConfigData {
        ConfigData {
            data: self.data.clone(),
            data_used: self.data_used,
            string_table: self.string_table.clone(),
            root: self.root,
            allocator: Box::new(HeapAllocator),
        }
    }

    pub fn allocator_mut(&mut self) -> &mut dyn Allocator {
        self.allocator.as_mut()
    }

    // -- root / type / scalar access -----------------------------------

    pub fn root(&self) -> Loc {
        self.root
    }

    pub fn set_root(&mut self, loc: Loc) {
        self.root = loc;
    }

    pub fn type_of(&self, loc: Loc) -> ValueType {
        loc.value_type()
    }

    /// UB (here: a panic via slice indexing, or a bogus read) if
    /// `loc`'s type is not `Number`.
    pub fn to_number(&self, loc: Loc) -> f64 {
        debug_assert_eq!(loc.value_type(), ValueType::Number, "to_number on non-number Loc");
        read_f64(&self.data, loc.offset() as usize)
    }

    /// UB (here: a panic via slice indexing, or a bogus read) if
    /// `loc`'s type is not `String`.
    pub fn to_string(&self, loc: Loc) -> &str {
        debug_assert_eq!(loc.value_type(), ValueType::String, "to_string on non-string Loc");
        self.string_table.to_string(loc.offset())
    }

    // -- scalar construction --------------------------------------------

    pub fn add_number(&mut self, n: f64) -> Loc {
        self.ensure_data_capacity(8);
        let offset = self.data_used;
        write_f64(&mut self.data, offset as usize, n);
        self.data_used += 8;
        Loc::make(ValueType::Number, offset)
    }

    pub fn add_string(&mut self, s: &str) -> Loc {
        loop {
            match self.string_table.to_symbol(s) {
                Ok(sym) => return Loc::make(ValueType::String, sym),
                Err(_full) => {
                    let new_size = self.string_table.allocated_bytes() * 2;
                    tracing::trace!(new_size, "growing string table to intern a new string");
                    self.string_table.grow(new_size);
                }
            }
        }
    }

    // -- containers -------------------------------------------------------

    pub fn add_array(&mut self, capacity: u32) -> Loc {
        self.alloc_block(ValueType::Array, capacity, ARRAY_SLOT_SIZE)
    }

    pub fn add_object(&mut self, capacity: u32) -> Loc {
        self.alloc_block(ValueType::Object, capacity, OBJECT_SLOT_SIZE)
    }

    pub fn array_size(&self, arr: Loc) -> u32 {
        self.chain_size(arr.offset())
    }

    pub fn array_item(&self, arr: Loc, index: u32) -> Loc {
        match self.locate(arr.offset(), index) {
            Some((block_offset, idx)) => {
                let slot_off = block_offset + BLOCK_HEADER_SIZE + idx * ARRAY_SLOT_SIZE;
                Loc::from_raw(read_u32(&self.data, slot_off as usize))
            }
            None => Loc::null(),
        }
    }

    pub fn object_size(&self, obj: Loc) -> u32 {
        self.chain_size(obj.offset())
    }

    pub fn object_keyloc(&self, obj: Loc, index: u32) -> Loc {
        match self.locate(obj.offset(), index) {
            Some((block_offset, idx)) => {
                let slot_off = block_offset + BLOCK_HEADER_SIZE + idx * OBJECT_SLOT_SIZE;
                Loc::from_raw(read_u32(&self.data, slot_off as usize))
            }
            None => Loc::null(),
        }
    }

    pub fn object_key(&self, obj: Loc, index: u32) -> Option<&str> {
        let key = self.object_keyloc(obj, index);
        if key.is_none() {
            None
        } else {
            Some(self.to_string(key))
        }
    }

    pub fn object_value(&self, obj: Loc, index: u32) -> Loc {
        match self.locate(obj.offset(), index) {
            Some((block_offset, idx)) => {
                let slot_off = block_offset + BLOCK_HEADER_SIZE + idx * OBJECT_SLOT_SIZE + 4;
                Loc::from_raw(read_u32(&self.data, slot_off as usize))
            }
            None => Loc::null(),
        }
    }

    /// Look up `key` among `obj`'s members. Short-circuits via the
    /// const (non-inserting) symbol lookup: a key that was never interned
    /// in this arena returns `null()` without scanning the chain (spec §9
    /// Open Question 3 — an intentional optimisation, not a bug).
    pub fn object_lookup(&self, obj: Loc, key: &str) -> Loc {
        let Some(sym) = self.string_table.to_symbol_const(key) else {
            return Loc::null();
        };
        let key_loc = Loc::make(ValueType::String, sym);

        let mut cur = obj.offset();
        loop {
            let h = BlockHeader::read(&self.data, cur);
            for idx in 0..h.size {
                let slot_off = cur + BLOCK_HEADER_SIZE + idx * OBJECT_SLOT_SIZE;
                let k = Loc::from_raw(read_u32(&self.data, slot_off as usize));
                if k == key_loc {
                    return Loc::from_raw(read_u32(&self.data, (slot_off + 4) as usize));
                }
            }
            if h.next == 0 {
                break;
            }
            cur = Loc::from_raw(h.next).offset();
        }
        Loc::null()
    }

    pub fn push(&mut self, arr: Loc, item: Loc) {
        self.append_slot(arr, ValueType::Array, ARRAY_SLOT_SIZE, &item.raw().to_le_bytes());
    }

    pub fn set(&mut self, obj: Loc, key: &str, value: Loc) {
        let key_loc = self.add_string(key);
        self.set_loc(obj, key_loc, value);
    }

    /// Overwrite the value for `key_loc` if present, otherwise append a
    /// new `(key_loc, value)` member.
    pub fn set_loc(&mut self, obj: Loc, key_loc: Loc, value: Loc) {
        let mut cur = obj.offset();
        loop {
            let h = BlockHeader::read(&self.data, cur);
            for idx in 0..h.size {
                let slot_off = cur + BLOCK_HEADER_SIZE + idx * OBJECT_SLOT_SIZE;
                let k = Loc::from_raw(read_u32(&self.data, slot_off as usize));
                if k == key_loc {
                    write_u32(&mut self.data, (slot_off + 4) as usize, value.raw());
                    return;
                }
            }
            if h.next == 0 {
                break;
            }
            cur = Loc::from_raw(h.next).offset();
        }

        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&key_loc.raw().to_le_bytes());
        bytes[4..8].copy_from_slice(&value.raw().to_le_bytes());
        self.append_slot(obj, ValueType::Object, OBJECT_SLOT_SIZE, &bytes);
    }

    // -- internals --------------------------------------------------------

    fn ensure_data_capacity(&mut self, additional: u32) {
        let required = self.data_used as u64 + additional as u64;
        if required > self.data.len() as u64 {
            let mut new_cap = (self.data.len() as u64).max(1);
            while required > new_cap {
                new_cap *= 2;
            }
            self.allocator
                .grow(&mut self.data, new_cap as usize, "data section growth");
        }
    }

    fn alloc_block(&mut self, ty: ValueType, capacity: u32, slot_size: u32) -> Loc {
        let header = BlockHeader {
            allocated: capacity,
            size: 0,
            next: 0,
        };
        let total = BLOCK_HEADER_SIZE + capacity * slot_size;
        self.ensure_data_capacity(total);
        let offset = self.data_used;
        header.write_at(&mut self.data, offset);
        self.data_used += total;
        Loc::make(ty, offset)
    }

    fn find_tail_block(&self, head_offset: u32) -> (u32, BlockHeader) {
        let mut cur = head_offset;
        loop {
            let h = BlockHeader::read(&self.data, cur);
            if h.size < h.allocated || h.next == 0 {
                return (cur, h);
            }
            cur = Loc::from_raw(h.next).offset();
        }
    }

    /// Walk the chain rooted at `head_offset`, consuming `index` as it
    /// crosses block boundaries. Returns `(block_offset, index_within_block)`
    /// or `None` if `index` is out of range for the whole chain.
    fn locate(&self, head_offset: u32, mut index: u32) -> Option<(u32, u32)> {
        let mut cur = head_offset;
        loop {
            let h = BlockHeader::read(&self.data, cur);
            if index < h.size {
                return Some((cur, index));
            }
            index -= h.size;
            if h.next == 0 {
                return None;
            }
            cur = Loc::from_raw(h.next).offset();
        }
    }

    fn chain_size(&self, head_offset: u32) -> u32 {
        let mut total = 0;
        let mut cur = head_offset;
        loop {
            let h = BlockHeader::read(&self.data, cur);
            total += h.size;
            if h.next == 0 {
                break;
            }
            cur = Loc::from_raw(h.next).offset();
        }
        total
    }

    fn append_slot(&mut self, head: Loc, ty: ValueType, slot_size: u32, bytes: &[u8]) {
        let (block_offset, header) = self.find_tail_block(head.offset());
        if header.size < header.allocated {
            let slot_offset = (block_offset + BLOCK_HEADER_SIZE + header.size * slot_size) as usize;
            self.data[slot_offset..slot_offset + bytes.len()].copy_from_slice(bytes);
            write_u32(&mut self.data, (block_offset + 4) as usize, header.size + 1);
        } else {
            let new_cap = if header.allocated == 0 {
                1
            } else {
                header.allocated * 2
            };
            let new_block = self.alloc_block(ty, new_cap, slot_size);
            let new_offset = new_block.offset();
            let slot_offset = (new_offset + BLOCK_HEADER_SIZE) as usize;
            self.data[slot_offset..slot_offset + bytes.len()].copy_from_slice(bytes);
            write_u32(&mut self.data, (new_offset + 4) as usize, 1);
            write_u32(&mut self.data, (block_offset + 8) as usize, new_block.raw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_defaults_to_null() {
        let cd = ConfigData::new(0, 0);
        assert_eq!(cd.type_of(cd.root()), ValueType::Null);
    }

    #[test]
    fn number_roundtrips() {
        let mut cd = ConfigData::new(0, 0);
        let loc = cd.add_number(3.14);
        assert_eq!(cd.type_of(loc), ValueType::Number);
        assert!((cd.to_number(loc) - 3.14).abs() < 1e-9);
    }

    #[test]
    fn string_interning_is_stable() {
        let mut cd = ConfigData::new(0, 0);
        let a = cd.add_string("str");
        let b = cd.add_string("str");
        assert_eq!(a, b);
        assert_eq!(cd.to_string(a), "str");
    }

    #[test]
    fn array_push_grows_across_blocks() {
        let mut cd = ConfigData::new(0, 0);
        let arr = cd.add_array(0);
        for i in 0..20 {
            let n = cd.add_number(i as f64);
            cd.push(arr, n);
        }
        assert_eq!(cd.array_size(arr), 20);
        for i in 0..20 {
            let item = cd.array_item(arr, i);
            assert_eq!(cd.to_number(item), i as f64);
        }
        assert_eq!(cd.type_of(cd.array_item(arr, 20)), ValueType::Null);
    }

    #[test]
    fn object_set_then_lookup_and_overwrite() {
        let mut cd = ConfigData::new(0, 0);
        let obj = cd.add_object(0);
        let v1 = cd.add_string("Niklas");
        cd.set(obj, "name", v1);
        assert_eq!(cd.object_size(obj), 1);
        let looked_up = cd.object_lookup(obj, "name");
        assert_eq!(cd.to_string(looked_up), "Niklas");

        let v2 = cd.add_string("Frykholm");
        cd.set(obj, "name", v2);
        assert_eq!(cd.object_size(obj), 1);
        let updated = cd.object_lookup(obj, "name");
        assert_eq!(cd.to_string(updated), "Frykholm");

        assert_eq!(cd.type_of(cd.object_lookup(obj, "missing")), ValueType::Null);
    }

    #[test]
    fn relocation_preserves_every_answer() {
        let mut cd = ConfigData::new(0, 0);
        let obj = cd.add_object(0);
        let name = cd.add_string("Niklas");
        cd.set(obj, "name", name);
        let age = cd.add_number(41.0);
        cd.set(obj, "age", age);
        cd.set_root(obj);

        let clone = cd.clone_arena();
        assert_eq!(clone.type_of(clone.root()), ValueType::Object);
        assert_eq!(clone.object_size(clone.root()), 2);
        assert_eq!(clone.to_string(clone.object_lookup(clone.root(), "name")), "Niklas");
        assert_eq!(clone.to_number(clone.object_lookup(clone.root(), "age")), 41.0);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig {
            cases: if cfg!(miri) { 4 } else { 64 },
            .. proptest::prelude::ProptestConfig::default()
        })]

        /// `array_item` walks the same insertion order `push` built, even
        /// once the chain has spilled across several blocks.
        #[test]
        fn array_preserves_insertion_order(values in proptest::collection::vec(-1e6f64..1e6f64, 0..300)) {
            let mut cd = ConfigData::new(0, 0);
            let arr = cd.add_array(0);
            for &v in &values {
                let loc = cd.add_number(v);
                cd.push(arr, loc);
            }

            proptest::prop_assert_eq!(cd.array_size(arr), values.len() as u32);
            for (i, &v) in values.iter().enumerate() {
                proptest::prop_assert_eq!(cd.to_number(cd.array_item(arr, i as u32)), v);
            }
        }

        /// Setting the same key twice overwrites the value in place:
        /// `object_size` never grows past the number of distinct keys, and
        /// `object_lookup` always reflects the most recent `set`.
        #[test]
        fn object_set_overwrite_keeps_size_constant(keys in proptest::collection::vec("[a-z]{1,8}", 1..60)) {
            let mut cd = ConfigData::new(0, 0);
            let obj = cd.add_object(0);

            let mut expected = std::collections::HashMap::new();
            for (i, key) in keys.iter().enumerate() {
                let v = cd.add_number(i as f64);
                cd.set(obj, key, v);
                expected.insert(key.clone(), i as f64);
            }

            proptest::prop_assert_eq!(cd.object_size(obj) as usize, expected.len());
            for (key, v) in &expected {
                proptest::prop_assert_eq!(cd.to_number(cd.object_lookup(obj, key)), *v);
            }
        }
    }
}
