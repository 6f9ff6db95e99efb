//! A relocatable config arena, its interning string table, and a tolerant
//! JSON parser that writes directly into the arena.
//!
//! ```
//! use configdata::{parse, ConfigData, ValueType};
//!
//! let mut cd = ConfigData::new(0, 0);
//! parse(r#"{"name":"Niklas","age":41}"#, &mut cd).unwrap();
//! let root = cd.root();
//! assert_eq!(cd.type_of(root), ValueType::Object);
//! assert_eq!(cd.to_string(cd.object_lookup(root, "name")), "Niklas");
//! ```

mod alloc;
mod arena;
mod error;
mod layout;
mod loc;
mod parser;
mod string_table;

pub use alloc::{Allocator, HeapAllocator};
pub use arena::ConfigData;
pub use error::{ConfigError, ParseError};
pub use loc::{Loc, ValueType};
pub use parser::{parse, parse_with_settings, ParserSettings};
pub use string_table::{Full, StringTable};
