//! Error types for the arena and the JSON parser.
//!
//! Capacity exhaustion inside the string table is not an error here — it is
//! resolved internally by growth and retry (spec §7) — so it is represented
//! as a plain sentinel (`StringTableFull`) returned from fallible lookups,
//! not as part of this enum.

use thiserror::Error;

/// Errors that can escape the arena's public API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("string table requires at least {min} bytes, got {got}")]
    BufferTooSmall { min: u32, got: u32 },
}

/// A JSON parse failure: a 1-based source line and a short message,
/// rendered as `"{line}: {message}"` to match the reference parser's error
/// channel exactly (spec §6, §8 invariant 9).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}
