//! The relaxations layered on top of strict JSON (spec §4.3). Every field
//! defaults to `false`, so `ParserSettings::default()` is strict JSON.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParserSettings {
    /// Object keys may be barewords matching `[A-Za-z0-9_-]+`.
    pub unquoted_keys: bool,
    /// `// …` and `/* … */` are accepted wherever whitespace is.
    pub c_comments: bool,
    /// A document that doesn't start with `{` is parsed as a bare member
    /// list, as if wrapped in `{ … }`. Empty input yields an empty object.
    pub implicit_root_object: bool,
    /// Commas between array elements / object members are optional, and a
    /// stray comma is swallowed wherever whitespace is.
    pub optional_commas: bool,
    /// `=` may replace `:` between an object key and its value.
    pub equals_for_colon: bool,
    /// `"""…"""` strings are accepted: raw content, no escape processing,
    /// terminated by the first `"""` not followed by another `"`.
    pub python_multiline_strings: bool,
    /// A backslash inside a normal string is kept literally instead of
    /// starting an escape sequence.
    pub skip_escape_sequences: bool,
    /// Bytes below 0x20 are permitted inside normal string literals.
    pub allow_control_characters: bool,
}

impl ParserSettings {
    pub fn strict() -> Self {
        Self::default()
    }

    /// Every relaxation enabled, except the two that change how bytes
    /// inside a string are interpreted rather than what syntax is
    /// accepted — those default off so enabling "relaxed" doesn't also
    /// silently disable escape processing or allow control characters.
    pub fn relaxed() -> Self {
        ParserSettings {
            unquoted_keys: true,
            c_comments: true,
            implicit_root_object: true,
            optional_commas: true,
            equals_for_colon: true,
            python_multiline_strings: true,
            skip_escape_sequences: false,
            allow_control_characters: false,
        }
    }
}
