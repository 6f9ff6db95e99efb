//! A tolerant JSON parser that writes directly into a [`crate::ConfigData`]
//! arena (spec §4.3). Grounded on `nf_json_parser.c`'s recursive-descent
//! structure — `parse_value`/`parse_string`/`parse_number`/`parse_object`/
//! `parse_array` and a `line_number`-tracking cursor — but the original's
//! `setjmp`/`longjmp` non-local exit becomes ordinary `Result` propagation
//! through `?` (spec §9 explicitly allows an equivalent mechanism,
//! provided the observable error strings match).

mod scratch;
mod settings;

pub use settings::ParserSettings;

use crate::alloc::Allocator;
use crate::arena::ConfigData;
use crate::error::ParseError;
use crate::loc::Loc;
use scratch::{CharBuffer, LocBuffer};

/// Parse `src` as strict JSON into `cd`, setting its root on success.
///
/// On failure `cd`'s root is left pointing at a freshly allocated empty
/// object (spec §8 invariant 9) and the error carries the offending byte's
/// 1-based line number.
pub fn parse(src: &str, cd: &mut ConfigData) -> Result<(), ParseError> {
    parse_with_settings(src, cd, ParserSettings::default())
}

/// As [`parse`], with the relaxations in `settings` enabled.
pub fn parse_with_settings(
    src: &str,
    cd: &mut ConfigData,
    settings: ParserSettings,
) -> Result<(), ParseError> {
    let mut parser = Parser {
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        settings,
        cd,
    };

    match parser.parse_document() {
        Ok(root) => {
            parser.cd.set_root(root);
            Ok(())
        }
        Err(e) => {
            tracing::debug!(line = e.line, reason = %e.message, "rejected malformed input");
            let empty = parser.cd.add_object(0);
            parser.cd.set_root(empty);
            Err(e)
        }
    }
}

struct Parser<'src, 'cd> {
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    settings: ParserSettings,
    cd: &'cd mut ConfigData,
}

impl<'src, 'cd> Parser<'src, 'cd> {
    fn parse_document(&mut self) -> Result<Loc, ParseError> {
        self.skip_ws();
        if self.settings.implicit_root_object && self.peek() != Some(b'{') {
            let root = self.parse_members(None)?;
            self.skip_ws();
            if self.peek().is_some() {
                return Err(self.error_unexpected());
            }
            return Ok(root);
        }

        let value = self.parse_value()?;
        self.skip_ws();
        if self.peek().is_some() {
            return Err(self.error_unexpected());
        }
        Ok(value)
    }

    // -- cursor primitives ------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn error_unexpected(&self) -> ParseError {
        match self.peek() {
            Some(c) => self.error(format!("Unexpected character '{}'", printable(c))),
            None => self.error("Unexpected end of input"),
        }
    }

    fn expect_byte(&mut self, expected: u8) -> Result<(), ParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!(
                "Expected '{}', saw '{}'",
                expected as char,
                printable(c)
            ))),
            None => Err(self.error(format!("Expected '{}', saw end of input", expected as char))),
        }
    }

    fn expect_literal(&mut self, word: &str) -> Result<(), ParseError> {
        for expected in word.bytes() {
            match self.peek() {
                Some(c) if c == expected => {
                    self.bump();
                }
                Some(c) => {
                    return Err(self.error(format!(
                        "Expected '{}', saw '{}'",
                        expected as char,
                        printable(c)
                    )))
                }
                None => {
                    return Err(self.error(format!(
                        "Expected '{}', saw end of input",
                        expected as char
                    )))
                }
            }
        }
        Ok(())
    }

    /// Whitespace, comments (if enabled), and stray commas (if optional)
    /// all fall away in one loop, tracking line numbers as it goes (spec
    /// §4.3 "Parsing strategies").
    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b',') if self.settings.optional_commas => {
                    self.bump();
                }
                Some(b'/') if self.settings.c_comments && self.peek_at(1) == Some(b'/') => {
                    self.pos += 2;
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.settings.c_comments && self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(b'\n') => {
                                self.bump();
                            }
                            Some(_) => {
                                self.pos += 1;
                            }
                        }
                    }
                }
                _ => return,
            }
        }
    }

    // -- values -------------------------------------------------------------

    fn parse_value(&mut self) -> Result<Loc, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => {
                let s = self.parse_string_literal()?;
                Ok(self.cd.add_string(&s))
            }
            Some(b'[') => self.parse_array(),
            Some(b'{') => self.parse_object(),
            Some(b't') => {
                self.expect_literal("true")?;
                Ok(Loc::true_())
            }
            Some(b'f') => {
                self.expect_literal("false")?;
                Ok(Loc::false_())
            }
            Some(b'n') => {
                self.expect_literal("null")?;
                Ok(Loc::null())
            }
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(self.error_unexpected()),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn parse_number(&mut self) -> Result<Loc, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }

        match self.peek() {
            Some(b'0') => {
                self.bump();
                if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    return Err(self.error("Bad number format"));
                }
            }
            Some(c) if c.is_ascii_digit() => {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
            _ => return Err(self.error("Bad number format")),
        }

        if self.peek() == Some(b'.') {
            self.bump();
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.error("Bad number format"));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.bump();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.error("Bad number format"));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("number text is ASCII");
        let value: f64 = text.parse().map_err(|_| self.error("Bad number format"))?;
        Ok(self.cd.add_number(value))
    }

    fn parse_array(&mut self) -> Result<Loc, ParseError> {
        self.bump(); // '['
        let mut items: LocBuffer = LocBuffer::new();

        self.skip_ws();
        if self.peek() != Some(b']') {
            loop {
                let value = self.parse_value()?;
                items.push(value, self.cd.allocator_mut());
                self.skip_ws();
                if self.peek() == Some(b']') {
                    break;
                }
                if !self.settings.optional_commas {
                    self.expect_byte(b',')?;
                    self.skip_ws();
                    if self.peek() == Some(b']') {
                        break;
                    }
                }
            }
        }
        self.expect_byte(b']')?;

        let arr = self.cd.add_array(items.len() as u32);
        for i in 0..items.len() {
            self.cd.push(arr, items.get(i));
        }
        Ok(arr)
    }

    fn parse_object(&mut self) -> Result<Loc, ParseError> {
        self.bump(); // '{'
        let obj = self.parse_members(Some(b'}'))?;
        Ok(obj)
    }

    /// Parses zero or more `key (':'|'=') value` members into a fresh
    /// object. `closer`, when given, is the byte that ends the member
    /// list (consumed on the way out); `None` means "run to end of
    /// input" (the `implicit_root_object` case).
    fn parse_members(&mut self, closer: Option<u8>) -> Result<Loc, ParseError> {
        let mut pairs: LocBuffer = LocBuffer::new();

        loop {
            self.skip_ws();
            match (closer, self.peek()) {
                (Some(c), Some(b)) if b == c => {
                    self.bump();
                    break;
                }
                (None, None) => break,
                (Some(_), None) => return Err(self.error("Unexpected end of input")),
                _ => {}
            }

            let key = self.parse_key()?;
            self.skip_ws();
            self.expect_colon_or_equals()?;
            self.skip_ws();
            let value = self.parse_value()?;
            let key_loc = self.cd.add_string(&key);
            pairs.push(key_loc, self.cd.allocator_mut());
            pairs.push(value, self.cd.allocator_mut());

            if !self.settings.optional_commas {
                self.skip_ws();
                match (closer, self.peek()) {
                    (Some(c), Some(b)) if b == c => {
                        self.bump();
                        break;
                    }
                    (None, None) => break,
                    (Some(_), None) => return Err(self.error("Unexpected end of input")),
                    _ => self.expect_byte(b',')?,
                }
            }
        }

        let obj = self.cd.add_object((pairs.len() / 2) as u32);
        let mut i = 0;
        while i < pairs.len() {
            self.cd.set_loc(obj, pairs.get(i), pairs.get(i + 1));
            i += 2;
        }
        Ok(obj)
    }

    fn parse_key(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(b'"') => self.parse_string_literal(),
            Some(c) if self.settings.unquoted_keys && is_bareword_byte(c) => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if is_bareword_byte(c)) {
                    self.bump();
                }
                Ok(std::str::from_utf8(&self.bytes[start..self.pos])
                    .expect("bareword keys are ASCII")
                    .to_string())
            }
            Some(_) => Err(self.error_unexpected()),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    fn expect_colon_or_equals(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(b':') => {
                self.bump();
                Ok(())
            }
            Some(b'=') if self.settings.equals_for_colon => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("Expected ':', saw '{}'", printable(c)))),
            None => Err(self.error("Unexpected end of input")),
        }
    }

    // -- strings --------------------------------------------------------

    fn parse_string_literal(&mut self) -> Result<String, ParseError> {
        if self.settings.python_multiline_strings && self.bytes[self.pos..].starts_with(b"\"\"\"") {
            return self.parse_triple_quoted_string();
        }

        self.bump(); // opening quote
        let mut buf: CharBuffer = CharBuffer::new();
        loop {
            match self.peek() {
                None => return Err(self.error("Unexpected end of input")),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') if !self.settings.skip_escape_sequences => {
                    self.bump();
                    self.parse_escape(&mut buf)?;
                }
                Some(c) if c < 0x20 && !self.settings.allow_control_characters => {
                    return Err(self.error("Literal control character in string"));
                }
                Some(c) => {
                    self.bump();
                    let allocator = self.cd.allocator_mut();
                    buf.push(c, allocator);
                }
            }
        }

        String::from_utf8(buf.as_slice().to_vec())
            .map_err(|_| self.error("Invalid UTF-8 in string"))
    }

    fn parse_triple_quoted_string(&mut self) -> Result<String, ParseError> {
        self.pos += 3; // opening """
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error("Unexpected end of input")),
                Some(b'"') if self.bytes[self.pos..].starts_with(b"\"\"\"")
                    && self.peek_at(3) != Some(b'"') =>
                {
                    let text = std::str::from_utf8(&self.bytes[start..self.pos])
                        .map_err(|_| self.error("Invalid UTF-8 in string"))?
                        .to_string();
                    self.pos += 3;
                    return Ok(text);
                }
                Some(b'\n') => {
                    self.bump();
                }
                Some(_) => {
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_escape(&mut self, buf: &mut CharBuffer) -> Result<(), ParseError> {
        match self.peek() {
            Some(b'"') => {
                self.bump();
                buf.push(b'"', self.cd.allocator_mut());
            }
            Some(b'\\') => {
                self.bump();
                buf.push(b'\\', self.cd.allocator_mut());
            }
            Some(b'/') => {
                self.bump();
                buf.push(b'/', self.cd.allocator_mut());
            }
            Some(b'b') => {
                self.bump();
                buf.push(0x08, self.cd.allocator_mut());
            }
            Some(b'f') => {
                self.bump();
                buf.push(0x0c, self.cd.allocator_mut());
            }
            Some(b'n') => {
                self.bump();
                buf.push(b'\n', self.cd.allocator_mut());
            }
            Some(b'r') => {
                self.bump();
                buf.push(b'\r', self.cd.allocator_mut());
            }
            Some(b't') => {
                self.bump();
                buf.push(b'\t', self.cd.allocator_mut());
            }
            Some(b'u') => {
                self.bump();
                self.parse_unicode_escape(buf)?;
            }
            Some(c) => return Err(self.error(format!("Bad escape character '{}'", printable(c)))),
            None => return Err(self.error("Unexpected end of input")),
        }
        Ok(())
    }

    fn parse_unicode_escape(&mut self, buf: &mut CharBuffer) -> Result<(), ParseError> {
        let high = self.read_hex4()?;

        let codepoint = if (0xD800..=0xDBFF).contains(&high) && self.peek() == Some(b'\\')
            && self.peek_at(1) == Some(b'u')
        {
            let checkpoint = self.pos;
            let checkpoint_line = self.line;
            self.bump();
            self.bump();
            let low = self.read_hex4()?;
            if (0xDC00..=0xDFFF).contains(&low) {
                0x10000 + ((high as u32 - 0xD800) << 10) + (low as u32 - 0xDC00)
            } else {
                self.pos = checkpoint;
                self.line = checkpoint_line;
                high as u32
            }
        } else {
            high as u32
        };

        let allocator = self.cd.allocator_mut();
        encode_utf8_extended(codepoint, buf, allocator)
            .map_err(|()| self.error("Invalid code point in \\u escape"))
    }

    fn read_hex4(&mut self) -> Result<u16, ParseError> {
        let mut value: u16 = 0;
        for _ in 0..4 {
            let c = self.peek().ok_or_else(|| self.error("Unexpected end of input"))?;
            let digit = (c as char)
                .to_digit(16)
                .ok_or_else(|| self.error("Bad \\u escape"))?;
            value = value * 16 + digit as u16;
            self.bump();
        }
        Ok(value)
    }
}

fn is_bareword_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

/// Render a byte as a `char` for error messages, non-ASCII bytes as `?`
/// since they're never meaningful at the single-byte granularity errors
/// are reported at (document bytes outside string literals are ASCII by
/// grammar).
fn printable(c: u8) -> char {
    if c.is_ascii() {
        c as char
    } else {
        '?'
    }
}

/// Encode `cp` as UTF-8, extended past the standard U+10FFFF ceiling up to
/// U+1FFFFF the way a raw 4-byte sequence's bit capacity allows (spec
/// §4.3: "`\uXXXX` emits UTF-8 ... up to U+1FFFFF"). Surrogate-pair
/// combination in `parse_unicode_escape` never produces more than
/// U+10FFFF; the wider ceiling here is honored defensively.
fn encode_utf8_extended(cp: u32, buf: &mut CharBuffer, allocator: &mut dyn Allocator) -> Result<(), ()> {
    if cp > 0x1F_FFFF {
        return Err(());
    }
    if cp <= 0x7F {
        buf.push(cp as u8, allocator);
    } else if cp <= 0x7FF {
        buf.push(0xC0 | (cp >> 6) as u8, allocator);
        buf.push(0x80 | (cp & 0x3F) as u8, allocator);
    } else if cp <= 0xFFFF {
        buf.push(0xE0 | (cp >> 12) as u8, allocator);
        buf.push(0x80 | ((cp >> 6) & 0x3F) as u8, allocator);
        buf.push(0x80 | (cp & 0x3F) as u8, allocator);
    } else {
        buf.push(0xF0 | (cp >> 18) as u8, allocator);
        buf.push(0x80 | ((cp >> 12) & 0x3F) as u8, allocator);
        buf.push(0x80 | ((cp >> 6) & 0x3F) as u8, allocator);
        buf.push(0x80 | (cp & 0x3F) as u8, allocator);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::ValueType;

    fn parsed(src: &str) -> ConfigData {
        let mut cd = ConfigData::new(0, 0);
        parse(src, &mut cd).expect("should parse");
        cd
    }

    #[test]
    fn null_literal() {
        let cd = parsed("null");
        assert_eq!(cd.type_of(cd.root()), ValueType::Null);
    }

    #[test]
    fn number_literal() {
        let cd = parsed("3.14");
        assert_eq!(cd.type_of(cd.root()), ValueType::Number);
        assert!((cd.to_number(cd.root()) - 3.14).abs() < 1e-9);
    }

    #[test]
    fn unicode_escape_decodes_to_utf8() {
        let cd = parsed(r#""ä慶""#);
        assert_eq!(cd.type_of(cd.root()), ValueType::String);
        let s = cd.to_string(cd.root());
        assert_eq!(s.as_bytes(), &[0xc3, 0xa4, 0xe6, 0x85, 0xb6]);
    }

    #[test]
    fn array_of_numbers_preserves_order() {
        let cd = parsed("[1,2,3,4,5]");
        let root = cd.root();
        assert_eq!(cd.type_of(root), ValueType::Array);
        assert_eq!(cd.array_size(root), 5);
        for i in 0..5 {
            assert_eq!(cd.to_number(cd.array_item(root, i)), (i + 1) as f64);
        }
    }

    #[test]
    fn object_lookup_and_missing_key() {
        let cd = parsed(r#"{"name":"Niklas","age":41}"#);
        let root = cd.root();
        assert_eq!(cd.type_of(root), ValueType::Object);
        assert_eq!(cd.object_size(root), 2);
        assert_eq!(cd.to_string(cd.object_lookup(root, "name")), "Niklas");
        assert_eq!(cd.to_number(cd.object_lookup(root, "age")), 41.0);
        assert_eq!(cd.type_of(cd.object_lookup(root, "title")), ValueType::Null);
    }

    #[test]
    fn relaxed_settings_combo() {
        let mut cd = ConfigData::new(0, 0);
        let settings = ParserSettings {
            unquoted_keys: true,
            c_comments: true,
            optional_commas: true,
            implicit_root_object: true,
            equals_for_colon: true,
            ..ParserSettings::default()
        };
        parse_with_settings("// c\na=10 b=20", &mut cd, settings).expect("should parse");
        let root = cd.root();
        assert_eq!(cd.type_of(root), ValueType::Object);
        assert_eq!(cd.to_number(cd.object_lookup(root, "a")), 10.0);
        assert_eq!(cd.to_number(cd.object_lookup(root, "b")), 20.0);
    }

    #[test]
    fn python_triple_quoted_string() {
        let mut cd = ConfigData::new(0, 0);
        let settings = ParserSettings {
            python_multiline_strings: true,
            ..ParserSettings::default()
        };
        parse_with_settings("\"\"\"\"\" x \"\"\"\"\"", &mut cd, settings).expect("should parse");
        assert_eq!(cd.to_string(cd.root()), "\"\" x \"\"");
    }

    #[test]
    fn implicit_root_object_on_empty_input() {
        let mut cd = ConfigData::new(0, 0);
        let settings = ParserSettings {
            implicit_root_object: true,
            ..ParserSettings::default()
        };
        parse_with_settings("", &mut cd, settings).expect("should parse");
        assert_eq!(cd.type_of(cd.root()), ValueType::Object);
        assert_eq!(cd.object_size(cd.root()), 0);
    }

    #[test]
    fn strict_empty_input_is_an_error() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("", &mut cd).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(cd.type_of(cd.root()), ValueType::Object);
        assert_eq!(cd.object_size(cd.root()), 0);
    }

    #[test]
    fn bad_keyword_reports_expected_and_saw() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("fulse", &mut cd).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "Expected 'a', saw 'u'");
    }

    #[test]
    fn bad_keyword_line_number_tracks_newlines() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("\n\nfulse", &mut cd).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn literal_control_character_in_string_is_an_error() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("\"\n\"", &mut cd).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "Literal control character in string");
    }

    #[test]
    fn strict_mode_requires_commas_between_array_items() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("[1 2 3]", &mut cd).unwrap_err();
        assert_eq!(err.message, "Expected ',', saw '2'");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        for bad in [
            "--3.14", ".1", "-.1", "00", "00.0", "0e", "0.", "0.e1", "0.0ee", "0.0++e",
        ] {
            let mut cd = ConfigData::new(0, 0);
            assert!(parse(bad, &mut cd).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn parse_error_leaves_an_empty_object_root() {
        let mut cd = ConfigData::new(0, 0);
        let err = parse("[1 2 3]", &mut cd).unwrap_err();
        assert!(err.to_string().starts_with("1: "));
        assert_eq!(cd.type_of(cd.root()), ValueType::Object);
        assert_eq!(cd.object_size(cd.root()), 0);
    }
}
