// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::errors::Error;
use super::map::{CborMap, MapOrdering};
use super::value::CborValue;
use base64::{engine::general_purpose, Engine as _};
use num_bigint::BigInt;
use std::fmt::Write as _;
use std::str::FromStr;

const MAX_DEPTH: usize = 256;

impl CborValue {
    /// Render as RFC 8949 diagnostic notation.  Maps are printed one entry
    /// per line; everything else stays on a single line.
    pub fn to_diagnostic(&self) -> String {
        let mut out = String::new();
        write_item(self, 0, &mut out);
        out
    }

    /// Parse diagnostic notation produced by [`CborValue::to_diagnostic`]
    /// (or written by hand).  Maps use the default key ordering.
    pub fn from_diagnostic(text: &str) -> Result<CborValue, Error> {
        Self::from_diagnostic_with(text, MapOrdering::default())
    }

    pub fn from_diagnostic_with(text: &str, ordering: MapOrdering) -> Result<CborValue, Error> {
        let mut parser = Parser {
            chars: text.chars().collect(),
            pos: 0,
            ordering,
        };
        let value = parser.parse_item(0)?;
        parser.skip_filler()?;
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected text after item"));
        }
        Ok(value)
    }
}

impl FromStr for CborValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CborValue::from_diagnostic(s)
    }
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn write_item(v: &CborValue, level: usize, out: &mut String) {
    match v {
        CborValue::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        CborValue::BigInteger(b) => {
            let _ = write!(out, "{b}");
        }
        CborValue::Float(f) => write_float(*f, out),
        CborValue::ByteString(b) => {
            out.push_str("h'");
            out.push_str(&hex::encode(b));
            out.push('\'');
        }
        CborValue::TextString(s) => write_text(s, out),
        CborValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        CborValue::Null => out.push_str("null"),
        CborValue::Array(a) => {
            out.push('[');
            for (i, item) in a.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_item(item, level, out);
            }
            out.push(']');
        }
        CborValue::Map(m) => write_map(m, level, out),
        CborValue::Tag(t) => {
            let _ = write!(out, "{}(", t.number());
            write_item(t.item(), level, out);
            out.push(')');
        }
    }
}

fn write_map(m: &CborMap, level: usize, out: &mut String) {
    if m.is_empty() {
        out.push_str("{}");
        return;
    }

    out.push_str("{\n");
    let count = m.len();
    for (i, (k, v)) in m.iter().enumerate() {
        indent(level + 1, out);
        write_item(k, level + 1, out);
        out.push_str(": ");
        write_item(v, level + 1, out);
        if i + 1 < count {
            out.push(',');
        }
        out.push('\n');
    }
    indent(level, out);
    out.push('}');
}

fn write_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("NaN");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "Infinity" } else { "-Infinity" });
    } else {
        // Debug always keeps a fraction or exponent, so it never reads back
        // as an integer
        let _ = write!(out, "{f:?}");
    }
}

fn write_text(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    ordering: MapOrdering,
}

impl Parser {
    fn error(&self, msg: &str) -> Error {
        Error::Diagnostic(format!("{msg} at position {}", self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<char, Error> {
        let c = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(c)
    }

    fn looking_at(&self, token: &str) -> bool {
        token
            .chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn keyword(&mut self, token: &str) -> bool {
        if self.looking_at(token) {
            self.pos += token.chars().count();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), Error> {
        self.skip_filler()?;
        if self.next()? != c {
            self.pos -= 1;
            return Err(self.error(&format!("expected '{c}'")));
        }
        Ok(())
    }

    /// Skips white space, `# line` comments and `/ block /` comments
    fn skip_filler(&mut self) -> Result<(), Error> {
        while let Some(c) = self.peek() {
            match c {
                c if c.is_whitespace() => self.pos += 1,
                '#' => {
                    while let Some(c) = self.peek() {
                        self.pos += 1;
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '/' => {
                    self.pos += 1;
                    loop {
                        if self.next()? == '/' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_item(&mut self, depth: usize) -> Result<CborValue, Error> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        self.skip_filler()?;

        let c = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input"))?;

        match c {
            '[' => self.parse_array(depth),
            '{' => self.parse_map(depth),
            '"' => self.parse_text().map(CborValue::TextString),
            'h' if self.keyword("h'") => self.parse_hex().map(CborValue::ByteString),
            'b' if self.keyword("b64'") => self.parse_base64().map(CborValue::ByteString),
            _ if self.keyword("true") => Ok(CborValue::Boolean(true)),
            _ if self.keyword("false") => Ok(CborValue::Boolean(false)),
            _ if self.keyword("null") => Ok(CborValue::Null),
            _ if self.keyword("NaN") => Ok(CborValue::Float(f64::NAN)),
            _ if self.keyword("Infinity") => Ok(CborValue::Float(f64::INFINITY)),
            _ if self.keyword("-Infinity") => Ok(CborValue::Float(f64::NEG_INFINITY)),
            '-' | '0'..='9' => self.parse_number(depth),
            _ => Err(self.error(&format!("unexpected character '{c}'"))),
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<CborValue, Error> {
        self.expect('[')?;
        let mut items = Vec::new();

        self.skip_filler()?;
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(CborValue::Array(items));
        }

        loop {
            items.push(self.parse_item(depth + 1)?);
            self.skip_filler()?;
            match self.next()? {
                ',' => continue,
                ']' => return Ok(CborValue::Array(items)),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected ',' or ']'"));
                }
            }
        }
    }

    fn parse_map(&mut self, depth: usize) -> Result<CborValue, Error> {
        self.expect('{')?;
        let mut map = CborMap::with_ordering(self.ordering);

        self.skip_filler()?;
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(CborValue::Map(map));
        }

        loop {
            let key = self.parse_item(depth + 1)?;
            self.expect(':')?;
            let value = self.parse_item(depth + 1)?;
            map.set(key, value)?;

            self.skip_filler()?;
            match self.next()? {
                ',' => continue,
                '}' => return Ok(CborValue::Map(map)),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected ',' or '}'"));
                }
            }
        }
    }

    fn parse_text(&mut self) -> Result<String, Error> {
        self.expect('"')?;
        let mut s = String::new();

        loop {
            match self.next()? {
                '"' => return Ok(s),
                '\\' => match self.next()? {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    '/' => s.push('/'),
                    'n' => s.push('\n'),
                    'r' => s.push('\r'),
                    't' => s.push('\t'),
                    'b' => s.push('\u{08}'),
                    'f' => s.push('\u{0c}'),
                    'u' => s.push(self.parse_unicode_escape()?),
                    _ => return Err(self.error("unsupported escape sequence")),
                },
                c => s.push(c),
            }
        }
    }

    fn parse_hex4(&mut self) -> Result<u32, Error> {
        let mut v = 0u32;
        for _ in 0..4 {
            let c = self.next()?;
            v = (v << 4)
                | c.to_digit(16)
                    .ok_or_else(|| self.error("invalid \\u escape"))?;
        }
        Ok(v)
    }

    fn parse_unicode_escape(&mut self) -> Result<char, Error> {
        let high = self.parse_hex4()?;
        let code = if (0xd800..0xdc00).contains(&high) {
            if !self.keyword("\\u") {
                return Err(self.error("unpaired surrogate"));
            }
            let low = self.parse_hex4()?;
            if !(0xdc00..0xe000).contains(&low) {
                return Err(self.error("unpaired surrogate"));
            }
            0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00)
        } else {
            high
        };
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    /// Collects the body of a `'...'` byte string, ignoring white space
    fn quoted_body(&mut self) -> Result<String, Error> {
        let mut body = String::new();
        loop {
            match self.next()? {
                '\'' => return Ok(body),
                c if c.is_whitespace() => {}
                c => body.push(c),
            }
        }
    }

    fn parse_hex(&mut self) -> Result<Vec<u8>, Error> {
        let body = self.quoted_body()?;
        hex::decode(body).map_err(|e| self.error(&format!("bad hex string: {e}")))
    }

    fn parse_base64(&mut self) -> Result<Vec<u8>, Error> {
        let body: String = self
            .quoted_body()?
            .chars()
            .filter(|c| *c != '=')
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                c => c,
            })
            .collect();
        general_purpose::URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| self.error(&format!("bad base64 string: {e}")))
    }

    fn parse_number(&mut self, depth: usize) -> Result<CborValue, Error> {
        let start = self.pos;
        let mut is_float = false;

        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {}
                '.' | 'e' | 'E' => is_float = true,
                '+' | '-' if is_float => {}
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos].iter().collect();

        if is_float {
            return text
                .parse::<f64>()
                .map(CborValue::Float)
                .map_err(|_| self.error(&format!("bad number {text}")));
        }

        if self.peek() == Some('(') {
            let tag = text
                .parse::<u64>()
                .map_err(|_| self.error(&format!("bad tag number {text}")))?;
            self.pos += 1;
            let inner = self.parse_item(depth + 1)?;
            self.expect(')')?;
            return CborValue::tag(tag, inner).map_err(|e| self.error(&e.to_string()));
        }

        BigInt::from_str(&text)
            .map(CborValue::big_integer)
            .map_err(|_| self.error(&format!("bad number {text}")))
    }
}
