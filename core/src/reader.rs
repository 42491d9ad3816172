//! Token scanning over JSV text.
//!
//! Every function works on byte indices into a `&str` and only ever stops on ASCII delimiters,
//! so returned slices always fall on character boundaries. Tokens are returned as sub-slices of
//! the input; nothing here allocates except [`parse_string`] when a literal quote must be collapsed.

use std::borrow::Cow;

pub const MAP_START: u8 = b'{';
pub const MAP_END: u8 = b'}';
pub const LIST_START: u8 = b'[';
pub const LIST_END: u8 = b']';
pub const KEY_SEPARATOR: u8 = b':';
pub const ITEM_SEPARATOR: u8 = b',';
pub const QUOTE: u8 = b'"';

#[inline]
fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

pub fn eat_whitespace(text: &str, index: &mut usize) {
    let bytes = text.as_bytes();
    while *index < bytes.len() && is_whitespace(bytes[*index]) {
        *index += 1;
    }
}

/// Returns index right after the closing quote of a string starting at `start`.
fn scan_quoted(bytes: &[u8], start: usize) -> usize {
    let mut index = start + 1;
    while index < bytes.len() {
        if bytes[index] == QUOTE {
            // `""` is a literal quote inside a quoted string.
            if index + 1 < bytes.len() && bytes[index + 1] == QUOTE {
                index += 2;
                continue;
            }
            return index + 1;
        }
        index += 1;
    }
    bytes.len()
}

/// Returns index right after the delimiter closing the collection opened at `start`.
fn scan_balanced(bytes: &[u8], start: usize, open: u8, close: u8) -> usize {
    let mut depth = 1usize;
    let mut within_quotes = false;
    let mut index = start + 1;
    while index < bytes.len() && depth > 0 {
        let byte = bytes[index];
        if byte == QUOTE {
            within_quotes = !within_quotes;
        } else if !within_quotes {
            if byte == open {
                depth += 1;
            } else if byte == close {
                depth -= 1;
            }
        }
        index += 1;
    }
    index
}

pub fn eat_map_key<'a>(text: &'a str, index: &mut usize) -> &'a str {
    eat_whitespace(text, index);
    let bytes = text.as_bytes();
    let start = *index;
    if start >= bytes.len() {
        return "";
    }
    match bytes[start] {
        QUOTE => *index = scan_quoted(bytes, start),
        MAP_START => *index = scan_balanced(bytes, start, MAP_START, MAP_END),
        _ => {
            while *index < bytes.len()
                && !matches!(bytes[*index], KEY_SEPARATOR | ITEM_SEPARATOR | MAP_END)
            {
                *index += 1;
            }
        }
    }
    &text[start..*index]
}

pub fn eat_map_key_separator(text: &str, index: &mut usize) {
    eat_whitespace(text, index);
    if text.as_bytes().get(*index) == Some(&KEY_SEPARATOR) {
        *index += 1;
    }
}

fn eat_token<'a>(text: &'a str, index: &mut usize, end: u8) -> &'a str {
    let bytes = text.as_bytes();
    let start = *index;
    if start >= bytes.len() {
        return "";
    }
    match bytes[start] {
        ITEM_SEPARATOR => return "",
        byte if byte == end => return "",
        QUOTE => *index = scan_quoted(bytes, start),
        MAP_START => *index = scan_balanced(bytes, start, MAP_START, MAP_END),
        LIST_START => *index = scan_balanced(bytes, start, LIST_START, LIST_END),
        _ => {
            while *index < bytes.len() && bytes[*index] != ITEM_SEPARATOR && bytes[*index] != end
            {
                *index += 1;
            }
        }
    }
    &text[start..*index]
}

/// Raw value of a map entry. Empty slice means the entry has no value.
pub fn eat_value<'a>(text: &'a str, index: &mut usize) -> &'a str {
    eat_token(text, index, MAP_END)
}

/// Raw value of a list element.
pub fn eat_list_item<'a>(text: &'a str, index: &mut usize) -> &'a str {
    eat_token(text, index, LIST_END)
}

/// Steps over the separator or collection end following a value.
pub fn eat_item_separator_or_map_end(text: &str, index: &mut usize) {
    eat_whitespace(text, index);
    if *index != text.len() {
        *index += 1;
    }
}

/// `true` when nothing but whitespace sits between the map start and the map end (or input end).
pub fn is_empty_map(text: &str) -> bool {
    let mut index = 1;
    eat_whitespace(text, &mut index);
    match text.as_bytes().get(index) {
        None => true,
        Some(byte) => *byte == MAP_END,
    }
}

/// Strips surrounding quotes and collapses `""` into `"`.
pub fn parse_string(raw: &str) -> Cow<'_, str> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2 || bytes[0] != QUOTE || bytes[bytes.len() - 1] != QUOTE {
        return Cow::Borrowed(raw);
    }
    let inner = &raw[1..raw.len() - 1];
    if inner.contains("\"\"") {
        Cow::Owned(inner.replace("\"\"", "\""))
    } else {
        Cow::Borrowed(inner)
    }
}

/// Type name carried by a nested map value whose first entry is `type_attr`, e.g.
/// `{__type:"Zoo.Dog",Name:Rex}`.
pub fn embedded_type_name<'a>(raw: &'a str, type_attr: &str) -> Option<Cow<'a, str>> {
    if raw.as_bytes().first() != Some(&MAP_START) {
        return None;
    }
    let mut index = 1;
    let key = eat_map_key(raw, &mut index);
    if !parse_string(key).eq_ignore_ascii_case(type_attr) {
        return None;
    }
    eat_map_key_separator(raw, &mut index);
    let value = eat_value(raw, &mut index);
    if value.is_empty() {
        return None;
    }
    Some(parse_string(value))
}
