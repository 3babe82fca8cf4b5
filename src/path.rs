//! Path addressing over JSON state trees.
//!
//! A path is a list of segments separated by `.`. A segment may carry
//! bracketed numeric indices (`items[0]`), or consist of indices alone
//! (`[0]`), which is how the filter expander renders array children.
//! Empty segments are ignored, so `a..b`, `.a.b.` and `a.b` address the same
//! value.
//!
//! Keys containing `.`, `[`, `]`, `*` or `\` are written with a `\` before
//! each such character. [`render`] produces that form and [`parse`] reads it
//! back, so every key in a tree stays addressable.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::PathError;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Escapes the next character of a key.
pub const ESCAPE: char = '\\';

/// Characters that must be escaped inside a rendered key.
const RESERVED: [char; 5] = [SEPARATOR, '[', ']', ESCAPE, '*'];

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(&escape(k)),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>(?:\\.|\\$|[^\[\]\\])*)(?P<indices>(?:\[[^\[\]]*\])*)$")
            .unwrap_or_else(|e| unreachable!("static segment regex is valid: {e}"))
    })
}

fn index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?P<idx>[^\[\]]*)\]")
            .unwrap_or_else(|e| unreachable!("static index regex is valid: {e}"))
    })
}

/// Escape the reserved characters of an object key.
#[must_use]
pub fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if RESERVED.contains(&c) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            // A trailing escape stands for itself.
            out.push(chars.next().unwrap_or(ESCAPE));
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `text` on every `sep` that is not escaped. Empty pieces are kept.
#[must_use]
pub fn split_unescaped(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == sep {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parse a path, rejecting malformed bracket syntax.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    let mut out = Vec::new();
    for raw in split_unescaped(path, SEPARATOR).into_iter().filter(|s| !s.is_empty()) {
        out.extend(parse_segment(path, raw)?);
    }
    Ok(out)
}

fn parse_segment(path: &str, raw: &str) -> Result<Vec<Segment>, PathError> {
    let Some(caps) = segment_regex().captures(raw) else {
        return Err(PathError::UnterminatedBracket {
            path: path.to_string(),
        });
    };

    let mut out = Vec::new();
    let name = &caps["name"];
    if !name.is_empty() {
        out.push(Segment::Key(unescape(name)));
    }

    for idx in index_regex().captures_iter(&caps["indices"]) {
        let digits = &idx["idx"];
        let index = digits.parse::<usize>().map_err(|_| PathError::InvalidIndex {
            path: path.to_string(),
            segment: digits.to_string(),
        })?;
        out.push(Segment::Index(index));
    }
    Ok(out)
}

/// Parse a path without failing.
///
/// A segment with malformed brackets is kept verbatim as an object key, so
/// operator-supplied filters degrade to "no such key" instead of an error.
#[must_use]
pub fn parse_lossy(path: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    for raw in split_unescaped(path, SEPARATOR).into_iter().filter(|s| !s.is_empty()) {
        match parse_segment(path, raw) {
            Ok(segments) => out.extend(segments),
            Err(_) => out.push(Segment::Key(unescape(raw))),
        }
    }
    out
}

/// Render segments as a path string that [`parse`] reads back unchanged.
#[must_use]
pub fn render(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&segment.to_string());
    }
    out
}

/// Children of a container value, in iteration order.
///
/// Objects yield their keys, arrays yield indices, leaves yield nothing.
#[must_use]
pub fn child_segments(value: &Value) -> Vec<Segment> {
    match value {
        Value::Object(map) => map.keys().cloned().map(Segment::Key).collect(),
        Value::Array(items) => (0..items.len()).map(Segment::Index).collect(),
        _ => Vec::new(),
    }
}

/// Read the value at `segments`, if present.
#[must_use]
pub fn get<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Key(k), Value::Array(items)) => items.get(k.parse::<usize>().ok()?)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

fn array_slot(target: &mut Value, index: usize) -> Option<&mut Value> {
    let len = index.checked_add(1)?;
    if !target.is_array() {
        *target = Value::Array(Vec::new());
    }
    let Value::Array(items) = target else {
        unreachable!("target was just made an array")
    };
    if items.len() < len {
        items.resize(len, Value::Null);
    }
    items.get_mut(index)
}

fn object_entry<'a>(target: &'a mut Value, key: &str) -> &'a mut Value {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        unreachable!("target was just made an object")
    };
    map.entry(key.to_string()).or_insert(Value::Null)
}

fn child_mut<'a>(target: &'a mut Value, segment: &Segment) -> Option<&'a mut Value> {
    match segment {
        Segment::Index(i) if target.is_object() => Some(object_entry(target, &i.to_string())),
        Segment::Index(i) => array_slot(target, *i),
        Segment::Key(k) => match k.parse::<usize>() {
            Ok(i) if target.is_array() => array_slot(target, i),
            _ => Some(object_entry(target, k)),
        },
    }
}

/// Write `value` at `segments`, creating intermediate levels as needed.
///
/// Non-container values found along the way are replaced and arrays are
/// padded with nulls up to the index. Callers bound indices; an index that
/// cannot be addressed at all leaves the write undone.
pub fn set(target: &mut Value, segments: &[Segment], value: Value) {
    let mut current = target;
    for segment in segments {
        let Some(next) = child_mut(current, segment) else {
            return;
        };
        current = next;
    }
    *current = value;
}
