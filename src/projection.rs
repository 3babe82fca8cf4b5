//! Sparse projection of a state tree onto a set of paths.
//!
//! The output mirrors the source level by level. An array in the output
//! never grows past the length of the array at the same place in the source,
//! so an index written in a filter cannot make projection allocate.

use std::slice;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::FilterPattern;
use crate::path::{self, Segment};

/// Copy the value at each of `paths` into a fresh object at the same path.
///
/// Intermediate levels are created as needed. A path that names nothing in
/// `tree` still creates its intermediate levels, but no leaf is written.
/// The empty path addresses nothing and is ignored.
#[must_use]
pub fn project<S: AsRef<str>>(paths: &[S], tree: &Value) -> Value {
    let segments: Vec<Vec<Segment>> = paths
        .iter()
        .map(|raw| path::parse_lossy(raw.as_ref()))
        .collect();
    project_segments(&segments, tree)
}

/// [`project`] over already parsed paths.
#[must_use]
pub fn project_segments(paths: &[Vec<Segment>], tree: &Value) -> Value {
    let mut out = Value::Object(Map::new());
    for segments in paths {
        graft(&mut out, tree, segments);
    }
    out
}

/// Project the paths `pattern` expands to.
///
/// The catch-all pattern returns the whole tree instead of one level of
/// expansion.
#[must_use]
pub fn project_filter(pattern: &FilterPattern, tree: &Value) -> Value {
    if pattern.is_catch_all() {
        return tree.clone();
    }
    project_segments(&pattern.expand_segments(tree), tree)
}

fn lookup<'a>(source: Option<&'a Value>, segment: &Segment) -> Option<&'a Value> {
    source.and_then(|value| path::get(value, slice::from_ref(segment)))
}

/// Copy `tree` at `segments` into `out`, or create its parents if absent.
fn graft(out: &mut Value, tree: &Value, segments: &[Segment]) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut source = Some(tree);
    let mut target = out;
    for segment in parents {
        let next_source = lookup(source, segment);
        let Some(next) = slot(target, source, segment) else {
            return;
        };
        target = next;
        source = next_source;
    }

    match lookup(source, last) {
        Some(value) => {
            if let Some(leaf) = slot(target, source, last) {
                *leaf = value.clone();
            }
        }
        None if target.is_null() => {
            let array = match source {
                Some(Value::Array(_)) => true,
                Some(Value::Object(_)) => false,
                _ => matches!(last, Segment::Index(_)),
            };
            *target = if array {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
        }
        None => {}
    }
}

/// The child of `target` for `segment`, shaped after `source`.
///
/// Returns `None` for an array slot `source` does not have.
fn slot<'a>(target: &'a mut Value, source: Option<&Value>, segment: &Segment) -> Option<&'a mut Value> {
    match source {
        Some(Value::Array(items)) => {
            let index = match segment {
                Segment::Index(i) => *i,
                Segment::Key(k) => k.parse::<usize>().ok()?,
            };
            if index >= items.len() {
                return None;
            }
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(slots) = target else {
                return None;
            };
            if slots.len() <= index {
                slots.resize(index + 1, Value::Null);
            }
            slots.get_mut(index)
        }
        Some(Value::Object(_)) => Some(object_entry(target, segment)),
        _ => match segment {
            Segment::Key(_) => Some(object_entry(target, segment)),
            Segment::Index(_) => {
                if target.is_null() {
                    *target = Value::Array(Vec::new());
                }
                None
            }
        },
    }
}

fn object_entry<'a>(target: &'a mut Value, segment: &Segment) -> &'a mut Value {
    let key = match segment {
        Segment::Key(k) => k.clone(),
        Segment::Index(i) => i.to_string(),
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        unreachable!("target was just made an object")
    };
    map.entry(key).or_insert(Value::Null)
}

/// One entry of the state reported to the inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredState {
    /// The filter pattern as subscribed, not an expanded path.
    pub path: String,
    /// Projection of the tree onto that pattern.
    pub value: Value,
}

impl FilteredState {
    /// Compute the entry for `pattern` against `tree`.
    #[must_use]
    pub fn compute(pattern: &FilterPattern, tree: &Value) -> Self {
        Self {
            path: pattern.as_str().to_string(),
            value: project_filter(pattern, tree),
        }
    }
}
