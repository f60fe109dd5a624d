use std::fmt;
use std::str::FromStr;

use moonbridge_core::{State, ValueType};

use crate::error::{BridgeError, Result};
use crate::stack::SlotGuard;

/// A global name followed by zero or more field names, written `a.b.c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DottedPath {
    segments: Vec<String>,
}

impl DottedPath {
    pub const DELIMITER: char = '.';

    pub fn parse(path: &str) -> Result<Self> {
        let segments = path
            .split(Self::DELIMITER)
            .map(|segment| check_segment(path, segment).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(DottedPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The global the path starts from.
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Number of segments; always at least one.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_global(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn parent(&self) -> Option<DottedPath> {
        (!self.is_global()).then(|| DottedPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Extends the path by one field; performs no interpreter access.
    pub fn join(&self, field: &str) -> Result<DottedPath> {
        let mut segments = self.segments.clone();
        segments.push(check_segment(field, field)?.to_string());
        Ok(DottedPath { segments })
    }
}

fn check_segment<'a>(path: &str, segment: &'a str) -> Result<&'a str> {
    let invalid = |reason| BridgeError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if segment.is_empty() {
        return Err(invalid("empty segment"));
    }
    if segment.contains(DottedPath::DELIMITER) {
        return Err(invalid("field name contains the path delimiter"));
    }
    if segment.chars().any(char::is_whitespace) {
        return Err(invalid("segment contains whitespace"));
    }
    Ok(segment)
}

impl FromStr for DottedPath {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        DottedPath::parse(s)
    }
}

impl TryFrom<&str> for DottedPath {
    type Error = BridgeError;

    fn try_from(s: &str) -> Result<Self> {
        DottedPath::parse(s)
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", DottedPath::DELIMITER)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Walks `segments`, leaving every intermediate table on the stack and the
/// final value on top.
fn descend(state: &State, segments: &[String]) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    state.get_global(head);
    let mut previous = head;
    for segment in rest {
        match state.type_of(-1) {
            ValueType::Table => {}
            ValueType::Nil | ValueType::None => return Err(BridgeError::unresolved(previous.as_str())),
            _ => return Err(BridgeError::not_a_table(previous.as_str())),
        }
        state
            .get_field(-1, segment)
            .map_err(|_| BridgeError::not_a_table(previous.as_str()))?;
        previous = segment;
    }
    Ok(())
}

/// Pushes the value at `path` on top, with its parent tables beneath it.
///
/// The final value may be nil. On failure nothing is left pushed.
pub fn resolve(state: &State, path: &DottedPath) -> Result<()> {
    let guard = SlotGuard::new(state);
    descend(state, path.segments())?;
    tracing::trace!(target: "moonbridge::stack", %path, slots = guard.pushed(), "path resolved");
    guard.disarm();
    Ok(())
}

/// Pushes the table that holds the last segment of `path`.
///
/// A single-segment path pushes nothing: its parent is the globals table.
pub fn resolve_parent(state: &State, path: &DottedPath) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let guard = SlotGuard::new(state);
    descend(state, parent.segments())?;
    match state.type_of(-1) {
        ValueType::Table => {}
        ValueType::Nil | ValueType::None => return Err(BridgeError::unresolved(parent.last())),
        _ => return Err(BridgeError::not_a_table(parent.last())),
    }
    guard.disarm();
    Ok(())
}

/// Like [`resolve`], additionally requiring the value to be callable.
pub fn resolve_function(state: &State, path: &DottedPath) -> Result<()> {
    let guard = SlotGuard::new(state);
    descend(state, path.segments())?;
    match state.type_of(-1) {
        ValueType::Function => {}
        ValueType::Nil | ValueType::None => return Err(BridgeError::unresolved(path.last())),
        _ => {
            return Err(BridgeError::NotAFunction {
                name: path.to_string(),
            });
        }
    }
    guard.disarm();
    Ok(())
}
