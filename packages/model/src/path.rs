//! # State Paths
//!
//! States are addressed by the chain of state ids from the root down to the state, joined
//! with `/` (e.g. `ROOT/A1B2C3/D4E5F6`). Paths are re-resolved against the live document
//! every time they are used, so nothing holds a reference into the tree across edits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const PATH_SEPARATOR: char = '/';

/// Identifier of a state, unique among its siblings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        debug_assert!(!id.contains(PATH_SEPARATOR), "state ids must not contain '/'");
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Slash-separated chain of state ids, starting at the root state.
///
/// **Invariant**: a path always has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatePath {
    segments: Vec<StateId>,
}

impl StatePath {
    /// Path of a root state
    pub fn root(id: StateId) -> Self {
        Self { segments: vec![id] }
    }

    /// Parse `ROOT/CHILD/...`
    pub fn parse(path: &str) -> Result<Self, ModelError> {
        if path.is_empty() {
            return Err(ModelError::InvalidPath(path.to_string()));
        }
        let segments = path
            .split(PATH_SEPARATOR)
            .map(|segment| {
                if segment.is_empty() {
                    Err(ModelError::InvalidPath(path.to_string()))
                } else {
                    Ok(StateId(segment.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Path of the child state `id` below this one
    pub fn child(&self, id: StateId) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id);
        Self { segments }
    }

    /// Path one level shallower, `None` for a root path
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Id of the state this path points at
    pub fn last(&self) -> &StateId {
        // Paths are never empty
        &self.segments[self.segments.len() - 1]
    }

    pub fn first(&self) -> &StateId {
        &self.segments[0]
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[StateId] {
        &self.segments
    }

    /// Whether `self` equals `prefix` or lies below it
    pub fn starts_with(&self, prefix: &StatePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", PATH_SEPARATOR)?;
            }
            f.write_str(segment.as_str())?;
        }
        Ok(())
    }
}

impl TryFrom<String> for StatePath {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StatePath> for String {
    fn from(path: StatePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = StatePath::parse("ROOT/A/B").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.last().as_str(), "B");
        assert_eq!(path.to_string(), "ROOT/A/B");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        assert!(StatePath::parse("").is_err());
        assert!(StatePath::parse("ROOT//A").is_err());
        assert!(StatePath::parse("ROOT/").is_err());
    }

    #[test]
    fn test_parent_and_child() {
        let root = StatePath::root(StateId::new("ROOT"));
        assert!(root.is_root());
        assert_eq!(root.parent(), None);

        let child = root.child(StateId::new("A"));
        assert_eq!(child.parent(), Some(root.clone()));
        assert!(child.starts_with(&root));
        assert!(!root.starts_with(&child));
    }

    #[test]
    fn test_serde_as_string() {
        let path = StatePath::parse("ROOT/A").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"ROOT/A\"");
        let back: StatePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
