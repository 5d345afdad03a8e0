use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A dotted hierarchical code identifying a unit's position in the tree.
///
/// Format: one or more positive integers joined by `.`, e.g. `"2"` for the
/// second root unit or `"2.1.3"` for the third child of the first child of
/// that root. A child's code is minted from its parent's code plus one
/// trailing segment; since moves do not renumber descendants, a code is a
/// display identifier, not a navigable path.
///
/// Codes order numerically segment by segment, so `"2.10"` sorts after
/// `"2.9"` (a plain string sort would not).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitCode(Vec<u32>);

impl UnitCode {
    /// Create a root-level code from a single segment.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is zero. Root codes start at 1.
    #[must_use]
    pub fn root(segment: u32) -> Self {
        assert!(segment > 0, "code segments start at 1");
        Self(vec![segment])
    }

    /// Create a child code by appending a segment to this code.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is zero.
    #[must_use]
    pub fn child(&self, segment: u32) -> Self {
        assert!(segment > 0, "code segments start at 1");
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// The final segment: this unit's position among its siblings.
    #[must_use]
    pub fn last_segment(&self) -> u32 {
        *self.0.last().expect("a code has at least one segment")
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Errors that can occur when parsing a [`UnitCode`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The string is empty or has empty segments (`"1..2"`, `".1"`, ...).
    #[error("invalid code format: '{0}'")]
    Syntax(String),

    /// A segment is not a positive integer.
    #[error("invalid segment '{1}' in code '{0}': expected a positive integer")]
    Segment(String, String),
}

impl FromStr for UnitCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.starts_with('.') || s.ends_with('.') || s.contains("..") {
            return Err(Error::Syntax(s.to_string()));
        }

        let segments = s
            .split('.')
            .map(|segment| match segment.parse::<u32>() {
                Ok(value) if value > 0 => Ok(value),
                _ => Err(Error::Segment(s.to_string(), segment.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(segments))
    }
}

impl TryFrom<&str> for UnitCode {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for UnitCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitCode> for String {
    fn from(code: UnitCode) -> Self {
        code.to_string()
    }
}
