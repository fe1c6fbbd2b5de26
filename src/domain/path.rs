//! Comma-separated ancestor paths such as `-1,10,42`.
//!
//! A path always starts at the virtual root (`-1`) and ends with the node's
//! own id. Items in the recycle bin hang below `-20`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ROOT_ID: i32 = -1;
pub const RECYCLE_BIN_ID: i32 = -20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path segment `{segment}` is not an integer")]
    InvalidSegment { segment: String },
    #[error("path `{path}` does not start at the root")]
    MissingRoot { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentPath {
    segments: Vec<i32>,
}

impl ContentPath {
    pub fn root() -> Self {
        Self {
            segments: vec![ROOT_ID],
        }
    }

    pub fn recycle_bin() -> Self {
        Self {
            segments: vec![ROOT_ID, RECYCLE_BIN_ID],
        }
    }

    /// Prefix shared by every path inside the recycle bin, e.g. `-1,-20`.
    pub fn recycle_bin_prefix() -> String {
        Self::recycle_bin().to_string()
    }

    pub fn child(&self, id: i32) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id);
        Self { segments }
    }

    /// Id of the node this path points at.
    pub fn id(&self) -> i32 {
        *self.segments.last().unwrap_or(&ROOT_ID)
    }

    /// Number of segments below the root marker.
    pub fn level(&self) -> i32 {
        i32::try_from(self.segments.len()).map_or(i32::MAX, |len| len - 1)
    }

    /// Direct parent id, or `None` for the root marker itself.
    pub fn parent_id(&self) -> Option<i32> {
        let len = self.segments.len();
        (len >= 2).then(|| self.segments[len - 2])
    }

    /// Ancestor ids from the root downwards, excluding the root marker and self.
    pub fn ancestor_ids(&self) -> &[i32] {
        match self.segments.len() {
            0..=2 => &[],
            len => &self.segments[1..len - 1],
        }
    }

    pub fn segments(&self) -> &[i32] {
        &self.segments
    }

    pub fn is_trashed(&self) -> bool {
        self.segments.get(1) == Some(&RECYCLE_BIN_ID)
    }

    /// True when `id` appears strictly above the end of this path.
    pub fn has_ancestor(&self, id: i32) -> bool {
        self.segments[..self.segments.len().saturating_sub(1)].contains(&id)
    }

    pub fn starts_with(&self, prefix: &ContentPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Replace `old_prefix` with `new_prefix`, keeping the remaining segments.
    pub fn rebase(&self, old_prefix: &ContentPath, new_prefix: &ContentPath) -> Option<Self> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let mut segments = new_prefix.segments.clone();
        segments.extend_from_slice(&self.segments[old_prefix.segments.len()..]);
        Some(Self { segments })
    }
}

impl FromStr for ContentPath {
    type Err = PathError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let segments = trimmed
            .split(',')
            .map(|segment| {
                segment
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| PathError::InvalidSegment {
                        segment: segment.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if segments.first() != Some(&ROOT_ID) {
            return Err(PathError::MissingRoot {
                path: trimmed.to_string(),
            });
        }

        Ok(Self { segments })
    }
}

impl TryFrom<String> for ContentPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}
