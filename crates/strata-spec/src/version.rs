use std::cmp::Ordering;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid version constraint: {0}")]
    InvalidConstraint(String),
}

/// A single component of a version string.
///
/// Versions are split on `.`, `-` and `_`, and on boundaries between digits
/// and letters, so `1.2rc1` becomes `[1, 2, rc, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Num(u64),
    Str(String),
}

impl Component {
    fn rank(&self) -> u8 {
        match self {
            // Alphabetic components (alpha, beta, rc) order before numbers,
            // so 1.0-rc1 < 1.0.0 at the point they diverge.
            Component::Str(_) => 0,
            Component::Num(_) => 1,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Num(a), Component::Num(b)) => a.cmp(b),
            (Component::Str(a), Component::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A concrete package version.
///
/// Comparison is componentwise. Names conventionally used for moving
/// development branches (`develop`, `main`, `master`, `head`) order above
/// every numeric release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    original: String,
    components: Vec<Component>,
}

lazy_static! {
    static ref COMPONENT_RE: Regex = Regex::new(r"[0-9]+|[a-zA-Z]+").unwrap();
    static ref VALID_VERSION_RE: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").unwrap();
}

const INFINITY_NAMES: &[&str] = &["develop", "main", "master", "head", "trunk"];

impl Version {
    /// Parse a version string such as `1.2.3`, `2.0-rc1` or `develop`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        if !VALID_VERSION_RE.is_match(text) {
            return Err(VersionError::InvalidVersion(text.to_string()));
        }

        let components = COMPONENT_RE
            .find_iter(text)
            .map(|m| {
                let s = m.as_str();
                match s.parse::<u64>() {
                    Ok(n) => Component::Num(n),
                    Err(_) => Component::Str(s.to_lowercase()),
                }
            })
            .collect::<Vec<_>>();

        if components.is_empty() {
            return Err(VersionError::InvalidVersion(text.to_string()));
        }

        Ok(Self {
            original: text.to_string(),
            components,
        })
    }

    /// The version string as originally written.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Whether this version names a moving development branch rather than a
    /// numbered release.
    pub fn is_infinity(&self) -> bool {
        match self.components.first() {
            Some(Component::Str(s)) => INFINITY_NAMES.contains(&s.as_str()),
            _ => false,
        }
    }

    /// True if `self` starts with all of `prefix`'s components.
    ///
    /// Used for `@1.2` style constraints, which match any 1.2.x release.
    pub fn has_prefix(&self, prefix: &Version) -> bool {
        if prefix.components.len() > self.components.len() {
            return false;
        }
        self.components[..prefix.components.len()] == prefix.components[..]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_infinity(), other.is_infinity()) {
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }

        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        // A strict prefix orders below the longer version: 1.2 < 1.2.1.
        self.components.len().cmp(&other.components.len())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}
