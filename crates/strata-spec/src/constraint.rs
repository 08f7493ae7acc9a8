use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::{Version, VersionError};

/// A constraint on a package version: unconstrained, a single exact version,
/// an inclusive range open at either end, or a union of constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VersionConstraint {
    #[default]
    Any,
    Exact(Version),
    Range {
        lo: Option<Version>,
        hi: Option<Version>,
    },
    List(Vec<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse the version part of a spec string.
    ///
    /// Accepted forms: `1.2` (exact), `1.0:2.0` / `1.0:` / `:2.0` (inclusive
    /// range), and comma-separated unions such as `1.0:1.4,2.0`.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() || text == ":" {
            return Ok(VersionConstraint::Any);
        }

        let parts: Vec<&str> = text.split(',').collect();
        if parts.len() > 1 {
            let members = parts
                .into_iter()
                .map(Self::parse_single)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(VersionConstraint::List(members));
        }

        Self::parse_single(text)
    }

    fn parse_single(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if let Some((lo, hi)) = text.split_once(':') {
            let lo = if lo.is_empty() {
                None
            } else {
                Some(Version::parse(lo)?)
            };
            let hi = if hi.is_empty() {
                None
            } else {
                Some(Version::parse(hi)?)
            };
            return Ok(VersionConstraint::Range { lo, hi });
        }
        Ok(VersionConstraint::Exact(Version::parse(text)?))
    }

    /// Check whether a concrete version satisfies this constraint.
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => v == version,
            VersionConstraint::Range { lo, hi } => {
                if let Some(lo) = lo {
                    if version < lo {
                        return false;
                    }
                }
                if let Some(hi) = hi {
                    // The upper bound is inclusive as a prefix: `:1.2`
                    // admits 1.2.5 but not 1.3.
                    if version > hi && !version.has_prefix(hi) {
                        return false;
                    }
                }
                true
            }
            VersionConstraint::List(members) => members.iter().any(|m| m.satisfies(version)),
        }
    }

    /// True when this constraint admits exactly one version.
    pub fn exact_version(&self) -> Option<&Version> {
        match self {
            VersionConstraint::Exact(v) => Some(v),
            VersionConstraint::List(members) if members.len() == 1 => members[0].exact_version(),
            _ => None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, VersionConstraint::Any)
    }

    /// Intersect two constraints. Returns `None` when the intersection is
    /// provably empty, which callers treat as a structural conflict.
    pub fn intersect(&self, other: &VersionConstraint) -> Option<VersionConstraint> {
        use VersionConstraint::*;

        match (self, other) {
            (Any, c) | (c, Any) => Some(c.clone()),
            (Exact(a), Exact(b)) => {
                if a == b {
                    Some(Exact(a.clone()))
                } else {
                    None
                }
            }
            (Exact(v), c) | (c, Exact(v)) => {
                if c.satisfies(v) {
                    Some(Exact(v.clone()))
                } else {
                    None
                }
            }
            (Range { lo: l1, hi: h1 }, Range { lo: l2, hi: h2 }) => {
                let lo = match (l1, l2) {
                    (Some(a), Some(b)) => Some(std::cmp::max(a, b).clone()),
                    (Some(a), None) | (None, Some(a)) => Some(a.clone()),
                    (None, None) => None,
                };
                let hi = match (h1, h2) {
                    (Some(a), Some(b)) => Some(std::cmp::min(a, b).clone()),
                    (Some(a), None) | (None, Some(a)) => Some(a.clone()),
                    (None, None) => None,
                };
                if let (Some(lo), Some(hi)) = (&lo, &hi) {
                    if lo > hi && !lo.has_prefix(hi) {
                        return None;
                    }
                }
                Some(Range { lo, hi })
            }
            (List(members), c) | (c, List(members)) => {
                let joined: Vec<VersionConstraint> = members
                    .iter()
                    .filter_map(|m| m.intersect(c))
                    .collect();
                match joined.len() {
                    0 => None,
                    1 => Some(joined.into_iter().next().unwrap()),
                    _ => Some(List(joined)),
                }
            }
        }
    }

    /// Conservative implication test: true when every version admitted by
    /// `self` is also admitted by `other`. Used for dead-rule elimination.
    pub fn implies(&self, other: &VersionConstraint) -> bool {
        use VersionConstraint::*;

        match (self, other) {
            (_, Any) => true,
            (Any, _) => false,
            (Exact(v), c) => c.satisfies(v),
            // A range admits more than one version (the upper bound is
            // prefix-inclusive even when lo == hi), so it never implies an
            // exact constraint.
            (Range { .. }, Exact(_)) => false,
            (Range { lo: l1, hi: h1 }, Range { lo: l2, hi: h2 }) => {
                let lo_ok = match (l1, l2) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(a), Some(b)) => a >= b,
                };
                let hi_ok = match (h1, h2) {
                    (_, None) => true,
                    (None, Some(_)) => false,
                    (Some(a), Some(b)) => a <= b || a.has_prefix(b),
                };
                lo_ok && hi_ok
            }
            (List(members), c) => members.iter().all(|m| m.implies(c)),
            (c, List(members)) => members.iter().any(|m| c.implies(m)),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, ":"),
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::Range { lo, hi } => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                write!(f, ":")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                Ok(())
            }
            VersionConstraint::List(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}
