use std::fmt;

use serde::{Deserialize, Serialize};

/// An architecture triple: platform, operating system, target.
///
/// Every component is optional on an abstract spec; a concrete spec must
/// have all three filled in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ArchSpec {
    pub platform: Option<String>,
    pub os: Option<String>,
    pub target: Option<String>,
}

impl ArchSpec {
    pub fn new(
        platform: impl Into<String>,
        os: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            platform: Some(platform.into()),
            os: Some(os.into()),
            target: Some(target.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.os.is_none() && self.target.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.platform.is_some() && self.os.is_some() && self.target.is_some()
    }

    /// Componentwise satisfaction: an unset component admits anything.
    pub fn satisfied_by(&self, concrete: &ArchSpec) -> bool {
        fn ok(wanted: &Option<String>, actual: &Option<String>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual.as_deref() == Some(w.as_str()),
            }
        }
        ok(&self.platform, &concrete.platform)
            && ok(&self.os, &concrete.os)
            && ok(&self.target, &concrete.target)
    }

    /// True when every arch admitted by `self` is admitted by `other`.
    pub fn implies(&self, other: &ArchSpec) -> bool {
        fn comp_ok(narrow: &Option<String>, broad: &Option<String>) -> bool {
            match broad {
                None => true,
                Some(b) => narrow.as_deref() == Some(b.as_str()),
            }
        }
        comp_ok(&self.platform, &other.platform)
            && comp_ok(&self.os, &other.os)
            && comp_ok(&self.target, &other.target)
    }

    /// Merge two partial arch constraints. Returns `None` on a componentwise
    /// conflict.
    pub fn merge(&self, other: &ArchSpec) -> Option<ArchSpec> {
        fn join(a: &Option<String>, b: &Option<String>) -> Result<Option<String>, ()> {
            match (a, b) {
                (Some(x), Some(y)) if x != y => Err(()),
                (Some(x), _) => Ok(Some(x.clone())),
                (None, y) => Ok(y.clone()),
            }
        }
        Some(ArchSpec {
            platform: join(&self.platform, &other.platform).ok()?,
            os: join(&self.os, &other.os).ok()?,
            target: join(&self.target, &other.target).ok()?,
        })
    }

    /// Fill unset components from a host default.
    pub fn concretized_against(&self, host: &ArchSpec) -> ArchSpec {
        ArchSpec {
            platform: self.platform.clone().or_else(|| host.platform.clone()),
            os: self.os.clone().or_else(|| host.os.clone()),
            target: self.target.clone().or_else(|| host.target.clone()),
        }
    }
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |c: &Option<String>| c.as_deref().unwrap_or("*").to_string();
        write!(
            f,
            "{}-{}-{}",
            part(&self.platform),
            part(&self.os),
            part(&self.target)
        )
    }
}
