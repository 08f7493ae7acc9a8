use std::fmt;

use serde::{Deserialize, Serialize};

/// The phases a dependency edge is needed in.
///
/// Build-only edges are exempt from the acyclicity requirement on the final
/// graph; link and run edges are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DepTypes {
    pub build: bool,
    pub link: bool,
    pub run: bool,
    pub test: bool,
}

impl DepTypes {
    pub const NONE: DepTypes = DepTypes {
        build: false,
        link: false,
        run: false,
        test: false,
    };

    pub const BUILD: DepTypes = DepTypes {
        build: true,
        ..DepTypes::NONE
    };

    pub const LINK: DepTypes = DepTypes {
        link: true,
        ..DepTypes::NONE
    };

    pub const RUN: DepTypes = DepTypes {
        run: true,
        ..DepTypes::NONE
    };

    pub const TEST: DepTypes = DepTypes {
        test: true,
        ..DepTypes::NONE
    };

    /// The default for an unannotated dependency: needed to build and link.
    pub const DEFAULT: DepTypes = DepTypes {
        build: true,
        link: true,
        ..DepTypes::NONE
    };

    pub fn union(self, other: DepTypes) -> DepTypes {
        DepTypes {
            build: self.build || other.build,
            link: self.link || other.link,
            run: self.run || other.run,
            test: self.test || other.test,
        }
    }

    pub fn is_subset_of(self, other: DepTypes) -> bool {
        (!self.build || other.build)
            && (!self.link || other.link)
            && (!self.run || other.run)
            && (!self.test || other.test)
    }

    /// True when the two sets share no phase. Disjoint edges to the same
    /// package may resolve to distinct concrete nodes.
    pub fn is_disjoint_from(self, other: DepTypes) -> bool {
        !(self.build && other.build)
            && !(self.link && other.link)
            && !(self.run && other.run)
            && !(self.test && other.test)
    }

    /// True when the target must be present past build time.
    pub fn is_binding(self) -> bool {
        self.link || self.run
    }

    pub fn is_empty(self) -> bool {
        !(self.build || self.link || self.run || self.test)
    }
}

impl fmt::Display for DepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.build {
            parts.push("build");
        }
        if self.link {
            parts.push("link");
        }
        if self.run {
            parts.push("run");
        }
        if self.test {
            parts.push("test");
        }
        write!(f, "{}", parts.join(","))
    }
}
