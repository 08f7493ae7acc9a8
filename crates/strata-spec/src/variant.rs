use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete value for a variant: boolean, single-valued, or multi-valued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    Multi(BTreeSet<String>),
}

impl VariantValue {
    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VariantValue::Multi(values.into_iter().map(Into::into).collect())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariantValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantValue::Bool(b) => write!(f, "{}", b),
            VariantValue::Single(s) => write!(f, "{}", s),
            VariantValue::Multi(values) => {
                let parts: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// A requested value for a named variant on an abstract spec.
///
/// `propagate` marks constraints written with `++`/`~~`/`==` syntax that
/// apply to the whole transitive dependency subtree, not just the node they
/// are written on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantConstraint {
    pub name: String,
    pub value: VariantValue,
    pub propagate: bool,
}

impl VariantConstraint {
    pub fn new(name: impl Into<String>, value: VariantValue) -> Self {
        Self {
            name: name.into(),
            value,
            propagate: false,
        }
    }

    pub fn enabled(name: impl Into<String>) -> Self {
        Self::new(name, VariantValue::Bool(true))
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self::new(name, VariantValue::Bool(false))
    }

    pub fn propagated(mut self) -> Self {
        self.propagate = true;
        self
    }

    /// Whether a concrete value satisfies this constraint. Multi-valued
    /// requests are satisfied by any superset.
    pub fn satisfied_by(&self, value: &VariantValue) -> bool {
        match (&self.value, value) {
            (VariantValue::Multi(wanted), VariantValue::Multi(actual)) => {
                wanted.is_subset(actual)
            }
            (wanted, actual) => wanted == actual,
        }
    }
}

impl fmt::Display for VariantConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigil = |on: bool| -> &'static str {
            match (on, self.propagate) {
                (true, false) => "+",
                (true, true) => "++",
                (false, false) => "~",
                (false, true) => "~~",
            }
        };
        match &self.value {
            VariantValue::Bool(b) => write!(f, "{}{}", sigil(*b), self.name),
            value => {
                let eq = if self.propagate { "==" } else { "=" };
                write!(f, "{}{}{}", self.name, eq, value)
            }
        }
    }
}
