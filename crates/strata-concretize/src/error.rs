use thiserror::Error;

/// Errors surfaced by the concretization engine.
///
/// Structural errors (`SpecSyntax`, `UnknownPackage`) are detected before
/// solving and never retried. `Unsatisfiable` carries a best-effort minimal
/// explanation of the conflicting facts. `SolverTimeout` is a normal failure
/// mode; the engine never auto-retries it.
#[derive(Error, Debug)]
pub enum ConcretizeError {
    #[error("Package not found: {name}")]
    UnknownPackage { name: String },

    #[error("Invalid spec `{spec}`: {message}")]
    SpecSyntax { spec: String, message: String },

    #[error("Cannot satisfy `{spec}`: {message}")]
    Unsatisfiable {
        spec: String,
        message: String,
        /// The conflicting facts this failure was derived from, when known.
        conflicts: Vec<String>,
    },

    #[error("Solve made no progress; unsolved roots: {}", unsolved.join(", "))]
    OutputDoesNotSatisfyInput { unsolved: Vec<String> },

    #[error("Solver exceeded its budget after {attempts} candidate attempts")]
    SolverTimeout { attempts: u64 },

    #[error("Version discovery produced no usable results ({} failures)", errors.len())]
    DiscoveryFailed { errors: Vec<String> },

    #[error(transparent)]
    Version(#[from] strata_spec::VersionError),
}

impl ConcretizeError {
    pub fn unsatisfiable(spec: impl Into<String>, message: impl Into<String>) -> Self {
        ConcretizeError::Unsatisfiable {
            spec: spec.into(),
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    pub fn with_conflicts(self, conflicts: Vec<String>) -> Self {
        match self {
            ConcretizeError::Unsatisfiable { spec, message, .. } => {
                ConcretizeError::Unsatisfiable {
                    spec,
                    message,
                    conflicts,
                }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConcretizeError>;
