use std::fmt;

/// Errors surfaced by template compilation and path building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path template could not be parsed.
    InvalidTemplate { template: String, reason: String },
    /// `build_route_path` was asked for a name the tree does not contain.
    UnknownRoute { name: String },
    /// A URL param required by the template was not supplied.
    MissingParam { name: String, param: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::InvalidTemplate { template, reason } => {
                write!(f, "invalid path template '{}': {}", template, reason)
            }
            PathError::UnknownRoute { name } => {
                write!(f, "no route named '{}' in the tree", name)
            }
            PathError::MissingParam { name, param } => {
                write!(f, "cannot build path for '{}': missing param '{}'", name, param)
            }
        }
    }
}

impl std::error::Error for PathError {}
