//! Error types for instance import, store construction and witness validation.

use std::error::Error;
use std::fmt;

use crate::store::{Color, Vertex};

/// Failures while reading a graph instance from a token stream.
#[derive(Debug)]
pub enum ImportError {
    IoError(std::io::Error),
    InputMalformedError,
    BadIntError(std::num::ParseIntError),
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> ImportError {
        ImportError::IoError(e)
    }
}

impl From<std::num::ParseIntError> for ImportError {
    fn from(e: std::num::ParseIntError) -> ImportError {
        ImportError::BadIntError(e)
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "Import: could not read the instance ({})", e),
            Self::InputMalformedError => {
                write!(f, "Import: instance is truncated or malformed")
            }
            Self::BadIntError(e) => write!(f, "Import: expected an integer token ({})", e),
        }
    }
}

impl Error for ImportError {}

/// Construction-time violations of the candidate store's invariants. These are
/// caller errors and are never expected during recursive solving, which only
/// builds constraints from already validated pairs.
#[derive(Debug, Eq, PartialEq)]
pub enum StoreError {
    /// The allowed-color set of `vertex` would grow beyond the configured maximum.
    Capacity { vertex: Vertex, limit: usize },
    /// A constraint of arity `found` exceeds the configured maximum arity.
    Size { found: usize, limit: usize },
    /// A constraint or candidate references a vertex outside the active set, or a
    /// color that is not currently allowed for its vertex.
    Domain { vertex: Vertex, color: Option<Color> },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity { vertex, limit } => {
                write!(
                    f,
                    "Capacity: allowed colors of vertex {} would exceed {}",
                    vertex, limit
                )
            }
            Self::Size { found, limit } => {
                write!(f, "Size: constraint arity {} exceeds {}", found, limit)
            }
            Self::Domain {
                vertex,
                color: Some(color),
            } => {
                write!(
                    f,
                    "Domain: color {} is not allowed for vertex {}",
                    color, vertex
                )
            }
            Self::Domain {
                vertex,
                color: None,
            } => {
                write!(f, "Domain: vertex {} is not in the active set", vertex)
            }
        }
    }
}

impl Error for StoreError {}

#[derive(Debug)]
pub enum ProcessingError {
    /// A solver reported SAT but produced a coloring that does not satisfy its
    /// own instance.
    InvalidColoring(String),
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidColoring(msg) => write!(f, "Invalid coloring: {}", msg),
        }
    }
}

impl Error for ProcessingError {}
