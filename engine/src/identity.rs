//! Identity strings.
//!
//! A resource instance is named by its location in the store:
//! `database`, `database/collection` or `database/collection/index`.
//! The same decoder validates identities supplied for import.

use crate::error::Result;
use crate::Error;

const SEPARATOR: char = '/';

/// The expected shape of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Database,
    Collection,
    Index,
}

impl Shape {
    /// Number of segments an identity of this shape has.
    pub fn segments(&self) -> usize {
        match self {
            Shape::Database => 1,
            Shape::Collection => 2,
            Shape::Index => 3,
        }
    }

    /// Human-readable format, used in error messages.
    pub fn format(&self) -> &'static str {
        match self {
            Shape::Database => "database",
            Shape::Collection => "database/collection",
            Shape::Index => "database/collection/index",
        }
    }
}

/// Join identity segments.
pub fn encode(parts: &[&str]) -> String {
    parts.join("/")
}

/// Split an identity into its segments, checking it has the given shape.
pub fn decode(identity: &str, shape: Shape) -> Result<Vec<String>> {
    let trimmed = identity.trim();
    let invalid = || Error::InvalidIdentity {
        identity: identity.to_string(),
        expected: shape.format(),
    };

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let parts: Vec<&str> = trimmed.split(SEPARATOR).collect();
    if parts.len() != shape.segments() || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }

    Ok(parts.into_iter().map(str::to_string).collect())
}

/// Check that a name can be used as one identity segment.
pub fn check_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if value.contains(SEPARATOR) {
        return Err(Error::validation(
            field,
            format!("must not contain '{SEPARATOR}', got {value:?}"),
        ));
    }
    // decode trims, so padded names would not survive import
    if value.trim() != value {
        return Err(Error::validation(
            field,
            format!("must not start or end with whitespace, got {value:?}"),
        ));
    }
    Ok(())
}
