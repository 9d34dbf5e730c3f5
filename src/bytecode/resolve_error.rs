use thiserror::Error;

use crate::token::Location;

/// Errors found while turning label references into addresses.
///
/// Resolution is all-or-nothing: any of these means no program was produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// `@name` with no matching `:name:` anywhere in the same input.
    #[error("reference to unknown label in {location}: @{name}")]
    UnknownLabel { name: String, location: Location },

    /// `:name:` defined a second time.
    #[error("label '{name}' redefined in {location} (first defined in {first})")]
    DuplicateLabel {
        name: String,
        location: Location,
        first: Location,
    },

    /// An instruction would land past the last representable address.
    #[error("program does not fit in the address space at {location}")]
    AddressOverflow { location: Location },
}

impl ResolveError {
    pub fn location(&self) -> &Location {
        match self {
            ResolveError::UnknownLabel { location, .. } => location,
            ResolveError::DuplicateLabel { location, .. } => location,
            ResolveError::AddressOverflow { location } => location,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ResolveError::UnknownLabel { name, .. } => Some(name),
            ResolveError::DuplicateLabel { name, .. } => Some(name),
            ResolveError::AddressOverflow { .. } => None,
        }
    }
}
