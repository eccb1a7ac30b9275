//! Error types for Quilt
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into three groups:
//! - Configuration: raised while building a dispatch model, never retried
//! - Invocation: raised while dispatching a call through a composite
//! - Persistence: raised by units of work and the concurrency check

use std::fmt;
use thiserror::Error;

use crate::entity::{EntityReference, ModuleId};
use crate::types::{CapabilityId, ConstraintId, FragmentId, Marker, MethodId};
use crate::value::Value;

/// Result type alias for Quilt operations
pub type QuiltResult<T> = std::result::Result<T, QuiltError>;

/// Phase in which an assertion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionPhase {
    /// Before the decorator chain
    Pre,
    /// After the core fragment returned
    Post,
}

impl fmt::Display for AssertionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionPhase::Pre => f.write_str("pre"),
            AssertionPhase::Post => f.write_str("post"),
        }
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Error types for Quilt
#[derive(Debug, Error)]
pub enum QuiltError {
    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    /// Capability type is not registered
    #[error("Unknown capability type '{0}'")]
    UnknownCapability(CapabilityId),

    /// Capability type registered twice
    #[error("Capability type '{0}' is registered more than once")]
    DuplicateCapability(CapabilityId),

    /// Two different fragment declarations share one id
    #[error("Fragment id '{fragment}' is declared by both '{first}' and '{second}'")]
    DuplicateFragment {
        /// Shared id
        fragment: FragmentId,
        /// Type carrying the first declaration
        first: CapabilityId,
        /// Type carrying the conflicting declaration
        second: CapabilityId,
    },

    /// Type is terminal (concrete) and cannot be walked as a contract
    #[error("'{capability}' is not a contract type: {reason}")]
    NotAContract {
        /// Offending type
        capability: CapabilityId,
        /// Why it is not a contract
        reason: String,
    },

    /// Capability graph contains a cycle
    #[error("Capability graph contains a cycle: {}", join(.path, " -> "))]
    CyclicCapability {
        /// Types along the cycle, first type repeated at the end
        path: Vec<CapabilityId>,
    },

    /// No core fragment implements a method
    #[error("No core fragment implements method '{method}' of '{capability}'")]
    MissingFragment {
        /// Capability being resolved
        capability: CapabilityId,
        /// Method without implementation
        method: MethodId,
    },

    /// A declaration is missing required metadata or is inconsistent
    #[error("Malformed declaration on '{capability}': {reason}")]
    MalformedDeclaration {
        /// Capability type carrying the declaration
        capability: CapabilityId,
        /// What is wrong
        reason: String,
    },

    /// A parameter carries a constraint marker that nothing declares
    #[error(
        "Parameter '{parameter}' of '{capability}.{method}' carries constraint marker '{marker}' with no declaration"
    )]
    UnresolvedConstraint {
        /// Capability being resolved
        capability: CapabilityId,
        /// Method declaring the parameter
        method: MethodId,
        /// Parameter name
        parameter: String,
        /// Marker without declaration
        marker: Marker,
    },

    /// Runtime configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------
    /// Method is not part of the capability contract
    #[error("'{capability}' has no method '{method}'")]
    UnknownMethod {
        /// Capability of the composite
        capability: CapabilityId,
        /// Requested method
        method: MethodId,
    },

    /// Arguments do not match the method signature
    #[error("Invalid argument for '{capability}.{method}': {reason}")]
    InvalidArgument {
        /// Capability of the composite
        capability: CapabilityId,
        /// Invoked method
        method: MethodId,
        /// What is wrong
        reason: String,
    },

    /// A constraint rejected an argument
    #[error(
        "Constraint '{constraint}' rejected argument '{parameter}' = {value} of '{capability}.{method}'"
    )]
    ConstraintViolation {
        /// Capability of the composite
        capability: CapabilityId,
        /// Invoked method
        method: MethodId,
        /// Parameter name
        parameter: String,
        /// Rejecting constraint
        constraint: ConstraintId,
        /// Offending argument
        value: Value,
    },

    /// An assertion failed
    #[error("Assertion '{assertion}' ({phase}) failed on '{capability}.{method}': {message}")]
    AssertionFailed {
        /// Capability of the composite
        capability: CapabilityId,
        /// Invoked method
        method: MethodId,
        /// Failing assertion fragment
        assertion: FragmentId,
        /// Whether it ran before or after the core
        phase: AssertionPhase,
        /// Message returned by the assertion
        message: String,
    },

    /// A fragment reported its own failure
    #[error("Fragment '{fragment}' failed: {message}")]
    Fragment {
        /// Failing fragment
        fragment: FragmentId,
        /// Failure message
        message: String,
    },

    /// A fragment could not be constructed
    #[error("Could not instantiate fragment '{fragment}': {message}")]
    Instantiation {
        /// Fragment type
        fragment: FragmentId,
        /// Failure message
        message: String,
    },

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------
    /// Entity does not exist in the store
    #[error("Entity '{0}' not found")]
    EntityNotFound(EntityReference),

    /// Entity with this identity already exists
    #[error("Entity '{0}' already exists")]
    EntityAlreadyExists(EntityReference),

    /// Entities read by a unit-of-work were changed by another committed unit-of-work
    #[error("Concurrent modification in module '{module}' of: {}", join(.identities, ", "))]
    ConcurrentModification {
        /// Module of the unit-of-work
        module: ModuleId,
        /// Changed entities
        identities: Vec<EntityReference>,
    },

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl QuiltError {
    /// Fragment failure with a message
    pub fn fragment(fragment: impl Into<FragmentId>, message: impl Into<String>) -> Self {
        QuiltError::Fragment {
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    /// Storage failure with a message
    pub fn storage(message: impl Into<String>) -> Self {
        QuiltError::Storage(message.into())
    }

    /// Check whether this is a configuration error (fatal at model build time)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            QuiltError::UnknownCapability(_)
                | QuiltError::DuplicateCapability(_)
                | QuiltError::DuplicateFragment { .. }
                | QuiltError::NotAContract { .. }
                | QuiltError::CyclicCapability { .. }
                | QuiltError::MissingFragment { .. }
                | QuiltError::MalformedDeclaration { .. }
                | QuiltError::UnresolvedConstraint { .. }
                | QuiltError::InvalidConfig(_)
        )
    }

    /// Check whether this is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, QuiltError::ConcurrentModification { .. })
    }
}
