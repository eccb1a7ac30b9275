//! Core identifier and descriptor types
//!
//! This module defines:
//! - CapabilityId, FragmentId, MethodId, Marker, ConstraintId: string identifiers
//! - ValueKind: Expected kind of a parameter or constraint input
//! - ParamDescriptor / MethodDescriptor: Method signatures of a capability contract

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check whether the identifier is empty
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

pub(crate) use string_id;

string_id!(
    /// Identifier of a capability type (an abstract behavioral contract)
    CapabilityId
);

string_id!(
    /// Identifier of a fragment type (core, decorator or assertion)
    FragmentId
);

string_id!(
    /// Name of a method of a capability contract
    MethodId
);

string_id!(
    /// Marker carried by methods, parameters or fragment implementations
    ///
    /// Decorators may be restricted to methods carrying a marker, and
    /// parameters carry constraint markers that select constraint declarations.
    Marker
);

string_id!(
    /// Identifier of a constraint declaration
    ConstraintId
);

/// Expected kind of a value
///
/// `Any` accepts every value. Other kinds accept exactly one `Value` variant;
/// there are no implicit coercions (`Int` does not accept `Float`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Any value
    Any,
    /// `Value::Null`
    Null,
    /// `Value::Bool`
    Bool,
    /// `Value::Int`
    Int,
    /// `Value::Float`
    Float,
    /// `Value::String`
    String,
    /// `Value::Bytes`
    Bytes,
    /// `Value::Array`
    Array,
    /// `Value::Object`
    Object,
    /// `Value::Handle`
    Handle,
}

impl ValueKind {
    /// Check whether a value is of this kind
    pub fn accepts(&self, value: &Value) -> bool {
        *self == ValueKind::Any || *self == value.kind()
    }

    /// Check whether a constraint of this kind can validate a parameter of `other` kind
    pub fn compatible_with(&self, other: ValueKind) -> bool {
        *self == ValueKind::Any || other == ValueKind::Any || *self == other
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A parameter of a capability method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    /// Parameter name (used in error messages)
    pub name: String,
    /// Expected kind of the argument
    pub kind: ValueKind,
    /// Constraint markers; each selects constraint declarations by marker
    pub constraints: Vec<Marker>,
}

impl ParamDescriptor {
    /// Create a parameter with no constraints
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint marker to this parameter
    pub fn constrained_by(mut self, marker: impl Into<Marker>) -> Self {
        self.constraints.push(marker.into());
        self
    }
}

/// A method signature of a capability contract
///
/// `declared_by` is filled in when the method is added to a capability type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Method name; unique within a capability graph
    pub name: MethodId,
    /// Capability type that declares the method
    pub declared_by: CapabilityId,
    /// Ordered parameters
    pub params: Vec<ParamDescriptor>,
    /// Markers carried by the method declaration
    pub markers: Vec<Marker>,
}

impl MethodDescriptor {
    /// Create a method without parameters or markers
    pub fn new(name: impl Into<MethodId>) -> Self {
        Self {
            name: name.into(),
            declared_by: CapabilityId::new(""),
            params: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Add a marker to the method
    pub fn marked(mut self, marker: impl Into<Marker>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Check whether the method declaration carries a marker
    pub fn has_marker(&self, marker: &Marker) -> bool {
        self.markers.iter().any(|m| m == marker)
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}
