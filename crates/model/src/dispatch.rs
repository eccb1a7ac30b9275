//! Immutable dispatch model
//!
//! A [`DispatchModel`] is the result of resolving one capability type:
//! a table of the distinct fragments involved, and per abstract method a
//! [`MethodChain`] indexing into that table. Composite instances keep one
//! fragment slot per table entry, so the same fragment serving several
//! methods is instantiated once per composite.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use quilt_core::{CapabilityId, ConstraintId, FragmentId, MethodDescriptor, MethodId};

use crate::declaration::{ConstraintDeclaration, FragmentDescriptor};

/// How a model will be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionMode {
    /// New composites: every method needs a core fragment
    Instantiate,
    /// Wrapping an existing object: the object serves as core
    Wrap,
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMode::Instantiate => f.write_str("instantiate"),
            ResolutionMode::Wrap => f.write_str("wrap"),
        }
    }
}

/// Constraints applying to one parameter
#[derive(Debug, Clone)]
pub struct ParamConstraints {
    /// Parameter position
    pub index: usize,
    /// Parameter name
    pub parameter: String,
    /// Constraints in resolution order
    pub constraints: Vec<ConstraintDeclaration>,
}

/// Resolved chain of one method
#[derive(Debug, Clone)]
pub struct MethodChain {
    /// Method signature
    pub method: MethodDescriptor,
    /// Core fragment (table index); `None` only in [`ResolutionMode::Wrap`]
    pub core: Option<usize>,
    /// Decorators (table indices), outermost first
    pub decorators: SmallVec<[usize; 4]>,
    /// Assertions (table indices), in declaration order
    pub assertions: SmallVec<[usize; 2]>,
    /// Per-parameter constraints; parameters without constraints are omitted
    pub constraints: Vec<ParamConstraints>,
}

/// Resolved dispatch model of one capability type
#[derive(Debug)]
pub struct DispatchModel {
    capability: CapabilityId,
    mode: ResolutionMode,
    walked: Vec<CapabilityId>,
    fragments: Vec<FragmentDescriptor>,
    methods: Vec<MethodChain>,
    index: FxHashMap<MethodId, usize>,
}

impl DispatchModel {
    pub(crate) fn new(
        capability: CapabilityId,
        mode: ResolutionMode,
        walked: Vec<CapabilityId>,
        fragments: Vec<FragmentDescriptor>,
        methods: Vec<MethodChain>,
    ) -> Self {
        let index = methods
            .iter()
            .enumerate()
            .map(|(i, chain)| (chain.method.name.clone(), i))
            .collect();
        Self {
            capability,
            mode,
            walked,
            fragments,
            methods,
            index,
        }
    }

    /// Capability type the model was resolved for
    pub fn capability(&self) -> &CapabilityId {
        &self.capability
    }

    /// Resolution mode
    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Walked capability types, in walk order
    pub fn walked(&self) -> &[CapabilityId] {
        &self.walked
    }

    /// Check whether the capability is, or extends, `capability`
    pub fn conforms_to(&self, capability: &CapabilityId) -> bool {
        self.walked.iter().any(|c| c == capability)
    }

    /// Distinct fragments used by the model
    pub fn fragments(&self) -> &[FragmentDescriptor] {
        &self.fragments
    }

    /// Fragment by table index
    pub fn fragment(&self, index: usize) -> Option<&FragmentDescriptor> {
        self.fragments.get(index)
    }

    /// Method chains, in method-table order
    pub fn methods(&self) -> &[MethodChain] {
        &self.methods
    }

    /// Chain of a method, by name
    pub fn method(&self, name: &str) -> Option<&MethodChain> {
        self.index.get(name).map(|&i| &self.methods[i])
    }

    /// Comparable summary of the resolved chains
    pub fn summary(&self) -> Vec<ChainSummary> {
        let id = |i: &usize| self.fragments[*i].id().clone();
        self.methods
            .iter()
            .map(|chain| ChainSummary {
                method: chain.method.name.clone(),
                core: chain.core.as_ref().map(id),
                decorators: chain.decorators.iter().map(id).collect(),
                assertions: chain.assertions.iter().map(id).collect(),
                constraints: chain
                    .constraints
                    .iter()
                    .map(|p| {
                        (
                            p.parameter.clone(),
                            p.constraints.iter().map(|c| c.id().clone()).collect(),
                        )
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Fragment ids of one resolved chain, for inspection and comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSummary {
    /// Method name
    pub method: MethodId,
    /// Core fragment
    pub core: Option<FragmentId>,
    /// Decorators, outermost first
    pub decorators: Vec<FragmentId>,
    /// Assertions
    pub assertions: Vec<FragmentId>,
    /// Constraint ids per parameter name
    pub constraints: Vec<(String, Vec<ConstraintId>)>,
}
