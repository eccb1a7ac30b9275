//! Capability graph traversal
//!
//! Walk order is depth-first, left-to-right: a node, then each of its super
//! capabilities in declaration order. Every node is visited once even when
//! reachable along several paths (diamonds). This order is what makes
//! resolution deterministic, so nothing here may depend on hash order.

use rustc_hash::FxHashSet;

use quilt_core::{CapabilityId, MethodDescriptor, QuiltError, QuiltResult};

use crate::declaration::CapabilityType;
use crate::registry::CapabilityRegistry;

/// Walk a capability type and everything it extends
///
/// # Errors
///
/// - `UnknownCapability` if the type or a super capability is not registered
/// - `NotAContract` if a walked type is terminal
/// - `CyclicCapability` if the graph loops back onto the current path
pub fn walk<'r>(
    registry: &'r CapabilityRegistry,
    capability: &CapabilityId,
) -> QuiltResult<Vec<&'r CapabilityType>> {
    let mut walker = Walker {
        registry,
        visited: FxHashSet::default(),
        path: Vec::new(),
        out: Vec::new(),
    };
    walker.visit(capability, None)?;
    Ok(walker.out)
}

/// Methods of a walked graph, in walk order
///
/// A method name declared at several nodes keeps its first declaration.
pub fn abstract_methods(walked: &[&CapabilityType]) -> Vec<MethodDescriptor> {
    let mut seen = FxHashSet::default();
    walked
        .iter()
        .flat_map(|ty| ty.methods())
        .filter(|m| seen.insert(m.name.clone()))
        .cloned()
        .collect()
}

struct Walker<'r> {
    registry: &'r CapabilityRegistry,
    visited: FxHashSet<CapabilityId>,
    path: Vec<CapabilityId>,
    out: Vec<&'r CapabilityType>,
}

impl<'r> Walker<'r> {
    fn visit(&mut self, id: &CapabilityId, extended_by: Option<&CapabilityId>) -> QuiltResult<()> {
        if let Some(pos) = self.path.iter().position(|p| p == id) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(id.clone());
            return Err(QuiltError::CyclicCapability { path: cycle });
        }
        if self.visited.contains(id) {
            return Ok(());
        }

        let ty = self.registry.require(id)?;
        if ty.is_terminal() {
            let reason = match extended_by {
                Some(parent) => format!("terminal type extended by '{}'", parent),
                None => "terminal types cannot be instantiated as capabilities".to_string(),
            };
            return Err(QuiltError::NotAContract {
                capability: id.clone(),
                reason,
            });
        }

        self.visited.insert(id.clone());
        self.out.push(ty);
        self.path.push(id.clone());
        for parent in ty.super_capabilities() {
            self.visit(parent, Some(id))?;
        }
        self.path.pop();
        Ok(())
    }
}
