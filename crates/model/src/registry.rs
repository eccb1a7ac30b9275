//! Registry of declared capability types
//!
//! The assembly layer registers every capability type once, up front, and
//! hands the finished registry to a [`ModelCache`](crate::ModelCache).
//! The registry is immutable after `build()`.
//!
//! A fragment id names one declaration across the whole registry: the
//! fragment pool and the resolver's fragment table are keyed by it. The
//! same descriptor (or a clone of it) may be declared at several types.

use rustc_hash::FxHashMap;

use quilt_core::{CapabilityId, FragmentId, QuiltError, QuiltResult};

use crate::declaration::{CapabilityType, FragmentDescriptor};

/// Immutable set of capability types, keyed by id
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    types: FxHashMap<CapabilityId, CapabilityType>,
    order: Vec<CapabilityId>,
}

impl CapabilityRegistry {
    /// Start building a registry
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// Look up a capability type
    pub fn get(&self, id: &CapabilityId) -> Option<&CapabilityType> {
        self.types.get(id)
    }

    /// Look up a capability type, failing if it is not registered
    ///
    /// # Errors
    ///
    /// `UnknownCapability` if `id` was never registered.
    pub fn require(&self, id: &CapabilityId) -> QuiltResult<&CapabilityType> {
        self.get(id)
            .ok_or_else(|| QuiltError::UnknownCapability(id.clone()))
    }

    /// Check whether a capability type is registered
    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.types.contains_key(id)
    }

    /// Registered ids, in registration order
    pub fn ids(&self) -> impl Iterator<Item = &CapabilityId> {
        self.order.iter()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builder for [`CapabilityRegistry`]
#[derive(Debug, Default)]
pub struct CapabilityRegistryBuilder {
    types: Vec<CapabilityType>,
}

impl CapabilityRegistryBuilder {
    /// Register a capability type
    pub fn register(mut self, capability: CapabilityType) -> Self {
        self.types.push(capability);
        self
    }

    /// Finish the registry
    ///
    /// # Errors
    ///
    /// - `DuplicateCapability` if an id is registered twice
    /// - `DuplicateFragment` if two different fragment declarations share an id
    /// - `MalformedDeclaration` if an id is empty
    pub fn build(self) -> QuiltResult<CapabilityRegistry> {
        let mut registry = CapabilityRegistry::default();
        for capability in self.types {
            let id = capability.id().clone();
            if id.is_empty() {
                return Err(QuiltError::MalformedDeclaration {
                    capability: id,
                    reason: "capability type has an empty id".to_string(),
                });
            }
            if registry.types.contains_key(&id) {
                return Err(QuiltError::DuplicateCapability(id));
            }
            registry.order.push(id.clone());
            registry.types.insert(id, capability);
        }
        check_fragment_ids(&registry)?;
        Ok(registry)
    }
}

fn check_fragment_ids(registry: &CapabilityRegistry) -> QuiltResult<()> {
    let mut seen: FxHashMap<&FragmentId, (&CapabilityId, &FragmentDescriptor)> =
        FxHashMap::default();
    for ty in registry.order.iter().filter_map(|id| registry.get(id)) {
        let declared = ty.fragments();
        let fragments = declared
            .cores
            .iter()
            .chain(&declared.decorators)
            .chain(&declared.assertions);
        for fragment in fragments {
            match seen.get(fragment.id()) {
                Some((first, existing)) if !existing.is_same_declaration(fragment) => {
                    return Err(QuiltError::DuplicateFragment {
                        fragment: fragment.id().clone(),
                        first: (*first).clone(),
                        second: ty.id().clone(),
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(fragment.id(), (ty.id(), fragment));
                }
            }
        }
    }
    Ok(())
}
