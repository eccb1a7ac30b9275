//! Capability types and the fragment declarations attached to them
//!
//! A [`CapabilityType`] is a node of the capability graph: a named contract
//! (its own methods), the contracts it extends, and a [`FragmentDeclaration`]
//! listing the fragments and constraints declared at that node.
//!
//! Declarations are plain data built up front by the assembly layer. Nothing
//! here is validated eagerly; the resolver reports malformed declarations
//! when a graph containing them is resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use quilt_core::{
    Assertion, CapabilityId, Constraint, ConstraintId, CoreFragment, Decorator, FragmentContext,
    FragmentId, Marker, MethodDescriptor, MethodId, QuiltResult, Value, ValueKind,
};

// ============================================================================
// Fragments
// ============================================================================

/// Role a fragment plays in a method chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Primary implementation
    Core,
    /// Wraps the call to the next link
    Decorator,
    /// Pre/post checks
    Assertion,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentKind::Core => f.write_str("core"),
            FragmentKind::Decorator => f.write_str("decorator"),
            FragmentKind::Assertion => f.write_str("assertion"),
        }
    }
}

/// Set of methods a fragment implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surface {
    /// Every method of the contract
    All,
    /// Only the named methods
    Methods(BTreeSet<MethodId>),
}

impl Surface {
    /// Check whether the surface includes a method
    pub fn covers(&self, method: &MethodId) -> bool {
        match self {
            Surface::All => true,
            Surface::Methods(methods) => methods.contains(method),
        }
    }
}

/// Factory for core fragment instances
pub type CoreFactory =
    Arc<dyn Fn(&FragmentContext) -> QuiltResult<Arc<dyn CoreFragment>> + Send + Sync>;
/// Factory for decorator instances
pub type DecoratorFactory =
    Arc<dyn Fn(&FragmentContext) -> QuiltResult<Arc<dyn Decorator>> + Send + Sync>;
/// Factory for assertion instances
pub type AssertionFactory =
    Arc<dyn Fn(&FragmentContext) -> QuiltResult<Arc<dyn Assertion>> + Send + Sync>;

/// Factory producing fragment instances of one kind
#[derive(Clone)]
pub enum FragmentFactory {
    /// Produces core fragments
    Core(CoreFactory),
    /// Produces decorators
    Decorator(DecoratorFactory),
    /// Produces assertions
    Assertion(AssertionFactory),
}

impl FragmentFactory {
    /// Kind of fragment produced
    pub fn kind(&self) -> FragmentKind {
        match self {
            FragmentFactory::Core(_) => FragmentKind::Core,
            FragmentFactory::Decorator(_) => FragmentKind::Decorator,
            FragmentFactory::Assertion(_) => FragmentKind::Assertion,
        }
    }

    /// Check whether both factories are the same closure
    pub fn ptr_eq(&self, other: &FragmentFactory) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        match (self, other) {
            (FragmentFactory::Core(a), FragmentFactory::Core(b)) => addr(a) == addr(b),
            (FragmentFactory::Decorator(a), FragmentFactory::Decorator(b)) => addr(a) == addr(b),
            (FragmentFactory::Assertion(a), FragmentFactory::Assertion(b)) => addr(a) == addr(b),
            _ => false,
        }
    }
}

/// A live fragment instance
#[derive(Clone)]
pub enum FragmentInstance {
    /// Core fragment
    Core(Arc<dyn CoreFragment>),
    /// Decorator
    Decorator(Arc<dyn Decorator>),
    /// Assertion
    Assertion(Arc<dyn Assertion>),
}

impl FragmentInstance {
    /// Kind of this instance
    pub fn kind(&self) -> FragmentKind {
        match self {
            FragmentInstance::Core(_) => FragmentKind::Core,
            FragmentInstance::Decorator(_) => FragmentKind::Decorator,
            FragmentInstance::Assertion(_) => FragmentKind::Assertion,
        }
    }

    /// Get as a core fragment
    pub fn as_core(&self) -> Option<&Arc<dyn CoreFragment>> {
        match self {
            FragmentInstance::Core(c) => Some(c),
            _ => None,
        }
    }

    /// Get as a decorator
    pub fn as_decorator(&self) -> Option<&Arc<dyn Decorator>> {
        match self {
            FragmentInstance::Decorator(d) => Some(d),
            _ => None,
        }
    }

    /// Get as an assertion
    pub fn as_assertion(&self) -> Option<&Arc<dyn Assertion>> {
        match self {
            FragmentInstance::Assertion(a) => Some(a),
            _ => None,
        }
    }

    /// Check whether two instances are the same object
    pub fn ptr_eq(&self, other: &FragmentInstance) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        match (self, other) {
            (FragmentInstance::Core(a), FragmentInstance::Core(b)) => addr(a) == addr(b),
            (FragmentInstance::Decorator(a), FragmentInstance::Decorator(b)) => addr(a) == addr(b),
            (FragmentInstance::Assertion(a), FragmentInstance::Assertion(b)) => addr(a) == addr(b),
            _ => false,
        }
    }
}

impl fmt::Debug for FragmentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FragmentInstance::{}", self.kind())
    }
}

/// A fragment type: identity, surface, markers and factory
///
/// # Example
///
/// ```ignore
/// let audit = FragmentDescriptor::decorator("Audit", |_ctx| Ok(AuditDecorator::default()))
///     .applies_to("audited")
///     .stateless();
/// ```
#[derive(Clone)]
pub struct FragmentDescriptor {
    id: FragmentId,
    surface: Surface,
    method_markers: BTreeMap<MethodId, Vec<Marker>>,
    applies_to: Option<Marker>,
    stateless: bool,
    factory: FragmentFactory,
}

impl FragmentDescriptor {
    fn with_factory(id: FragmentId, factory: FragmentFactory) -> Self {
        Self {
            id,
            surface: Surface::All,
            method_markers: BTreeMap::new(),
            applies_to: None,
            stateless: false,
            factory,
        }
    }

    /// Declare a core fragment
    pub fn core<F, T>(id: impl Into<FragmentId>, factory: F) -> Self
    where
        F: Fn(&FragmentContext) -> QuiltResult<T> + Send + Sync + 'static,
        T: CoreFragment + 'static,
    {
        let factory: CoreFactory = Arc::new(move |ctx: &FragmentContext| {
            factory(ctx).map(|f| Arc::new(f) as Arc<dyn CoreFragment>)
        });
        Self::with_factory(id.into(), FragmentFactory::Core(factory))
    }

    /// Declare a decorator
    pub fn decorator<F, T>(id: impl Into<FragmentId>, factory: F) -> Self
    where
        F: Fn(&FragmentContext) -> QuiltResult<T> + Send + Sync + 'static,
        T: Decorator + 'static,
    {
        let factory: DecoratorFactory = Arc::new(move |ctx: &FragmentContext| {
            factory(ctx).map(|f| Arc::new(f) as Arc<dyn Decorator>)
        });
        Self::with_factory(id.into(), FragmentFactory::Decorator(factory))
    }

    /// Declare an assertion
    pub fn assertion<F, T>(id: impl Into<FragmentId>, factory: F) -> Self
    where
        F: Fn(&FragmentContext) -> QuiltResult<T> + Send + Sync + 'static,
        T: Assertion + 'static,
    {
        let factory: AssertionFactory = Arc::new(move |ctx: &FragmentContext| {
            factory(ctx).map(|f| Arc::new(f) as Arc<dyn Assertion>)
        });
        Self::with_factory(id.into(), FragmentFactory::Assertion(factory))
    }

    /// Restrict the surface to the named methods
    ///
    /// May be called repeatedly; the surface is the union.
    pub fn implements<I, M>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MethodId>,
    {
        let mut set = match self.surface {
            Surface::All => BTreeSet::new(),
            Surface::Methods(set) => set,
        };
        set.extend(methods.into_iter().map(Into::into));
        self.surface = Surface::Methods(set);
        self
    }

    /// Mark this fragment's implementation of `method` with `marker`
    pub fn marked(mut self, method: impl Into<MethodId>, marker: impl Into<Marker>) -> Self {
        self.method_markers
            .entry(method.into())
            .or_default()
            .push(marker.into());
        self
    }

    /// Only apply to methods carrying `marker` (decorators)
    pub fn applies_to(mut self, marker: impl Into<Marker>) -> Self {
        self.applies_to = Some(marker.into());
        self
    }

    /// Share one instance between all composites
    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    /// Fragment identity
    pub fn id(&self) -> &FragmentId {
        &self.id
    }

    /// Fragment kind
    pub fn kind(&self) -> FragmentKind {
        self.factory.kind()
    }

    /// Implementation surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Check whether the fragment implements `method`
    pub fn covers(&self, method: &MethodId) -> bool {
        self.surface.covers(method)
    }

    /// Markers carried by this fragment's implementation of `method`
    pub fn markers_for(&self, method: &MethodId) -> &[Marker] {
        self.method_markers
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check whether this fragment's implementation of `method` carries `marker`
    pub fn carries_marker(&self, method: &MethodId, marker: &Marker) -> bool {
        self.markers_for(method).iter().any(|m| m == marker)
    }

    /// Marker restriction, if any
    pub fn restriction(&self) -> Option<&Marker> {
        self.applies_to.as_ref()
    }

    /// Check whether instances are shared between composites
    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    /// Check whether `other` is a clone of this declaration
    ///
    /// Clones may be declared at several capability types; anything else
    /// sharing the id is a different fragment.
    pub fn is_same_declaration(&self, other: &FragmentDescriptor) -> bool {
        self.id == other.id
            && self.factory.ptr_eq(&other.factory)
            && self.surface == other.surface
            && self.method_markers == other.method_markers
            && self.applies_to == other.applies_to
            && self.stateless == other.stateless
    }

    /// Construct a new instance
    ///
    /// # Errors
    ///
    /// Returns whatever the factory returns.
    pub fn instantiate(&self, ctx: &FragmentContext) -> QuiltResult<FragmentInstance> {
        match &self.factory {
            FragmentFactory::Core(f) => f(ctx).map(FragmentInstance::Core),
            FragmentFactory::Decorator(f) => f(ctx).map(FragmentInstance::Decorator),
            FragmentFactory::Assertion(f) => f(ctx).map(FragmentInstance::Assertion),
        }
    }
}

impl fmt::Debug for FragmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentDescriptor")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("surface", &self.surface)
            .field("method_markers", &self.method_markers)
            .field("applies_to", &self.applies_to)
            .field("stateless", &self.stateless)
            .finish()
    }
}

// ============================================================================
// Constraints
// ============================================================================

/// A constraint serving every parameter that carries its marker
#[derive(Clone)]
pub struct ConstraintDeclaration {
    id: ConstraintId,
    marker: Marker,
    kind: ValueKind,
    predicate: Arc<dyn Constraint>,
}

impl ConstraintDeclaration {
    /// Declare a constraint
    pub fn new(
        id: impl Into<ConstraintId>,
        marker: impl Into<Marker>,
        kind: ValueKind,
        predicate: impl Constraint + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            marker: marker.into(),
            kind,
            predicate: Arc::new(predicate),
        }
    }

    /// Constraint identity
    pub fn id(&self) -> &ConstraintId {
        &self.id
    }

    /// Parameter marker served
    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    /// Kind of value validated
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Evaluate the predicate
    pub fn is_valid(&self, value: &Value) -> bool {
        self.predicate.is_valid(value)
    }
}

impl fmt::Debug for ConstraintDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintDeclaration")
            .field("id", &self.id)
            .field("marker", &self.marker)
            .field("kind", &self.kind)
            .finish()
    }
}

// ============================================================================
// Capability types
// ============================================================================

/// Fragments and constraints declared at one capability type
#[derive(Debug, Clone, Default)]
pub struct FragmentDeclaration {
    /// Core fragments, in declaration order
    pub cores: Vec<FragmentDescriptor>,
    /// Decorators, outermost first
    pub decorators: Vec<FragmentDescriptor>,
    /// Assertions, in declaration order
    pub assertions: Vec<FragmentDescriptor>,
    /// Constraint declarations, in declaration order
    pub constraints: Vec<ConstraintDeclaration>,
}

impl FragmentDeclaration {
    /// Check whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
            && self.decorators.is_empty()
            && self.assertions.is_empty()
            && self.constraints.is_empty()
    }
}

/// A node of the capability graph
///
/// # Example
///
/// ```ignore
/// let account = CapabilityType::contract("Account")
///     .extends("Identity")
///     .method(MethodDescriptor::new("deposit")
///         .param(ParamDescriptor::new("amount", ValueKind::Int).constrained_by("non_negative")))
///     .core(FragmentDescriptor::core("AccountCore", |_| Ok(AccountCore::default())));
/// ```
#[derive(Debug, Clone)]
pub struct CapabilityType {
    id: CapabilityId,
    terminal: bool,
    extends: Vec<CapabilityId>,
    methods: Vec<MethodDescriptor>,
    fragments: FragmentDeclaration,
}

impl CapabilityType {
    /// Declare an abstract contract
    pub fn contract(id: impl Into<CapabilityId>) -> Self {
        Self {
            id: id.into(),
            terminal: false,
            extends: Vec::new(),
            methods: Vec::new(),
            fragments: FragmentDeclaration::default(),
        }
    }

    /// Declare a concrete type that cannot be walked as a contract
    pub fn terminal(id: impl Into<CapabilityId>) -> Self {
        Self {
            terminal: true,
            ..Self::contract(id)
        }
    }

    /// Extend another capability type
    pub fn extends(mut self, id: impl Into<CapabilityId>) -> Self {
        self.extends.push(id.into());
        self
    }

    /// Declare a method of the contract
    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.declared_by = self.id.clone();
        self.methods.push(method);
        self
    }

    /// Declare a core fragment
    pub fn core(mut self, fragment: FragmentDescriptor) -> Self {
        self.fragments.cores.push(fragment);
        self
    }

    /// Declare a decorator; earlier declarations wrap later ones
    pub fn decorator(mut self, fragment: FragmentDescriptor) -> Self {
        self.fragments.decorators.push(fragment);
        self
    }

    /// Declare an assertion
    pub fn assertion(mut self, fragment: FragmentDescriptor) -> Self {
        self.fragments.assertions.push(fragment);
        self
    }

    /// Declare a constraint
    pub fn constraint(mut self, constraint: ConstraintDeclaration) -> Self {
        self.fragments.constraints.push(constraint);
        self
    }

    /// Type identity
    pub fn id(&self) -> &CapabilityId {
        &self.id
    }

    /// Check whether the type is concrete rather than a contract
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Directly extended types, in declaration order
    pub fn super_capabilities(&self) -> &[CapabilityId] {
        &self.extends
    }

    /// Methods declared at this node
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Fragments declared at this node
    pub fn fragments(&self) -> &FragmentDeclaration {
        &self.fragments
    }
}
