//! Fragment resolution
//!
//! Turns a walked capability graph into a [`DispatchModel`]. For each
//! abstract method, in walk order:
//!
//! 1. Constraints: every declaration whose marker is carried by a parameter
//!    and whose kind is compatible with the parameter kind (additive)
//! 2. Core: the first core fragment whose surface covers the method
//! 3. Decorators: outermost first; a decorator restricted to a marker only
//!    applies when the method or the chosen core carries that marker
//! 4. Assertions: every assertion whose surface covers the method
//!
//! A fragment reachable through several nodes appears once per chain.
//! Resolution has no side effects and may run concurrently.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use quilt_core::{CapabilityId, FragmentId, MethodDescriptor, QuiltError, QuiltResult};

use crate::declaration::{CapabilityType, ConstraintDeclaration, FragmentDescriptor, FragmentKind};
use crate::dispatch::{DispatchModel, MethodChain, ParamConstraints, ResolutionMode};
use crate::registry::CapabilityRegistry;
use crate::walker::{abstract_methods, walk};

/// Resolve the dispatch model of a capability type
///
/// # Errors
///
/// Any walk error, plus:
/// - `MalformedDeclaration` for inconsistent declarations in the walked graph
/// - `UnresolvedConstraint` for a parameter marker with no compatible declaration
/// - `MissingFragment` for a method without core (in [`ResolutionMode::Instantiate`])
pub fn resolve(
    registry: &CapabilityRegistry,
    capability: &CapabilityId,
    mode: ResolutionMode,
) -> QuiltResult<DispatchModel> {
    let walked = walk(registry, capability)?;
    for ty in &walked {
        validate(ty)?;
    }

    let mut table = FragmentTable::default();
    let mut chains = Vec::new();

    for method in abstract_methods(&walked) {
        let constraints = resolve_constraints(capability, &walked, &method)?;

        let core = walked
            .iter()
            .flat_map(|ty| &ty.fragments().cores)
            .find(|f| f.covers(&method.name));
        if core.is_none() && mode == ResolutionMode::Instantiate {
            return Err(QuiltError::MissingFragment {
                capability: capability.clone(),
                method: method.name.clone(),
            });
        }

        let mut decorators: SmallVec<[usize; 4]> = SmallVec::new();
        for decorator in walked.iter().flat_map(|ty| &ty.fragments().decorators) {
            if !decorator.covers(&method.name) {
                continue;
            }
            if let Some(marker) = decorator.restriction() {
                let carried = method.has_marker(marker)
                    || core.map_or(false, |c| c.carries_marker(&method.name, marker));
                if !carried {
                    continue;
                }
            }
            let idx = table.intern(decorator);
            if !decorators.contains(&idx) {
                decorators.push(idx);
            }
        }

        let mut assertions: SmallVec<[usize; 2]> = SmallVec::new();
        for assertion in walked.iter().flat_map(|ty| &ty.fragments().assertions) {
            if !assertion.covers(&method.name) {
                continue;
            }
            let idx = table.intern(assertion);
            if !assertions.contains(&idx) {
                assertions.push(idx);
            }
        }

        chains.push(MethodChain {
            core: core.map(|c| table.intern(c)),
            method,
            decorators,
            assertions,
            constraints,
        });
    }

    Ok(DispatchModel::new(
        capability.clone(),
        mode,
        walked.iter().map(|ty| ty.id().clone()).collect(),
        table.fragments,
        chains,
    ))
}

#[derive(Default)]
struct FragmentTable {
    fragments: Vec<FragmentDescriptor>,
    index: FxHashMap<FragmentId, usize>,
}

impl FragmentTable {
    fn intern(&mut self, fragment: &FragmentDescriptor) -> usize {
        if let Some(&idx) = self.index.get(fragment.id()) {
            return idx;
        }
        let idx = self.fragments.len();
        self.fragments.push(fragment.clone());
        self.index.insert(fragment.id().clone(), idx);
        idx
    }
}

fn resolve_constraints(
    capability: &CapabilityId,
    walked: &[&CapabilityType],
    method: &MethodDescriptor,
) -> QuiltResult<Vec<ParamConstraints>> {
    let mut out = Vec::new();
    for (index, param) in method.params.iter().enumerate() {
        let mut constraints: Vec<ConstraintDeclaration> = Vec::new();
        for marker in &param.constraints {
            let mut found = false;
            let candidates = walked
                .iter()
                .flat_map(|ty| &ty.fragments().constraints)
                .filter(|c| c.marker() == marker && c.kind().compatible_with(param.kind));
            for candidate in candidates {
                found = true;
                if !constraints.iter().any(|c| c.id() == candidate.id()) {
                    constraints.push(candidate.clone());
                }
            }
            if !found {
                return Err(QuiltError::UnresolvedConstraint {
                    capability: capability.clone(),
                    method: method.name.clone(),
                    parameter: param.name.clone(),
                    marker: marker.clone(),
                });
            }
        }
        if !constraints.is_empty() {
            out.push(ParamConstraints {
                index,
                parameter: param.name.clone(),
                constraints,
            });
        }
    }
    Ok(out)
}

fn validate(ty: &CapabilityType) -> QuiltResult<()> {
    let malformed = |reason: String| QuiltError::MalformedDeclaration {
        capability: ty.id().clone(),
        reason,
    };

    for method in ty.methods() {
        if method.name.is_empty() {
            return Err(malformed("method with an empty name".to_string()));
        }
        for param in &method.params {
            if param.constraints.iter().any(|m| m.is_empty()) {
                return Err(malformed(format!(
                    "parameter '{}' of '{}' carries an empty constraint marker",
                    param.name, method.name
                )));
            }
        }
    }

    let declared = ty.fragments();
    let lists = [
        (FragmentKind::Core, &declared.cores),
        (FragmentKind::Decorator, &declared.decorators),
        (FragmentKind::Assertion, &declared.assertions),
    ];
    for (expected, fragments) in lists {
        for fragment in fragments.iter() {
            if fragment.id().is_empty() {
                return Err(malformed(format!("{} fragment with an empty id", expected)));
            }
            if fragment.kind() != expected {
                return Err(malformed(format!(
                    "fragment '{}' is a {} but is declared as a {}",
                    fragment.id(),
                    fragment.kind(),
                    expected
                )));
            }
            if let crate::declaration::Surface::Methods(methods) = fragment.surface() {
                if methods.is_empty() {
                    return Err(malformed(format!(
                        "fragment '{}' implements no methods",
                        fragment.id()
                    )));
                }
            }
            match fragment.restriction() {
                Some(marker) if expected != FragmentKind::Decorator => {
                    return Err(malformed(format!(
                        "{} fragment '{}' is restricted to marker '{}'; only decorators may be",
                        expected,
                        fragment.id(),
                        marker
                    )));
                }
                Some(marker) if marker.is_empty() => {
                    return Err(malformed(format!(
                        "decorator '{}' is restricted to an empty marker",
                        fragment.id()
                    )));
                }
                _ => {}
            }
        }
    }

    for constraint in &declared.constraints {
        if constraint.id().is_empty() || constraint.marker().is_empty() {
            return Err(malformed(format!(
                "constraint declaration '{}' needs both an id and a marker",
                constraint.id()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ConstraintDeclaration;
    use quilt_core::{
        Assertion, Call, CoreFragment, Decorator, Marker, Next, ParamDescriptor, QuiltResult,
        Value, ValueKind,
    };

    struct Noop;
    impl CoreFragment for Noop {
        fn invoke(&self, _call: &mut Call<'_>) -> QuiltResult<Value> {
            Ok(Value::Null)
        }
    }

    struct Pass;
    impl Decorator for Pass {
        fn invoke(&self, call: &mut Call<'_>, next: &dyn Next) -> QuiltResult<Value> {
            next.proceed(call)
        }
    }

    struct Check;
    impl Assertion for Check {}

    fn core(id: &str) -> FragmentDescriptor {
        FragmentDescriptor::core(id, |_| Ok(Noop))
    }

    fn decorator(id: &str) -> FragmentDescriptor {
        FragmentDescriptor::decorator(id, |_| Ok(Pass))
    }

    fn assertion(id: &str) -> FragmentDescriptor {
        FragmentDescriptor::assertion(id, |_| Ok(Check))
    }

    fn non_negative() -> ConstraintDeclaration {
        ConstraintDeclaration::new("non_negative", "non_negative", ValueKind::Int, |v: &Value| {
            v.as_int().map_or(false, |i| i >= 0)
        })
    }

    fn account() -> CapabilityType {
        CapabilityType::contract("Account")
            .method(
                MethodDescriptor::new("deposit")
                    .param(ParamDescriptor::new("amount", ValueKind::Int).constrained_by("non_negative")),
            )
            .method(MethodDescriptor::new("balance"))
    }

    fn resolve_one(types: Vec<CapabilityType>, root: &str) -> QuiltResult<DispatchModel> {
        let registry = types
            .into_iter()
            .fold(CapabilityRegistry::builder(), |b, t| b.register(t))
            .build()?;
        resolve(&registry, &root.into(), ResolutionMode::Instantiate)
    }

    #[test]
    fn test_first_core_in_walk_order_wins() {
        let model = resolve_one(
            vec![
                account()
                    .constraint(non_negative())
                    .extends("Base")
                    .core(core("Deposits").implements(["deposit"])),
                CapabilityType::contract("Base").core(core("Fallback")),
            ],
            "Account",
        )
        .unwrap();

        let summary = model.summary();
        assert_eq!(summary[0].method.as_str(), "deposit");
        assert_eq!(summary[0].core.as_ref().unwrap().as_str(), "Deposits");
        assert_eq!(summary[1].core.as_ref().unwrap().as_str(), "Fallback");
        assert_eq!(model.fragments().len(), 2);
    }

    #[test]
    fn test_missing_core() {
        let err = resolve_one(
            vec![account()
                .constraint(non_negative())
                .core(core("Deposits").implements(["deposit"]))],
            "Account",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QuiltError::MissingFragment { ref method, .. } if method.as_str() == "balance"
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_wrap_mode_allows_missing_core() {
        let registry = CapabilityRegistry::builder()
            .register(account().constraint(non_negative()))
            .build()
            .unwrap();
        let model = resolve(&registry, &"Account".into(), ResolutionMode::Wrap).unwrap();
        assert!(model.methods().iter().all(|m| m.core.is_none()));
        assert_eq!(model.mode(), ResolutionMode::Wrap);
    }

    #[test]
    fn test_marker_restricted_decorator() {
        let model = resolve_one(
            vec![CapabilityType::contract("Service")
                .method(MethodDescriptor::new("a").marked("audited"))
                .method(MethodDescriptor::new("b"))
                .method(MethodDescriptor::new("c"))
                .core(core("Impl").marked("c", "audited"))
                .decorator(decorator("Audit").applies_to("audited"))
                .decorator(decorator("Trace"))],
            "Service",
        )
        .unwrap();

        let deco = |name: &str| -> Vec<String> {
            model
                .method(name)
                .unwrap()
                .decorators
                .iter()
                .map(|&i| model.fragments()[i].id().to_string())
                .collect()
        };
        assert_eq!(deco("a"), vec!["Audit", "Trace"]);
        assert_eq!(deco("b"), vec!["Trace"]);
        assert_eq!(deco("c"), vec!["Audit", "Trace"]);
    }

    #[test]
    fn test_decorators_outermost_first_and_deduplicated() {
        let shared = decorator("Shared");
        let model = resolve_one(
            vec![
                CapabilityType::contract("Top")
                    .extends("Mid")
                    .decorator(decorator("Outer"))
                    .decorator(shared.clone()),
                CapabilityType::contract("Mid")
                    .method(MethodDescriptor::new("run"))
                    .core(core("Impl"))
                    .decorator(decorator("Inner"))
                    .decorator(shared),
            ],
            "Top",
        )
        .unwrap();

        let summary = model.summary();
        let decorators: Vec<_> = summary[0].decorators.iter().map(|d| d.as_str()).collect();
        assert_eq!(decorators, vec!["Outer", "Shared", "Inner"]);
    }

    #[test]
    fn test_assertions_filtered_by_surface() {
        let model = resolve_one(
            vec![account()
                .constraint(non_negative())
                .core(core("Impl"))
                .assertion(assertion("Positive").implements(["deposit"]))
                .assertion(assertion("Always"))],
            "Account",
        )
        .unwrap();
        let summary = model.summary();
        let deposit: Vec<_> = summary[0].assertions.iter().map(|a| a.as_str()).collect();
        let balance: Vec<_> = summary[1].assertions.iter().map(|a| a.as_str()).collect();
        assert_eq!(deposit, vec!["Positive", "Always"]);
        assert_eq!(balance, vec!["Always"]);
    }

    #[test]
    fn test_constraints_additive_and_kind_filtered() {
        let model = resolve_one(
            vec![
                account()
                    .extends("Limits")
                    .constraint(non_negative())
                    .core(core("Impl")),
                CapabilityType::contract("Limits")
                    .constraint(ConstraintDeclaration::new(
                        "below_million",
                        "non_negative",
                        ValueKind::Int,
                        |v: &Value| v.as_int().map_or(false, |i| i < 1_000_000),
                    ))
                    .constraint(ConstraintDeclaration::new(
                        "short_text",
                        "non_negative",
                        ValueKind::String,
                        |_: &Value| true,
                    )),
            ],
            "Account",
        )
        .unwrap();

        let chain = model.method("deposit").unwrap();
        assert_eq!(chain.constraints.len(), 1);
        assert_eq!(chain.constraints[0].parameter, "amount");
        let ids: Vec<_> = chain.constraints[0]
            .constraints
            .iter()
            .map(|c| c.id().as_str())
            .collect();
        assert_eq!(ids, vec!["non_negative", "below_million"]);
        assert!(model.method("balance").unwrap().constraints.is_empty());
    }

    #[test]
    fn test_unresolved_constraint_marker() {
        let err = resolve_one(vec![account().core(core("Impl"))], "Account").unwrap_err();
        match err {
            QuiltError::UnresolvedConstraint {
                parameter, marker, ..
            } => {
                assert_eq!(parameter, "amount");
                assert_eq!(marker, Marker::new("non_negative"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_malformed_declarations() {
        let wrong_list = resolve_one(
            vec![CapabilityType::contract("S")
                .method(MethodDescriptor::new("run"))
                .core(decorator("NotACore"))],
            "S",
        );
        assert!(matches!(wrong_list, Err(QuiltError::MalformedDeclaration { .. })));

        let restricted_core = resolve_one(
            vec![CapabilityType::contract("S")
                .method(MethodDescriptor::new("run"))
                .core(core("Impl").applies_to("audited"))],
            "S",
        );
        assert!(matches!(restricted_core, Err(QuiltError::MalformedDeclaration { .. })));

        let empty_constraint = resolve_one(
            vec![CapabilityType::contract("S")
                .method(MethodDescriptor::new("run"))
                .core(core("Impl"))
                .constraint(ConstraintDeclaration::new("", "m", ValueKind::Any, |_: &Value| true))],
            "S",
        );
        assert!(matches!(empty_constraint, Err(QuiltError::MalformedDeclaration { .. })));

        let empty_surface = resolve_one(
            vec![CapabilityType::contract("S")
                .method(MethodDescriptor::new("run"))
                .core(core("Impl").implements(Vec::<&str>::new()))],
            "S",
        );
        assert!(matches!(empty_surface, Err(QuiltError::MalformedDeclaration { .. })));
    }

    #[test]
    fn test_model_records_walk() {
        let model = resolve_one(
            vec![
                CapabilityType::contract("Child").extends("Parent"),
                CapabilityType::contract("Parent")
                    .method(MethodDescriptor::new("run"))
                    .core(core("Impl")),
            ],
            "Child",
        )
        .unwrap();
        assert!(model.conforms_to(&"Parent".into()));
        assert!(model.conforms_to(&"Child".into()));
        assert!(!model.conforms_to(&"Other".into()));
        assert!(model.method("missing").is_none());
    }
}
