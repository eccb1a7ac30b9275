//! Per-call execution of a resolved method chain
//!
//! Order, stopping at the first failure:
//! 1. argument arity and kinds
//! 2. constraints (the core never runs when one rejects)
//! 3. pre-assertions
//! 4. decorators, outermost to innermost, each handed a [`Next`]
//! 5. core
//! 6. post-assertions

use smallvec::SmallVec;

use quilt_core::{Assertion, AssertionPhase, Call, Next, QuiltError, QuiltResult, Value};
use quilt_model::MethodChain;

use crate::instance::CompositeInstance;

/// Run a call through its chain
pub(crate) fn execute(
    instance: &CompositeInstance,
    chain: &MethodChain,
    args: Vec<Value>,
) -> QuiltResult<Value> {
    let mut call = Call::new(instance.capability(), &chain.method, args);
    check_arguments(&call)?;
    check_constraints(chain, &call)?;

    let mut assertions: SmallVec<[&dyn Assertion; 2]> = SmallVec::new();
    for &index in &chain.assertions {
        let assertion = instance.assertion(index)?;
        assertion
            .before(&call)
            .map_err(|message| assertion_failed(instance, &call, index, AssertionPhase::Pre, message))?;
        assertions.push(assertion);
    }

    let result = Link {
        instance,
        chain,
        position: 0,
    }
    .proceed(&mut call)?;

    for (assertion, &index) in assertions.iter().zip(&chain.assertions) {
        assertion
            .after(&call, &result)
            .map_err(|message| assertion_failed(instance, &call, index, AssertionPhase::Post, message))?;
    }
    Ok(result)
}

fn check_arguments(call: &Call<'_>) -> QuiltResult<()> {
    let invalid = |reason: String| QuiltError::InvalidArgument {
        capability: call.capability.clone(),
        method: call.method.name.clone(),
        reason,
    };

    if call.args.len() != call.method.arity() {
        return Err(invalid(format!(
            "expected {} arguments, got {}",
            call.method.arity(),
            call.args.len()
        )));
    }
    for (param, arg) in call.method.params.iter().zip(&call.args) {
        if !param.kind.accepts(arg) {
            return Err(invalid(format!(
                "'{}' should be {}, found {}",
                param.name,
                param.kind,
                arg.type_name()
            )));
        }
    }
    Ok(())
}

fn check_constraints(chain: &MethodChain, call: &Call<'_>) -> QuiltResult<()> {
    for param in &chain.constraints {
        let value = &call.args[param.index];
        if let Some(rejecting) = param.constraints.iter().find(|c| !c.is_valid(value)) {
            return Err(QuiltError::ConstraintViolation {
                capability: call.capability.clone(),
                method: call.method.name.clone(),
                parameter: param.parameter.clone(),
                constraint: rejecting.id().clone(),
                value: value.clone(),
            });
        }
    }
    Ok(())
}

fn assertion_failed(
    instance: &CompositeInstance,
    call: &Call<'_>,
    index: usize,
    phase: AssertionPhase,
    message: String,
) -> QuiltError {
    QuiltError::AssertionFailed {
        capability: call.capability.clone(),
        method: call.method.name.clone(),
        assertion: instance.fragment_id(index),
        phase,
        message,
    }
}

/// Position in a method's decorator chain
#[derive(Clone, Copy)]
struct Link<'i> {
    instance: &'i CompositeInstance,
    chain: &'i MethodChain,
    position: usize,
}

impl Next for Link<'_> {
    fn proceed(&self, call: &mut Call<'_>) -> QuiltResult<Value> {
        match self.chain.decorators.get(self.position) {
            Some(&index) => {
                let decorator = self.instance.decorator(index)?;
                let next = Link {
                    position: self.position + 1,
                    ..*self
                };
                decorator.invoke(call, &next)
            }
            None => self.instance.invoke_core(self.chain, call),
        }
    }
}
