/*!

Environment constructors and handles: creation with parent specifications,
weakening and locking, freezing, and access to the dynamic environment.

*/

use crate::{
  abstractions::rc_cell,
  core::{
    context::{Context, Reduction},
    environment::{check_parent, Environment, EnvironmentWeakRef, RcEnv},
    error::UnilangError,
    eval::operand_handles,
    term::RcTerm,
    value::Value,
  },
};

use super::{resolved_env, resolved_value, retain_n, set_result};

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_strict(env, "make-environment", strict_make_environment)?;
  super::register_strict(env, "weaken-environment", strict_weaken)?;
  super::register_strict(env, "lock-environment", strict_lock)?;
  super::register_strict(env, "freeze", strict_freeze)?;
  super::register_strict(env, "freeze-environment!", strict_freeze)?;
  super::register_strict(env, "get-current-environment", strict_current)?;
  super::register_strict(env, "environment?", strict_is_environment)?;
  Ok(())
}

/// `(make-environment parents…)`: zero parents give a root, one is chained
/// directly, several form an environment list searched left to right.
fn strict_make_environment(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = operand_handles(term);
  let mut parents = Vec::with_capacity(operands.len());
  for operand in &operands {
    let value = resolved_value(operand);
    check_parent(&value)?;
    parents.push(value);
  }
  let parent = match parents.len() {
    0 => Value::Unit,
    1 => parents.pop().unwrap_or(Value::Unit),
    _ => Value::EnvironmentList(parents),
  };
  let fresh = rc_cell(Environment::with_parent(parent)?);
  set_result(term, Value::Environment(fresh))
}

fn strict_weaken(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let value = resolved_value(&operands[0]);
  let weak = match value {
    Value::WeakEnvironment(w) => w,
    Value::Environment(strong) => EnvironmentWeakRef::new(&strong),
    other => {
      return Err(UnilangError::type_error(format!(
        "environment expected, found kind {:?}",
        other.kind()
      )))
    }
  };
  set_result(term, Value::WeakEnvironment(weak))
}

fn strict_lock(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let strong = resolved_env(&operands[0])?;
  set_result(term, Value::Environment(strong))
}

fn strict_freeze(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let env = resolved_env(&operands[0])?;
  env.borrow_mut().freeze();
  set_result(term, Value::Inert)
}

fn strict_current(term: &RcTerm, ctx: &mut Context) -> Reduction {
  retain_n(term, 0)?;
  let current = ctx.record.clone();
  set_result(term, Value::Environment(current))
}

fn strict_is_environment(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let is_env = matches!(
    resolved_value(&operands[0]),
    Value::Environment(_) | Value::WeakEnvironment(_)
  );
  set_result(term, Value::Bool(is_env))
}
