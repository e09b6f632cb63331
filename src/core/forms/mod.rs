/*!

The ground environment: registration plumbing and the native combiners.

Native handlers follow one convention: they receive the whole combining
term (head at position 0, operands after it) and the context, and they
report through the usual reduction statuses. `register_strict` installs a
handler behind one wrap level, so its operands arrive evaluated;
`register_form` installs an operative that sees them raw.

*/

use tracing::debug;

use crate::{
  abstractions::IString,
  core::{
    combiner::{Combiner, RcCombiner},
    context::{Context, Reducer, Reduction, ReductionStatus},
    environment::{resolve_environment, RcEnv},
    error::UnilangError,
    eval::{eval_reducer, operand_handles},
    reference::{collapse, reference_term, ultimate_referent},
    term::{ensure_value_tags, RcTerm, Term},
    value::Value,
  },
};

mod control;
mod env_forms;
mod io;
mod lists;
mod math;
mod strings;

/// Installs every primitive binding into `env`.
pub fn install_ground(env: &RcEnv) -> Result<(), UnilangError> {
  debug!("installing ground environment primitives");
  env
      .borrow_mut()
      .define(IString::from("ignore"), Term::with_value(Value::Ignore))?;
  control::install(env)?;
  env_forms::install(env)?;
  lists::install(env)?;
  math::install(env)?;
  strings::install(env)?;
  io::install(env)?;
  Ok(())
}

// region Registration

/// Installs an applicative: operands are evaluated before the handler runs.
pub fn register_strict(
  env: &RcEnv,
  name: &str,
  f: impl Fn(&RcTerm, &mut Context) -> Reduction + 'static,
) -> Result<(), UnilangError> {
  register(env, name, 1, f)
}

/// Installs an operative: the handler sees its operands unevaluated.
pub fn register_form(
  env: &RcEnv,
  name: &str,
  f: impl Fn(&RcTerm, &mut Context) -> Reduction + 'static,
) -> Result<(), UnilangError> {
  register(env, name, 0, f)
}

fn register(
  env: &RcEnv,
  name: &str,
  wrapping: usize,
  f: impl Fn(&RcTerm, &mut Context) -> Reduction + 'static,
) -> Result<(), UnilangError> {
  let combiner = Combiner::native(name, wrapping, f);
  env
      .borrow_mut()
      .define(IString::from(name), Term::with_value(Value::Combiner(combiner)))
}

// endregion

// region Operand access helpers

/// Exactly `n` operands, or an arity error.
pub(crate) fn retain_n(term: &RcTerm, n: usize) -> Result<Vec<RcTerm>, UnilangError> {
  let operands = operand_handles(term);
  if operands.len() != n {
    return Err(UnilangError::arity(n, operands.len()));
  }
  Ok(operands)
}

/// At least `n` operands, or an arity error.
pub(crate) fn retain_at_least(
  term: &RcTerm,
  n: usize,
) -> Result<Vec<RcTerm>, UnilangError> {
  let operands = operand_handles(term);
  if operands.len() < n {
    return Err(UnilangError::arity(n, operands.len()));
  }
  Ok(operands)
}

/// The value a term denotes, with reference chains resolved.
pub(crate) fn resolved_value(t: &RcTerm) -> Value {
  let mut current = t.clone();
  loop {
    let next = {
      let c = current.borrow();
      c.value.try_reference().map(|r| r.get())
    };
    match next {
      Some(target) => current = target,
      None => {
        let v = current.borrow().value.clone();
        return v;
      }
    }
  }
}

/// The resolved leaf symbol of a term.
pub(crate) fn resolved_symbol(t: &RcTerm) -> Result<IString, UnilangError> {
  match resolved_value(t) {
    Value::Symbol(s) => Ok(s),
    other => Err(UnilangError::type_error(format!(
      "symbol expected, found a value of kind {:?}",
      other.kind()
    ))),
  }
}

pub(crate) fn resolved_string(t: &RcTerm) -> Result<String, UnilangError> {
  match resolved_value(t) {
    Value::String(s) => Ok(s),
    other => Err(UnilangError::type_error(format!(
      "string expected, found a value of kind {:?}",
      other.kind()
    ))),
  }
}

pub(crate) fn resolved_bool(t: &RcTerm) -> Result<bool, UnilangError> {
  match resolved_value(t) {
    Value::Bool(b) => Ok(b),
    other => Err(UnilangError::type_error(format!(
      "boolean expected, found a value of kind {:?}",
      other.kind()
    ))),
  }
}

pub(crate) fn resolved_env(t: &RcTerm) -> Result<RcEnv, UnilangError> {
  resolve_environment(&resolved_value(t))
}

pub(crate) fn resolved_combiner(t: &RcTerm) -> Result<RcCombiner, UnilangError> {
  match resolved_value(t) {
    Value::Combiner(c) => Ok(c),
    other => Err(UnilangError::type_error(format!(
      "combiner expected, found a value of kind {:?}",
      other.kind()
    ))),
  }
}

// endregion

// region Result and lifting helpers

pub(crate) fn set_result(term: &RcTerm, value: Value) -> Reduction {
  let mut t = term.borrow_mut();
  t.clear();
  t.value = value;
  t.tags  = ensure_value_tags(t.tags);
  Ok(ReductionStatus::Retained)
}

pub(crate) fn set_result_term(term: &RcTerm, mut content: Term) -> Reduction {
  content.tags = ensure_value_tags(content.tags);
  term.borrow_mut().set_content(content);
  Ok(ReductionStatus::Retained)
}

/// First-class copy of what a term denotes: a movable reference is
/// consumed, any other reference is copied through, and a plain term (a
/// temporary of the combination tree) is taken.
pub(crate) fn value_copy(operand: &RcTerm) -> Term {
  let reference = operand.borrow().value.try_reference().cloned();
  let mut content = match reference {
    Some(r) => {
      let (r, _) = collapse(r);
      if r.is_movable() {
        r.get().borrow_mut().take()
      } else {
        r.get().borrow().deep_copy()
      }
    }
    None => operand.borrow_mut().take(),
  };
  content.tags = ensure_value_tags(content.tags);
  content
}

/// Copy of what a term denotes that never consumes anything.
pub(crate) fn copy_resolved(operand: &RcTerm) -> Term {
  let target = ultimate_referent(operand);
  let mut content = target.borrow().deep_copy();
  if let Some(r) = content.value.try_reference().cloned() {
    let (r, _) = collapse(r);
    content = r.get().borrow().deep_copy();
  }
  content.tags = ensure_value_tags(content.tags);
  content
}

/// Schedules the tail evaluation of `term` in `env`, optionally behind a
/// lift-to-return frame.
pub(crate) fn tail_eval(ctx: &mut Context, term: &RcTerm, env: RcEnv, lift: bool) {
  if lift {
    ctx.setup_front(Reducer::Lift(term.clone()));
  }
  ctx.setup_front(eval_reducer(term.clone(), env));
}

/// Deep structural equality through references, ignoring value-category
/// tags: what `equal?` observes.
pub(crate) fn structural_equal(a: &RcTerm, b: &RcTerm) -> bool {
  let ra = reference_term(a);
  let rb = reference_term(b);
  let ta = ra.borrow();
  let tb = rb.borrow();
  if ta.count_prefix() != tb.count_prefix() {
    return false;
  }
  let leaves_equal = if ta.value.is_reference() || tb.value.is_reference() {
    // One more level of indirection below this node.
    drop(ta);
    drop(tb);
    return structural_equal(&reference_term(&ra), &reference_term(&rb));
  } else {
    ta.value == tb.value
  };
  leaves_equal
      && ta
          .children()
          .iter()
          .zip(tb.children().iter())
          .take(ta.count_prefix())
          .all(|(x, y)| structural_equal(x, y))
}

// endregion
