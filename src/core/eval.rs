/*!

One-step reduction: identifier lookup, self-evaluating forms, and the
dispatch of combining forms.

`reduce_once` never re-enters the trampoline. To evaluate a subterm it
pushes reducers onto the context and returns `Neutral`; the trampoline then
runs those to completion before resuming whatever was queued behind them.
Classification looks through reference chains so that terms built by
derived code (which freely splices reference values for sharing) evaluate
exactly like the structures they alias.

*/

use std::rc::Rc;

use tracing::trace;

use crate::{
  abstractions::rc_cell,
  core::{
    combiner::apply_combiner,
    context::{Context, Reducer, Reduction, ReductionStatus},
    continuation::invoke_continuation,
    environment::{resolve, EnvironmentWeakRef, RcEnv},
    error::UnilangError,
    reference::{collapse, ultimate_referent, TermReference},
    term::{propagate_to, RcTerm, Term, TermTag, TermTags},
    value::Value,
  },
  IString,
};

/// A reducer that evaluates `term` in `env`. The environment is captured at
/// scheduling time and re-established on every run, which is what lets a
/// captured continuation replay its frames in the right scopes.
pub fn eval_reducer(term: RcTerm, env: RcEnv) -> Reducer {
  Reducer::step(move |ctx| {
    ctx.record = env.clone();
    reduce_once(&term, ctx)
  })
}

enum Shape {
  EmptyList,
  SelfEvaluating,
  Identifier(IString),
  Combination,
}

/// Dispatches one reduction step on `term`.
pub fn reduce_once(term: &RcTerm, ctx: &mut Context) -> Reduction {
  ctx.next_term = Some(term.clone());

  // Classify through the whole reference chain; the collapsed reference
  // also carries the tags that decide whether an indirect referent may be
  // consumed.
  let via_reference = term
      .borrow()
      .value
      .try_reference()
      .cloned()
      .map(|r| collapse(r).0);
  let referent = via_reference
      .as_ref()
      .map(|r| r.get())
      .unwrap_or_else(|| term.clone());
  let indirect = !Rc::ptr_eq(&referent, term);
  let shape = {
    let t = referent.borrow();
    if t.is_branch() {
      if t.is_list() {
        Shape::Combination
      } else {
        // Branched term with a value: an internal form; self-evaluating.
        Shape::SelfEvaluating
      }
    } else if let Some(name) = t.symbol() {
      Shape::Identifier(name.clone())
    } else if t.is_empty_list() {
      Shape::EmptyList
    } else {
      Shape::SelfEvaluating
    }
  };

  match shape {
    Shape::EmptyList => Ok(ReductionStatus::Clean),
    Shape::SelfEvaluating => Ok(ReductionStatus::Retained),
    Shape::Identifier(name) => evaluate_identifier(term, &name, ctx),
    Shape::Combination => {
      if indirect {
        // Combining through a reference: bring a private copy (or the
        // moved referent) into this node, then reduce it here.
        let movable = via_reference.map_or(false, |r| r.is_movable());
        let content = if movable {
          referent.borrow_mut().take()
        } else {
          referent.borrow().deep_copy()
        };
        term.borrow_mut().set_content(content);
        Ok(ReductionStatus::Retrying)
      } else {
        reduce_combining(term, ctx)
      }
    }
  }
}

/// Resolves `name` and places a reference to the bound term into `term`,
/// with `Nonmodifying` propagated from the binding's tags. A binding that
/// itself holds a reference is collapsed so no chain persists.
fn evaluate_identifier(term: &RcTerm, name: &IString, ctx: &mut Context) -> Reduction {
  match resolve(&ctx.record, name)? {
    Some((bound, owner)) => {
      let tags = propagate_to(TermTags::empty(), bound.borrow().tags);
      let reference =
          TermReference::new(bound, tags, EnvironmentWeakRef::new(&owner));
      let (reference, _) = collapse(reference);
      term.borrow_mut().value = Value::Reference(reference);
      Ok(ReductionStatus::Retained)
    }
    None => {
      trace!(name = %name, "identifier lookup failed");
      Err(UnilangError::bad_identifier(name))
    }
  }
}

/// Evaluates the head of a combination, then dispatches the application.
fn reduce_combining(term: &RcTerm, ctx: &mut Context) -> Reduction {
  // The head position is transparent to metadata and to the empty list:
  // sticky decorations are skipped and `(() f xs…)` applies f to xs.
  let mut stripped = false;
  loop {
    let drop_head = {
      let t = term.borrow();
      match t.first() {
        Some(first) => {
          let head = ultimate_referent(first);
          let h = head.borrow();
          h.tags.contains(TermTag::Sticky) || h.is_empty_list()
        }
        None => false,
      }
    };
    if !drop_head {
      break;
    }
    term.borrow_mut().remove_head_unchecked();
    stripped = true;
  }

  if term.borrow().is_leaf() {
    // Everything was metadata: the term decayed to the empty list.
    return if stripped {
      Ok(ReductionStatus::Retrying)
    } else {
      Ok(ReductionStatus::Clean)
    };
  }

  let head = match term.borrow().first() {
    Some(h) => h.clone(),
    None => return Ok(ReductionStatus::Clean),
  };
  let env = ctx.record.clone();
  let t = term.clone();
  let e = env.clone();
  ctx.setup_front(Reducer::step(move |ctx| reduce_combined_branch(&t, &e, ctx)));
  ctx.setup_front(eval_reducer(head, env));
  Ok(ReductionStatus::Neutral)
}

/// Runs once the head has been evaluated; expects a combiner (or a
/// continuation) and dispatches the application.
fn reduce_combined_branch(term: &RcTerm, env: &RcEnv, ctx: &mut Context) -> Reduction {
  ctx.record = env.clone();
  ctx.combining_term = Some(term.clone());

  let head = match term.borrow().first() {
    Some(h) => h.clone(),
    None => return Ok(ReductionStatus::Clean),
  };
  let head_value = {
    let resolved = ultimate_referent(&head);
    let v = resolved.borrow().value.clone();
    v
  };

  match head_value {
    Value::Combiner(comb) => {
      let wrapping = comb.wrapping;
      apply_combiner(term, &comb, wrapping, ctx)
    }
    Value::Continuation(k) => {
      // Continuations apply like one-argument applicatives.
      let operands = operand_handles(term);
      if operands.len() != 1 {
        return Err(UnilangError::arity(1, operands.len()));
      }
      let operand = operands[0].clone();
      let t = term.clone();
      let e = env.clone();
      ctx.setup_front(Reducer::step(move |ctx| {
        ctx.record = e.clone();
        invoke_continuation(&k, &t, ctx)
      }));
      ctx.setup_front(eval_reducer(operand, env.clone()));
      Ok(ReductionStatus::Neutral)
    }
    other => Err(UnilangError::type_error(format!(
      "attempted to combine a value of kind {:?}",
      other.kind()
    ))),
  }
}

/// The structural operands of a combination: the children after the head,
/// up to the metadata suffix.
pub fn operand_handles(term: &RcTerm) -> Vec<RcTerm> {
  let t = term.borrow();
  let prefix = t.count_prefix();
  if prefix <= 1 {
    Vec::new()
  } else {
    t.children()[1..prefix].to_vec()
  }
}

/// The convention for trailing operand sequences (`$def!` expressions, vau
/// bodies): a single term denotes itself, several denote their combination.
pub fn body_term(rest: &[RcTerm]) -> RcTerm {
  match rest.len() {
    1 => rest[0].clone(),
    _ => rc_cell(Term::with_children(rest.to_vec())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::environment::Environment;
  use crate::core::error::ErrorKind;

  fn context_with(name: &str, value: Value) -> Context {
    let env = rc_cell(Environment::new());
    env
        .borrow_mut()
        .define(IString::from(name), Term::with_value(value))
        .unwrap();
    Context::new(env)
  }

  #[test]
  fn literals_are_self_evaluating() {
    let mut ctx = Context::new(rc_cell(Environment::new()));
    let term = rc_cell(Term::with_value(Value::Int(42)));
    assert_eq!(ctx.evaluate(&term).unwrap(), ReductionStatus::Retained);
    assert_eq!(term.borrow().value, Value::Int(42));
  }

  #[test]
  fn the_empty_list_evaluates_to_itself() {
    let mut ctx = Context::new(rc_cell(Environment::new()));
    let term = rc_cell(Term::new());
    assert_eq!(ctx.evaluate(&term).unwrap(), ReductionStatus::Clean);
    assert!(term.borrow().is_empty_list());
  }

  #[test]
  fn identifiers_reduce_to_references() {
    let mut ctx = context_with("x", Value::Int(7));
    let term = rc_cell(Term::with_value(Value::Symbol(IString::from("x"))));
    ctx.evaluate(&term).unwrap();

    let t = term.borrow();
    let r = t.value.try_reference().expect("reference expected");
    assert_eq!(r.get().borrow().value, Value::Int(7));
  }

  #[test]
  fn unresolved_identifiers_raise_bad_identifier() {
    let mut ctx = Context::new(rc_cell(Environment::new()));
    let term = rc_cell(Term::with_value(Value::Symbol(IString::from("nope"))));
    let err = ctx.evaluate(&term).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadIdentifier);
  }

  #[test]
  fn combining_a_non_combiner_is_a_type_error() {
    let mut ctx = Context::new(rc_cell(Environment::new()));
    let mut comb = Term::new();
    comb.add_child(Term::with_value(Value::Int(1)));
    comb.add_child(Term::with_value(Value::Int(2)));
    let term = rc_cell(comb);
    let err = ctx.evaluate(&term).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
  }
}
