/*!

Core special forms and the combiner constructors: conditionals, sequencing,
definition, `$vau` and its variants, `wrap`/`unwrap`, `eval`, `call/1cc`,
and the value-category operations.

The tail discipline is uniform: a form that ends by evaluating one of its
operands lifts that operand's content into the combining term and schedules
the term's own re-evaluation, so the trampoline never accumulates frames
down a tail chain.

*/

use crate::{
  abstractions::IString,
  core::{
    binding::{bind_parameters, check_parameter_tree},
    combiner::{apply_combiner, Combiner, VauBody},
    context::{Context, Reduction, ReductionStatus},
    continuation::Continuation,
    environment::{resolve, EnvironmentWeakRef, RcEnv},
    error::UnilangError,
    eval::{body_term, eval_reducer},
    reference::collapse,
    term::{ensure_value_tags, propagate_to, RcTerm, Term, TermTag, TermTags},
    value::Value,
  },
};

use super::{
  resolved_combiner, resolved_env, resolved_string, resolved_symbol, retain_at_least,
  retain_n, set_result, tail_eval,
};

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_form(env, "$if", form_if)?;
  super::register_form(env, "$sequence", form_sequence)?;
  super::register_form(env, "$def!", form_define)?;
  super::register_form(env, "$set!", form_set)?;
  super::register_form(env, "$vau", |t, c| make_vau(t, c, false, false))?;
  super::register_form(env, "$vau%", |t, c| make_vau(t, c, true, false))?;
  super::register_form(env, "$vau/e", |t, c| make_vau(t, c, false, true))?;
  super::register_form(env, "$vau/e%", |t, c| make_vau(t, c, true, true))?;
  super::register_form(env, "$resolve-identifier", form_resolve_identifier)?;
  super::register_form(env, "$move-resolved!", form_move_resolved)?;
  super::register_strict(env, "wrap", strict_wrap)?;
  super::register_strict(env, "unwrap", strict_unwrap)?;
  super::register_strict(env, "eval", |t, c| strict_eval(t, c, true))?;
  super::register_strict(env, "eval%", |t, c| strict_eval(t, c, false))?;
  super::register_strict(env, "call/1cc", strict_call_1cc)?;
  super::register_strict(env, "bound?", strict_bound)?;
  super::register_strict(env, "as-const", |t, c| {
    qualify(t, c, TermTag::Nonmodifying)
  })?;
  super::register_strict(env, "expire", |t, c| qualify(t, c, TermTag::Unique))?;
  super::register_strict(env, "move!", strict_move)?;
  super::register_strict(env, "reference?", |t, c| {
    category(t, c, |r| r.is_some())
  })?;
  super::register_strict(env, "unique?", |t, c| {
    category(t, c, |r| r.map_or(false, |r| r.is_unique()))
  })?;
  super::register_strict(env, "modifiable?", |t, c| {
    category(t, c, |r| r.map_or(true, |r| r.is_modifiable()))
  })?;
  super::register_strict(env, "bound-lvalue?", |t, c| {
    category(t, c, |r| {
      r.map_or(false, |r| !r.is_unique() && !r.is_temporary())
    })
  })?;
  super::register_strict(env, "uncollapsed?", strict_uncollapsed)?;
  super::register_strict(env, "assign!", |t, c| assign(t, c, true))?;
  super::register_strict(env, "assign@!", |t, c| assign(t, c, false))?;
  super::register_strict(env, "raise-error", |t, _| {
    let operands = retain_n(t, 1)?;
    Err(UnilangError::type_error(resolved_string(&operands[0])?))
  })?;
  super::register_strict(env, "raise-invalid-syntax-error", |t, _| {
    let operands = retain_n(t, 1)?;
    Err(UnilangError::invalid_syntax(resolved_string(&operands[0])?))
  })?;
  Ok(())
}

fn form_if(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_at_least(term, 2)?;
  if operands.len() > 3 {
    return Err(UnilangError::arity(3, operands.len()));
  }
  let test     = operands[0].clone();
  let then     = operands[1].clone();
  let the_else = operands.get(2).cloned();
  let env      = ctx.record.clone();
  let t        = term.clone();

  let select = {
    let env = env.clone();
    let test = test.clone();
    move |ctx: &mut Context| -> Reduction {
      ctx.record = env.clone();
      let chosen = if super::resolved_bool(&test)? {
        Some(then.clone())
      } else {
        the_else.clone()
      };
      match chosen {
        Some(branch) => {
          let content = branch.borrow_mut().take();
          t.borrow_mut().set_content(content);
          tail_eval(ctx, &t, env.clone(), false);
          Ok(ReductionStatus::Neutral)
        }
        None => set_result(&t, Value::Inert),
      }
    }
  };
  ctx.setup_front(crate::core::context::Reducer::step(select));
  ctx.setup_front(eval_reducer(test, env));
  Ok(ReductionStatus::Neutral)
}

fn form_sequence(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = crate::core::eval::operand_handles(term);
  if operands.is_empty() {
    return set_result(term, Value::Inert);
  }
  let env  = ctx.record.clone();
  let last = operands[operands.len() - 1].clone();
  let t    = term.clone();
  let e    = env.clone();
  ctx.setup_front(crate::core::context::Reducer::step(move |ctx| {
    ctx.record = e.clone();
    let content = last.borrow_mut().take();
    t.borrow_mut().set_content(content);
    tail_eval(ctx, &t, e.clone(), false);
    Ok(ReductionStatus::Neutral)
  }));
  for operand in operands[..operands.len() - 1].iter().rev() {
    ctx.setup_front(eval_reducer(operand.clone(), env.clone()));
  }
  Ok(ReductionStatus::Neutral)
}

fn form_define(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_at_least(term, 2)?;
  let formals  = operands[0].clone();
  let expr     = body_term(&operands[1..]);
  let env      = ctx.record.clone();
  let t        = term.clone();

  let bind = {
    let env = env.clone();
    let expr = expr.clone();
    move |ctx: &mut Context| -> Reduction {
      ctx.record = env.clone();
      let tree = check_parameter_tree(&formals.borrow())?;
      bind_parameters(&env, &tree, &expr)?;
      set_result(&t, Value::Inert)
    }
  };
  ctx.setup_front(crate::core::context::Reducer::step(bind));
  ctx.setup_front(eval_reducer(expr, env));
  Ok(ReductionStatus::Neutral)
}

/// `($set! env-expr formals expr…)`: evaluates both ends in the dynamic
/// environment, then assigns an already reachable binding in its owner or
/// defines afresh in the target.
fn form_set(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_at_least(term, 3)?;
  let env_expr = operands[0].clone();
  let formals  = operands[1].clone();
  let expr     = body_term(&operands[2..]);
  let env      = ctx.record.clone();
  let t        = term.clone();

  let assign = {
    let env_expr = env_expr.clone();
    let expr = expr.clone();
    move |_ctx: &mut Context| -> Reduction {
      let target = resolved_env(&env_expr)?;
      let tree = check_parameter_tree(&formals.borrow())?;
      crate::core::binding::bind_assigning(&target, &tree, &expr)?;
      set_result(&t, Value::Inert)
    }
  };
  ctx.setup_front(crate::core::context::Reducer::step(assign));
  ctx.setup_front(eval_reducer(expr, env.clone()));
  ctx.setup_front(eval_reducer(env_expr, env));
  Ok(ReductionStatus::Neutral)
}

/// `$vau` and its variants. `no_lift` makes the result reference
/// preserving; `with_env` takes the static environment from the first
/// operand instead of the definition site.
fn make_vau(term: &RcTerm, ctx: &mut Context, no_lift: bool, with_env: bool) -> Reduction {
  let operands = retain_at_least(term, if with_env { 3 } else { 2 })?;

  if with_env {
    let parent_expr = operands[0].clone();
    let env = ctx.record.clone();
    let t = term.clone();
    let rest = operands[1..].to_vec();
    let build = move |ctx: &mut Context| -> Reduction {
      ctx.record = env.clone();
      let static_env = resolved_env(&parent_expr)?;
      construct_vau(&t, &rest, Value::Environment(static_env), no_lift)
    };
    ctx.setup_front(crate::core::context::Reducer::step(build));
    ctx.setup_front(eval_reducer(operands[0].clone(), ctx.record.clone()));
    return Ok(ReductionStatus::Neutral);
  }

  let static_env = Value::Environment(ctx.record.clone());
  construct_vau(term, &operands, static_env, no_lift)
}

fn construct_vau(
  term: &RcTerm,
  operands: &[RcTerm],
  static_env: Value,
  no_lift: bool,
) -> Reduction {
  if operands.len() < 2 {
    return Err(UnilangError::arity(2, operands.len()));
  }
  let formals = check_parameter_tree(&operands[0].borrow())?;
  let eformal = parse_eformal(&operands[1])?;
  let body = if operands.len() > 2 {
    body_term(&operands[2..]).borrow().deep_copy()
  } else {
    Term::with_value(Value::Inert)
  };
  let vau = VauBody {
    formals,
    eformal,
    body,
    environment: static_env,
    no_lift,
  };
  set_result(term, Value::Combiner(Combiner::operative("vau", vau)))
}

fn parse_eformal(operand: &RcTerm) -> Result<Option<IString>, UnilangError> {
  match super::resolved_value(operand) {
    Value::Ignore => Ok(None),
    Value::Symbol(s) => Ok(Some(s)),
    other => Err(UnilangError::invalid_syntax(format!(
      "environment formal must be a symbol or #ignore, found kind {:?}",
      other.kind()
    ))),
  }
}

fn strict_wrap(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let combiner = resolved_combiner(&operands[0])?;
  set_result(term, Value::Combiner(Combiner::wrap(&combiner)))
}

fn strict_unwrap(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let combiner = resolved_combiner(&operands[0])?;
  set_result(term, Value::Combiner(Combiner::unwrap(&combiner)?))
}

/// `(eval expr env)`: the expression replaces the combining term and is
/// tail-evaluated in the target environment. The strict variant lifts the
/// result to a value; `eval%` preserves references.
fn strict_eval(term: &RcTerm, ctx: &mut Context, lift: bool) -> Reduction {
  let operands = retain_n(term, 2)?;
  let target = resolved_env(&operands[1])?;

  // Bring the expression into the combining term: move a movable
  // reference's referent, copy any other referent, consume a temporary.
  let reference = operands[0].borrow().value.try_reference().cloned();
  let content = match reference {
    Some(r) => {
      let (r, _) = collapse(r);
      if r.is_movable() {
        r.get().borrow_mut().take()
      } else {
        r.get().borrow().deep_copy()
      }
    }
    None => operands[0].borrow_mut().take(),
  };
  term.borrow_mut().set_content(content);
  tail_eval(ctx, term, target, lift);
  Ok(ReductionStatus::Neutral)
}

fn strict_call_1cc(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let combiner = resolved_combiner(&operands[0])?;

  // The continuation is captured before the receiver's frames go up: what
  // is pending right now is exactly "return from this application".
  let k = Continuation::capture(ctx, term.clone());
  let k_leaf = crate::abstractions::rc_cell(Term::with_value(Value::Continuation(k)));
  term
      .borrow_mut()
      .set_content(Term::with_children(vec![operands[0].clone(), k_leaf]));
  let wrapping = combiner.wrapping;
  apply_combiner(term, &combiner, wrapping, ctx)
}

fn strict_bound(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let name = match super::resolved_value(&operands[0]) {
    Value::Symbol(s) => s,
    Value::String(s) => IString::from(s.as_str()),
    other => {
      return Err(UnilangError::type_error(format!(
        "symbol or string expected, found kind {:?}",
        other.kind()
      )))
    }
  };
  let hit = resolve(&ctx.record, &name)?.is_some();
  set_result(term, Value::Bool(hit))
}

/// `($resolve-identifier s)`: the reference to the binding, uncollapsed.
fn form_resolve_identifier(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let name = resolved_symbol(&operands[0])?;
  match resolve(&ctx.record, &name)? {
    Some((bound, owner)) => {
      let tags = propagate_to(TermTags::empty(), bound.borrow().tags);
      let r = crate::core::reference::TermReference::new(
        bound,
        tags,
        EnvironmentWeakRef::new(&owner),
      );
      set_result(term, Value::Reference(r))
    }
    None => Err(UnilangError::bad_identifier(&name)),
  }
}

/// `($move-resolved! s)`: consumes the binding's content.
fn form_move_resolved(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let name = resolved_symbol(&operands[0])?;
  match resolve(&ctx.record, &name)? {
    Some((bound, _owner)) => {
      let mut content = bound.borrow_mut().take();
      content.tags = ensure_value_tags(content.tags);
      super::set_result_term(term, content)
    }
    None => Err(UnilangError::bad_identifier(&name)),
  }
}

/// `as-const` / `expire`: qualifies a reference operand with an extra tag
/// and passes it through.
fn qualify(term: &RcTerm, _ctx: &mut Context, tag: TermTag) -> Reduction {
  let operands = retain_n(term, 1)?;
  {
    let mut operand = operands[0].borrow_mut();
    if let Some(r) = operand.value.try_reference_mut() {
      r.add_tags(TermTags::from(tag));
    }
  }
  let content = operands[0].borrow_mut().take();
  term.borrow_mut().set_content(content);
  Ok(ReductionStatus::Retained)
}

/// `(move! x)`: transfers the referent when the handle permits it, copies
/// otherwise. The result is observed as a first-class value.
fn strict_move(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let reference = operands[0].borrow().value.try_reference().cloned();
  let content = match reference {
    Some(r) => {
      let (r, _) = collapse(r);
      if r.is_modifiable() {
        r.get().borrow_mut().take()
      } else {
        r.get().borrow().deep_copy()
      }
    }
    None => operands[0].borrow_mut().take(),
  };
  super::set_result_term(term, content)
}

/// `(assign! x y)` / `(assign@! x y)`: assignment through a modifiable
/// reference. The `!` variant stores `y` as a first-class value; the `@!`
/// variant transfers `y` raw, reference values included.
fn assign(term: &RcTerm, _ctx: &mut Context, to_value: bool) -> Reduction {
  let operands = retain_n(term, 2)?;
  let reference = operands[0].borrow().value.try_reference().cloned();
  let target = match reference {
    Some(r) => {
      if !r.is_modifiable() {
        return Err(UnilangError::value_category(
          "assignment through a non-modifiable reference",
        ));
      }
      r.get()
    }
    None => {
      return Err(UnilangError::value_category(
        "assignment target is not an lvalue",
      ))
    }
  };
  let content = if to_value {
    super::value_copy(&operands[1])
  } else {
    let mut raw = operands[1].borrow_mut().take();
    if let Some(r) = raw.value.try_reference().cloned() {
      let (r, _) = collapse(r);
      raw.value = Value::Reference(r);
    }
    raw
  };
  target.borrow_mut().set_content(content);
  set_result(term, Value::Inert)
}

fn category(
  term: &RcTerm,
  _ctx: &mut Context,
  f: impl Fn(Option<&crate::core::reference::TermReference>) -> bool,
) -> Reduction {
  let operands = retain_n(term, 1)?;
  let reference = operands[0].borrow().value.try_reference().cloned();
  let answer = f(reference.as_ref());
  set_result(term, Value::Bool(answer))
}

fn strict_uncollapsed(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let uncollapsed = operands[0]
      .borrow()
      .value
      .try_reference()
      .map_or(false, |r| r.get().borrow().value.is_reference());
  set_result(term, Value::Bool(uncollapsed))
}
