/*!

Pairs and lists: construction, access, mutation, and the equality ladder.

`cons` extends a list (or forms a dotted pair when the tail is not a list)
by value; `cons%`, `list%`, `first&` and `rest&` are the reference
preserving counterparts that share structure instead of copying it. The
subobject views they produce stay wired to the original: children are
shared handles and the improper tail aliases the parent's value box.

*/

use std::rc::Rc;

use crate::{
  abstractions::rc_cell,
  core::{
    context::{Context, Reduction},
    environment::{EnvironmentWeakRef, RcEnv},
    error::UnilangError,
    eval::operand_handles,
    reference::{ultimate_referent, TermReference},
    term::{l_value_tags, propagate_to, RcTerm, Term, TermTags},
    value::Value,
  },
};

use super::{copy_resolved, retain_n, set_result, set_result_term, structural_equal, value_copy};

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_strict(env, "cons", |t, c| cons(t, c, false))?;
  super::register_strict(env, "cons%", |t, c| cons(t, c, true))?;
  super::register_strict(env, "list", |t, c| list(t, c, false))?;
  super::register_strict(env, "list%", |t, c| list(t, c, true))?;
  super::register_strict(env, "null?", |t, c| {
    predicate(t, c, |r| r.is_empty_list())
  })?;
  super::register_strict(env, "branch?", |t, c| predicate(t, c, |r| r.is_branch()))?;
  super::register_strict(env, "pair?", |t, c| predicate(t, c, |r| r.is_pair()))?;
  super::register_strict(env, "list?", |t, c| predicate(t, c, |r| r.is_list()))?;
  super::register_strict(env, "symbol?", |t, c| {
    predicate(t, c, |r| r.is_leaf() && r.value.is_symbol())
  })?;
  super::register_strict(env, "first", strict_first)?;
  super::register_strict(env, "firstv", strict_first)?;
  super::register_strict(env, "first&", strict_first_ref)?;
  super::register_strict(env, "rest&", strict_rest_ref)?;
  super::register_strict(env, "restv", strict_rest_value)?;
  super::register_strict(env, "set-first!", |t, c| set_first(t, c, true))?;
  super::register_strict(env, "set-first%!", |t, c| set_first(t, c, false))?;
  super::register_strict(env, "set-rest!", strict_set_rest)?;
  super::register_strict(env, "eq?", strict_eq)?;
  super::register_strict(env, "eqv?", strict_eqv)?;
  super::register_strict(env, "equal?", strict_equal)?;
  Ok(())
}

/// `(cons a b)`: `a` becomes the head; a list tail is extended, anything
/// else becomes the improper tail value.
fn cons(term: &RcTerm, _ctx: &mut Context, by_reference: bool) -> Reduction {
  let operands = retain_n(term, 2)?;
  let head = if by_reference {
    operands[0].clone()
  } else {
    rc_cell(value_copy(&operands[0]))
  };

  let tail = ultimate_referent(&operands[1]);
  let pair = {
    let t = tail.borrow();
    let mut children = Vec::with_capacity(t.len() + 1);
    children.push(head);
    if by_reference {
      children.extend(t.children().iter().cloned());
      let mut value = t.value.clone();
      drop(t);
      if !value.is_empty() {
        value = tail.borrow_mut().value.make_indirect();
      }
      Term::with_content(children, value)
    } else {
      for child in t.children() {
        children.push(rc_cell(child.borrow().deep_copy()));
      }
      Term::with_content(children, t.value.clone())
    }
  };
  set_result_term(term, pair)
}

fn list(term: &RcTerm, _ctx: &mut Context, by_reference: bool) -> Reduction {
  let operands = operand_handles(term);
  let children = if by_reference {
    operands
  } else {
    operands
        .iter()
        .map(|op| rc_cell(value_copy(op)))
        .collect()
  };
  set_result_term(term, Term::with_children(children))
}

fn predicate(
  term: &RcTerm,
  _ctx: &mut Context,
  f: impl Fn(&Term) -> bool,
) -> Reduction {
  let operands = retain_n(term, 1)?;
  let target = ultimate_referent(&operands[0]);
  let answer = {
    let t = target.borrow();
    f(&t)
  };
  set_result(term, Value::Bool(answer))
}

fn checked_pair(operand: &RcTerm) -> Result<(RcTerm, TermTags), UnilangError> {
  let tags = operand
      .borrow()
      .value
      .try_reference()
      .map(|r| r.tags())
      .unwrap_or_else(TermTags::empty);
  let target = ultimate_referent(operand);
  let is_pair = target.borrow().is_pair();
  if !is_pair {
    return Err(UnilangError::list_type("pair expected"));
  }
  Ok((target, tags))
}

fn strict_first(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let (pair, _) = checked_pair(&operands[0])?;
  let head = pair.borrow().children()[0].clone();
  set_result_term(term, copy_resolved(&head))
}

/// `(first& pr)`: a reference to the head, constness propagated from the
/// handle it came through.
fn strict_first_ref(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let source = operands[0].borrow().value.try_reference().cloned();
  let (pair, tags) = checked_pair(&operands[0])?;
  let head = pair.borrow().children()[0].clone();
  let anchor = match source {
    Some(r) => r.environment().clone(),
    None => EnvironmentWeakRef::new(&ctx.record),
  };
  let r = TermReference::new(head, propagate_to(TermTags::empty(), tags), anchor);
  set_result(term, Value::Reference(r))
}

/// `(rest& pr)`: a subobject view of the tail. Children are shared and the
/// improper tail aliases the pair's value box, so mutation through the view
/// is visible in the original.
fn strict_rest_ref(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let (pair, tags) = checked_pair(&operands[0])?;
  let rest = {
    let mut p = pair.borrow_mut();
    let children = p.children()[1..].to_vec();
    let value = if p.value.is_empty() {
      Value::Unit
    } else {
      p.value.make_indirect()
    };
    let mut t = Term::with_content(children, value);
    t.tags = l_value_tags(propagate_to(TermTags::empty(), tags));
    t
  };
  set_result_term(term, rest)
}

fn strict_rest_value(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let (pair, _) = checked_pair(&operands[0])?;
  let rest = {
    let p = pair.borrow();
    let children = p.children()[1..]
        .iter()
        .map(|c| rc_cell(c.borrow().deep_copy()))
        .collect();
    Term::with_content(children, p.value.clone())
  };
  set_result_term(term, rest)
}

fn set_first(term: &RcTerm, _ctx: &mut Context, to_value: bool) -> Reduction {
  let operands = retain_n(term, 2)?;
  if let Some(r) = operands[0].borrow().value.try_reference() {
    if !r.is_modifiable() {
      return Err(UnilangError::value_category(
        "assignment through a non-modifiable reference",
      ));
    }
  }
  let (pair, _) = checked_pair(&operands[0])?;
  let head = pair.borrow().children()[0].clone();
  let content = if to_value {
    value_copy(&operands[1])
  } else {
    let mut raw = operands[1].borrow_mut().take();
    if let Some(r) = raw.value.try_reference().cloned() {
      let (r, _) = crate::core::reference::collapse(r);
      raw.value = Value::Reference(r);
    }
    raw
  };
  head.borrow_mut().set_content(content);
  set_result(term, Value::Inert)
}

fn strict_set_rest(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 2)?;
  if let Some(r) = operands[0].borrow().value.try_reference() {
    if !r.is_modifiable() {
      return Err(UnilangError::value_category(
        "assignment through a non-modifiable reference",
      ));
    }
  }
  let (pair, _) = checked_pair(&operands[0])?;
  let tail = value_copy(&operands[1]);
  {
    let head = pair.borrow().children()[0].clone();
    let mut children = Vec::with_capacity(tail.len() + 1);
    children.push(head);
    children.extend(tail.children().iter().cloned());
    let replacement = Term::with_content(children, tail.value.clone());
    pair.borrow_mut().set_content(replacement);
  }
  set_result(term, Value::Inert)
}

/// Identity: leaves compare shallowly by value, branches by node.
fn strict_eq(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 2)?;
  let a = ultimate_referent(&operands[0]);
  let b = ultimate_referent(&operands[1]);
  let answer = if Rc::ptr_eq(&a, &b) {
    true
  } else {
    let ta = a.borrow();
    let tb = b.borrow();
    ta.is_leaf() && tb.is_leaf() && ta.value == tb.value
  };
  set_result(term, Value::Bool(answer))
}

fn strict_eqv(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  strict_eq(term, _ctx)
}

fn strict_equal(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 2)?;
  let answer = structural_equal(&operands[0], &operands[1]);
  set_result(term, Value::Bool(answer))
}
