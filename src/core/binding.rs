/*!

The parameter-tree binder.

A parameter tree is a term tree whose leaves are `#ignore`, a bare symbol,
or a sigiled symbol: `&x` binds by lvalue reference, `%x` binds by
forwarding (consume when movable, alias otherwise). A leaf spelled with a
leading `.` is the rest marker: it must close its list and collects the
remaining operands, honouring the same sigil rules element-wise.

Tag propagation follows the algebra: a non-modifying operand yields
non-modifying bindings, a movable operand yields bindings with the Unique
bit set so a later `move!` in the body can consume them, and Temporary
never survives into a named binding.

*/

use crate::{
  abstractions::{rc_cell, IString},
  core::{
    environment::{Environment, EnvironmentWeakRef, RcEnv},
    error::UnilangError,
    reference::{collapse, TermReference},
    term::{ensure_value_tags, l_value_tags, RcTerm, Term, TermTag},
    value::Value,
  },
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Sigil {
  Value,
  Reference,
  Forward,
}

struct RestSpec {
  sigil: Sigil,
  /// `None` when the remainder is ignored (a bare `.`).
  name : Option<IString>,
}

/// Produces bindings for `operand` against `formals` in `env`.
pub fn bind_parameters(
  env: &RcEnv,
  formals: &Term,
  operand: &RcTerm,
) -> Result<(), UnilangError> {
  bind_tree(env, formals, operand, 0)
}

/// Validates a parameter tree and returns a normalized private copy with
/// reference leaves resolved, ready for the binder.
pub fn check_parameter_tree(formal: &Term) -> Result<Term, UnilangError> {
  if formal.is_leaf() {
    if let Some(r) = formal.value.try_reference() {
      let referent = r.get();
      let copy = referent.borrow().deep_copy();
      return check_parameter_tree(&copy);
    }
    return match &formal.value {
      Value::Ignore => Ok(Term::with_value(Value::Ignore)),
      Value::Symbol(s) => {
        parse_spec(s)?;
        Ok(Term::with_value(Value::Symbol(s.clone())))
      }
      Value::Unit => Ok(Term::new()),
      other => Err(UnilangError::invalid_syntax(format!(
        "invalid parameter of kind {:?}",
        other.kind()
      ))),
    };
  }
  if !formal.is_list() {
    return Err(UnilangError::invalid_syntax(
      "parameter tree must be a proper list",
    ));
  }
  let mut normalized = Term::new();
  let count = formal.count_prefix();
  for (i, child) in formal.children().iter().take(count).enumerate() {
    let child = check_parameter_tree(&child.borrow())?;
    if i + 1 < count {
      if let Some(s) = child.symbol() {
        if s.starts_with('.') {
          return Err(UnilangError::invalid_syntax(
            "rest parameter must close its list",
          ));
        }
      }
    }
    normalized.add_child(child);
  }
  Ok(normalized)
}

fn bind_tree(
  env: &RcEnv,
  formal: &Term,
  operand: &RcTerm,
  depth: usize,
) -> Result<(), UnilangError> {
  if formal.is_leaf() {
    return match &formal.value {
      Value::Ignore => Ok(()),
      Value::Symbol(s) => {
        let (sigil, name) = parse_spec(s)?;
        bind_leaf(env, sigil, &name, operand)
      }
      Value::Unit => {
        // The empty parameter list admits only the empty operand list.
        let matches = {
          let target = crate::core::reference::ultimate_referent(operand);
          let empty = target.borrow().is_empty_list();
          empty
        };
        if matches {
          Ok(())
        } else {
          Err(mismatch(depth, 0, operand))
        }
      }
      other => Err(UnilangError::invalid_syntax(format!(
        "invalid parameter of kind {:?}",
        other.kind()
      ))),
    };
  }

  // A structured formal destructures its operand, which must be branched.
  let (fixed, rest) = split_rest(formal)?;
  let (elements, element_count) = {
    let target = crate::core::reference::ultimate_referent(operand);
    let t = target.borrow();
    let prefix = t.count_prefix();
    (t.children()[..prefix].to_vec(), prefix)
  };

  if element_count < fixed.len() || (rest.is_none() && element_count != fixed.len()) {
    return Err(mismatch(depth, fixed.len(), operand));
  }

  for (formal_child, operand_child) in fixed.iter().zip(elements.iter()) {
    bind_tree(env, &formal_child.borrow(), operand_child, depth + 1)?;
  }
  if let Some(rest) = rest {
    bind_rest(env, &rest, &elements[fixed.len()..])?;
  }
  Ok(())
}

fn mismatch(depth: usize, expected: usize, operand: &RcTerm) -> UnilangError {
  let found = {
    let target = crate::core::reference::ultimate_referent(operand);
    let n = target.borrow().count_prefix();
    n
  };
  if depth == 0 {
    UnilangError::arity(expected, found)
  } else {
    UnilangError::parameter_mismatch(format!(
      "destructuring expected {} element(s), found {}",
      expected, found
    ))
  }
}

/// Splits a formal list into its fixed prefix and the rest specification.
fn split_rest(formal: &Term) -> Result<(Vec<RcTerm>, Option<RestSpec>), UnilangError> {
  let count = formal.count_prefix();
  let children = &formal.children()[..count];
  let mut fixed = Vec::with_capacity(count);
  for (i, child) in children.iter().enumerate() {
    let is_rest = child
        .borrow()
        .symbol()
        .map_or(false, |s| s.starts_with('.'));
    if is_rest {
      if i + 1 != count {
        return Err(UnilangError::invalid_syntax(
          "rest parameter must close its list",
        ));
      }
      let spec = {
        let c = child.borrow();
        let token = c.symbol().cloned().unwrap_or_default();
        let trailing = &token[1..];
        if trailing.is_empty() {
          RestSpec { sigil: Sigil::Value, name: None }
        } else {
          let (sigil, name) = parse_spec(&IString::from(trailing))?;
          RestSpec { sigil, name: Some(name) }
        }
      };
      return Ok((fixed, Some(spec)));
    }
    fixed.push(child.clone());
  }
  Ok((fixed, None))
}

fn parse_spec(token: &IString) -> Result<(Sigil, IString), UnilangError> {
  let s: &str = token;
  let (sigil, name) = match s.chars().next() {
    Some('&') => (Sigil::Reference, &s[1..]),
    Some('%') => (Sigil::Forward, &s[1..]),
    _ => (Sigil::Value, s),
  };
  if name.is_empty() {
    return Err(UnilangError::invalid_syntax(format!(
      "invalid parameter token '{}'",
      s
    )));
  }
  Ok((sigil, IString::from(name)))
}

fn bind_leaf(
  env: &RcEnv,
  sigil: Sigil,
  name: &IString,
  operand: &RcTerm,
) -> Result<(), UnilangError> {
  let term = match sigil {
    Sigil::Value => by_value(operand),
    Sigil::Reference => by_reference(env, operand),
    Sigil::Forward => {
      let reference = operand.borrow().value.try_reference().cloned();
      match reference {
        Some(r) => {
          let (r, _) = collapse(r);
          if r.is_movable() {
            by_value(operand)
          } else {
            by_reference(env, operand)
          }
        }
        None => by_value(operand),
      }
    }
  };
  env.borrow_mut().define(name.clone(), term)
}

/// By value: the operand is stored, moved when movable, copied otherwise.
/// A movable source marks the binding Unique so the body may consume it.
fn by_value(operand: &RcTerm) -> Term {
  let reference = operand.borrow().value.try_reference().cloned();
  let mut content = match reference {
    Some(r) => {
      let (r, _) = collapse(r);
      if r.is_movable() {
        let mut moved = r.get().borrow_mut().take();
        moved.tags |= TermTag::Unique;
        moved
      } else {
        r.get().borrow().deep_copy()
      }
    }
    // A plain operand is a temporary of the combination tree; consume it.
    None => {
      let mut moved = operand.borrow_mut().take();
      moved.tags |= TermTag::Unique;
      moved
    }
  };
  content.tags = ensure_value_tags(content.tags);
  content
}

/// By lvalue reference: tags come from the operand with Temporary dropped,
/// so constness propagates and uniqueness survives for movable sources. A
/// temporary operand is anchored in the binding environment itself.
fn by_reference(env: &RcEnv, operand: &RcTerm) -> Term {
  let reference = operand.borrow().value.try_reference().cloned();
  let r = match reference {
    Some(r) => {
      let (r, _) = collapse(r);
      TermReference::new(r.get(), l_value_tags(r.tags()), r.environment().clone())
    }
    None => TermReference::new(
      operand.clone(),
      TermTag::Unique | TermTag::Temporary,
      EnvironmentWeakRef::new(env),
    ),
  };
  Term::with_value(Value::Reference(r))
}

fn bind_rest(
  env: &RcEnv,
  rest: &RestSpec,
  operands: &[RcTerm],
) -> Result<(), UnilangError> {
  let name = match &rest.name {
    Some(name) => name,
    None => return Ok(()),
  };
  let mut list = Term::new();
  for operand in operands {
    let element = match rest.sigil {
      Sigil::Value => by_value(operand),
      Sigil::Reference => by_reference(env, operand),
      Sigil::Forward => {
        let movable = operand
            .borrow()
            .value
            .try_reference()
            .map_or(true, |r| r.is_movable());
        if movable {
          by_value(operand)
        } else {
          by_reference(env, operand)
        }
      }
    };
    list.add_child(element);
  }
  env.borrow_mut().define(name.clone(), list)
}

/// Binds like `$set!` does: an already-bound reachable name is assigned in
/// its owning environment, an unbound one is defined in `target`.
pub fn bind_assigning(
  target: &RcEnv,
  formals: &Term,
  operand: &RcTerm,
) -> Result<(), UnilangError> {
  let staging = rc_cell(Environment::new());
  bind_tree(&staging, formals, operand, 0)?;
  let bindings = staging.borrow_mut().take_bindings();
  for (name, term) in bindings {
    let existing = crate::core::environment::resolve(target, &name)?;
    match existing {
      Some((slot, owner)) => {
        if owner.borrow().is_frozen() {
          return Err(UnilangError::nonmodifiable_environment());
        }
        let content = term.borrow_mut().take();
        slot.borrow_mut().set_content(content);
      }
      None => {
        target.borrow_mut().define_shared(name, term)?;
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::error::ErrorKind;
  use crate::core::term::TermTags;

  fn fresh_env() -> RcEnv {
    rc_cell(Environment::new())
  }

  fn symbol_leaf(s: &str) -> Term {
    Term::with_value(Value::Symbol(IString::from(s)))
  }

  fn operand_list(values: Vec<Value>) -> RcTerm {
    let mut list = Term::new();
    for v in values {
      list.add_child(Term::with_value(v));
    }
    rc_cell(list)
  }

  fn bound_int(env: &RcEnv, name: &str) -> Option<i64> {
    env
        .borrow()
        .lookup_local(&IString::from(name))
        .and_then(|t| t.borrow().value.try_integer().copied())
  }

  #[test]
  fn bare_symbols_bind_by_value() {
    let env = fresh_env();
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("x"));
      f.add_child(symbol_leaf("y"));
      f
    };
    let operands = operand_list(vec![Value::Int(1), Value::Int(2)]);
    bind_parameters(&env, &formals, &operands).unwrap();

    assert_eq!(bound_int(&env, "x"), Some(1));
    assert_eq!(bound_int(&env, "y"), Some(2));
  }

  #[test]
  fn sigiled_symbols_bind_by_reference() {
    let env = fresh_env();
    let source_env = fresh_env();
    let target = rc_cell(Term::with_value(Value::Int(5)));
    let weak = EnvironmentWeakRef::new(&source_env);
    let operands = {
      let mut list = Term::new();
      list.add_child(Term::with_value(Value::Reference(TermReference::new(
        target.clone(),
        TermTags::empty(),
        weak,
      ))));
      rc_cell(list)
    };
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("&x"));
      f
    };
    bind_parameters(&env, &formals, &operands).unwrap();

    let binding = env.borrow().lookup_local(&IString::from("x")).unwrap();
    let b = binding.borrow();
    let r = b.value.try_reference().expect("reference binding expected");
    assert!(std::rc::Rc::ptr_eq(&r.get(), &target));
    assert!(r.is_modifiable());
  }

  #[test]
  fn rest_parameters_collect_the_tail() {
    let env = fresh_env();
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("a"));
      f.add_child(symbol_leaf(".rest"));
      f
    };
    let operands = operand_list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    bind_parameters(&env, &formals, &operands).unwrap();

    assert_eq!(bound_int(&env, "a"), Some(1));
    let rest = env.borrow().lookup_local(&IString::from("rest")).unwrap();
    let r = rest.borrow();
    assert_eq!(r.count_prefix(), 2);
    assert_eq!(r.children()[0].borrow().value, Value::Int(2));
  }

  #[test]
  fn arity_mismatches_are_detected() {
    let env = fresh_env();
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("a"));
      f.add_child(symbol_leaf("b"));
      f
    };
    let operands = operand_list(vec![Value::Int(1)]);
    let err = bind_parameters(&env, &formals, &operands).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ArityError);
  }

  #[test]
  fn nested_destructuring_mismatch_is_a_parameter_mismatch() {
    let env = fresh_env();
    let formals = {
      let mut inner = Term::new();
      inner.add_child(symbol_leaf("a"));
      inner.add_child(symbol_leaf("b"));
      let mut f = Term::new();
      f.add_child(inner);
      f
    };
    let inner_operand = operand_list(vec![Value::Int(1)]);
    let operands = {
      let mut list = Term::new();
      list.add_child_shared(inner_operand);
      rc_cell(list)
    };
    let err = bind_parameters(&env, &formals, &operands).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParameterMismatch);
  }

  #[test]
  fn ignore_skips_its_operand() {
    let env = fresh_env();
    let formals = {
      let mut f = Term::new();
      f.add_child(Term::with_value(Value::Ignore));
      f.add_child(symbol_leaf("x"));
      f
    };
    let operands = operand_list(vec![Value::Int(1), Value::Int(2)]);
    bind_parameters(&env, &formals, &operands).unwrap();
    assert_eq!(bound_int(&env, "x"), Some(2));
    assert_eq!(env.borrow().lookup_local(&IString::from("#ignore")), None);
  }

  #[test]
  fn check_parameter_tree_rejects_misplaced_rest() {
    let mut f = Term::new();
    f.add_child(symbol_leaf(".rest"));
    f.add_child(symbol_leaf("x"));
    let err = check_parameter_tree(&f).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSyntax);
  }

  #[test]
  fn forwarding_preserves_the_observed_value() {
    // %x with a non-movable reference aliases; the body observes the same
    // structural value as the operand.
    let env = fresh_env();
    let source_env = fresh_env();
    let target = rc_cell(Term::with_value(Value::Int(9)));
    let weak = EnvironmentWeakRef::new(&source_env);
    let operands = {
      let mut list = Term::new();
      list.add_child(Term::with_value(Value::Reference(TermReference::new(
        target.clone(),
        TermTags::empty(),
        weak.clone(),
      ))));
      rc_cell(list)
    };
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("%x"));
      f
    };
    bind_parameters(&env, &formals, &operands).unwrap();
    let binding = env.borrow().lookup_local(&IString::from("x")).unwrap();
    let b = binding.borrow();
    let r = b.value.try_reference().expect("aliasing binding expected");
    assert_eq!(r.get().borrow().value, Value::Int(9));

    // A movable reference is consumed instead.
    let unique = rc_cell(Term::with_value(Value::Int(4)));
    let operands = {
      let mut list = Term::new();
      list.add_child(Term::with_value(Value::Reference(TermReference::new(
        unique.clone(),
        TermTags::from(TermTag::Unique),
        weak,
      ))));
      rc_cell(list)
    };
    let formals = {
      let mut f = Term::new();
      f.add_child(symbol_leaf("%y"));
      f
    };
    bind_parameters(&env, &formals, &operands).unwrap();
    let binding = env.borrow().lookup_local(&IString::from("y")).unwrap();
    assert_eq!(binding.borrow().value, Value::Int(4));
    assert!(binding.borrow().tags.contains(TermTag::Unique));
    assert!(unique.borrow().is_empty_list()); // consumed
  }
}
