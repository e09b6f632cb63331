/*!

Reference values and the discipline that governs aliasing and moves.

A `TermReference` is the host type of reference values: a tag word, a
strong handle on the target term, and a weak anchor of the environment
whose lifetime keeps the target meaningful. The strong handle keeps the
referent memory-safe even if the environment dies; the weak anchor is what
gates movability and lets expiry be observed.

Reference-to-reference chains never persist as stored values: `collapse`
folds them into a single reference with tags merged through `propagate_to`,
and `lift_to_return` turns a reference into a first-class value at
application boundaries.

*/

use std::rc::Rc;

use crate::core::{
  environment::EnvironmentWeakRef,
  error::UnilangError,
  term::{
    ensure_value_tags, is_movable, propagate_to, RcTerm, Term, TermTag, TermTags,
  },
  value::Value,
};

#[derive(Clone)]
pub struct TermReference {
  tags  : TermTags,
  target: RcTerm,
  r_env : EnvironmentWeakRef,
}

impl TermReference {
  pub fn new(target: RcTerm, tags: TermTags, r_env: EnvironmentWeakRef) -> TermReference {
    TermReference { tags, target, r_env }
  }

  #[inline(always)]
  pub fn get(&self) -> RcTerm {
    self.target.clone()
  }

  #[inline(always)]
  pub fn tags(&self) -> TermTags {
    self.tags
  }

  #[inline(always)]
  pub fn add_tags(&mut self, tags: TermTags) {
    self.tags |= tags;
  }

  #[inline(always)]
  pub fn is_modifiable(&self) -> bool {
    !self.tags.contains(TermTag::Nonmodifying)
  }

  #[inline(always)]
  pub fn is_unique(&self) -> bool {
    self.tags.contains(TermTag::Unique)
  }

  #[inline(always)]
  pub fn is_temporary(&self) -> bool {
    self.tags.contains(TermTag::Temporary)
  }

  /// Movable iff the tag bits allow it and the anchored environment is
  /// still alive.
  #[inline(always)]
  pub fn is_movable(&self) -> bool {
    is_movable(self.tags) && self.r_env.is_alive()
  }

  #[inline(always)]
  pub fn environment(&self) -> &EnvironmentWeakRef {
    &self.r_env
  }
}

/// References are equal when they denote the same node.
impl PartialEq for TermReference {
  fn eq(&self, other: &TermReference) -> bool {
    Rc::ptr_eq(&self.target, &other.target)
  }
}

impl std::fmt::Debug for TermReference {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#[reference -> {}]", self.target.borrow())
  }
}

/// One step through a reference: the referred term if `t` holds a
/// reference, `t` itself otherwise.
pub fn reference_term(t: &RcTerm) -> RcTerm {
  let referent = t.borrow().value.try_reference().map(|r| r.get());
  referent.unwrap_or_else(|| t.clone())
}

/// Follows a whole chain of references to the final referent. Most chains
/// are collapsed at creation; this is the safety net for uncollapsed ones.
pub fn ultimate_referent(t: &RcTerm) -> RcTerm {
  let mut current = t.clone();
  loop {
    let next = current.borrow().value.try_reference().map(|r| r.get());
    match next {
      Some(target) => current = target,
      None => return current,
    }
  }
}

/// Folds a chain of references into a reference to the innermost referent.
/// Tags merge through `propagate_to`, so constness accumulated anywhere on
/// the chain sticks. Returns whether any indirection was removed; the
/// operation is idempotent.
pub fn collapse(r: TermReference) -> (TermReference, bool) {
  let mut current   = r;
  let mut collapsed = false;
  loop {
    let inner = current.target.borrow().value.try_reference().cloned();
    match inner {
      Some(inner_ref) => {
        let tags = propagate_to(inner_ref.tags, current.tags);
        current = TermReference {
          tags,
          target: inner_ref.target,
          r_env : inner_ref.r_env,
        };
        collapsed = true;
      }
      None => return (current, collapsed),
    }
  }
}

/// The lifting rule applied when a term is observed as a first-class value:
/// a reference result is replaced by its referent (moved when movable,
/// copied otherwise) and Temporary is cleared.
pub fn lift_to_return(term: &RcTerm) -> Result<(), UnilangError> {
  let reference = term.borrow().value.try_reference().cloned();
  if let Some(r) = reference {
    let (r, _) = collapse(r);
    let target = r.get();
    let mut content = if r.is_movable() {
      target.borrow_mut().take()
    } else {
      target.borrow().deep_copy()
    };
    content.tags = propagate_to(ensure_value_tags(content.tags), r.tags());
    term.borrow_mut().set_content(content);
  }
  let mut t = term.borrow_mut();
  t.tags = ensure_value_tags(t.tags);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::rc_cell;
  use crate::core::environment::{Environment, EnvironmentWeakRef};

  fn anchored_env() -> (crate::core::environment::RcEnv, EnvironmentWeakRef) {
    let env = rc_cell(Environment::new());
    let weak = EnvironmentWeakRef::new(&env);
    (env, weak)
  }

  #[test]
  fn collapse_is_idempotent() {
    let (_env, weak) = anchored_env();
    let innermost = rc_cell(Term::with_value(Value::Int(3)));
    let inner = TermReference::new(innermost.clone(), TermTags::from(TermTag::Nonmodifying), weak.clone());
    let middle = rc_cell(Term::with_value(Value::Reference(inner)));
    let outer = TermReference::new(middle, TermTags::empty(), weak);

    let (once, removed) = collapse(outer);
    assert!(removed);
    assert!(Rc::ptr_eq(&once.get(), &innermost));
    assert!(once.tags().contains(TermTag::Nonmodifying));

    let (twice, removed_again) = collapse(once.clone());
    assert!(!removed_again);
    assert_eq!(once, twice);
    assert_eq!(once.tags(), twice.tags());
  }

  #[test]
  fn movability_requires_a_live_anchor() {
    let (env, weak) = anchored_env();
    let target = rc_cell(Term::with_value(Value::Int(1)));
    let r = TermReference::new(target, TermTags::from(TermTag::Unique), weak);
    assert!(r.is_movable());

    drop(env);
    assert!(!r.is_movable());
  }

  #[test]
  fn lift_to_return_copies_nonmovable_referents() {
    let (_env, weak) = anchored_env();
    let target = rc_cell(Term::with_value(Value::Int(11)));
    let holder = rc_cell(Term::with_value(Value::Reference(TermReference::new(
      target.clone(),
      TermTags::empty(),
      weak,
    ))));

    lift_to_return(&holder).unwrap();
    assert_eq!(holder.borrow().value, Value::Int(11));
    // The referent is intact: the reference was not movable.
    assert_eq!(target.borrow().value, Value::Int(11));
  }
}
