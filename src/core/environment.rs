/*!

Environments: name→term binding tables wired into a graph by parent
specifications.

A parent specification is an ordinary value box holding one of four shapes,
tried in order on a lookup miss: a strong environment handle, a weak handle
(a miss if expired), an ordered list of parent specifications searched
left-to-right depth-first, or the empty box ending the chain. The list case
is driven by redirector continuations: visiting a list immediately descends
into its first element and saves the rest, to be popped one element at a
time whenever a chain bottoms out.

Every environment owns an anchor, a shared sentinel whose lifetime is at
least the environment's. Weak references hold a weak anchor, which is how
reference values and weak parents detect expiry without keeping anything
alive.

*/

use std::{
  collections::{HashMap, VecDeque},
  rc::{Rc, Weak},
};

use tracing::trace;

use crate::{
  abstractions::{weak_cell, IString, RcCell, WeakCell},
  core::{
    error::UnilangError,
    term::{RcTerm, Term},
    value::Value,
  },
};

/// The shared sentinel anchoring an environment's lifetime.
pub struct EnvironmentAnchor;

pub type RcEnv      = RcCell<Environment>;
pub type BindingMap = HashMap<IString, RcTerm>;

pub struct Environment {
  bindings  : BindingMap,
  /// Parent specification; see the module documentation for the accepted shapes.
  pub parent: Value,
  frozen    : bool,
  anchor    : Rc<EnvironmentAnchor>,
}

impl Environment {
  pub fn new() -> Environment {
    Environment {
      bindings: BindingMap::new(),
      parent  : Value::Unit,
      frozen  : false,
      anchor  : Rc::new(EnvironmentAnchor),
    }
  }

  /// Validates the parent shape before accepting it.
  pub fn with_parent(parent: Value) -> Result<Environment, UnilangError> {
    check_parent(&parent)?;
    let mut env = Environment::new();
    env.parent = parent;
    Ok(env)
  }

  // region Binding table

  /// Installs or overwrites a binding.
  pub fn define(&mut self, name: IString, term: Term) -> Result<(), UnilangError> {
    self.define_shared(name, crate::abstractions::rc_cell(term))
  }

  pub fn define_shared(&mut self, name: IString, term: RcTerm) -> Result<(), UnilangError> {
    if self.frozen {
      return Err(UnilangError::nonmodifiable_environment());
    }
    self.bindings.insert(name, term);
    Ok(())
  }

  /// Like `define`, but refuses to overwrite an existing binding.
  pub fn define_checked(&mut self, name: IString, term: Term) -> Result<(), UnilangError> {
    if self.frozen {
      return Err(UnilangError::nonmodifiable_environment());
    }
    if self.bindings.contains_key(&name) {
      return Err(UnilangError::new(
        crate::core::error::ErrorKind::BadIdentifier,
        format!("duplicate definition of '{}'", name),
      ));
    }
    self.bindings.insert(name, crate::abstractions::rc_cell(term));
    Ok(())
  }

  pub fn remove(&mut self, name: &IString) -> Result<bool, UnilangError> {
    if self.frozen {
      return Err(UnilangError::nonmodifiable_environment());
    }
    Ok(self.bindings.remove(name).is_some())
  }

  #[inline(always)]
  pub fn lookup_local(&self, name: &IString) -> Option<RcTerm> {
    self.bindings.get(name).cloned()
  }

  /// Drains the binding table; used when bindings are staged in a scratch
  /// environment before being routed elsewhere.
  pub(crate) fn take_bindings(&mut self) -> BindingMap {
    std::mem::take(&mut self.bindings)
  }

  // endregion

  /// Irreversible: every mutator fails afterwards.
  pub fn freeze(&mut self) {
    self.frozen = true;
  }

  #[inline(always)]
  pub fn is_frozen(&self) -> bool {
    self.frozen
  }

  #[inline(always)]
  pub fn anchor(&self) -> Rc<EnvironmentAnchor> {
    self.anchor.clone()
  }
}

impl Default for Environment {
  fn default() -> Environment {
    Environment::new()
  }
}

/// A weak environment handle: the environment cell plus a weak anchor used
/// to detect expiry.
#[derive(Clone)]
pub struct EnvironmentWeakRef {
  env   : WeakCell<Environment>,
  anchor: Weak<EnvironmentAnchor>,
}

impl EnvironmentWeakRef {
  pub fn new(env: &RcEnv) -> EnvironmentWeakRef {
    let anchor = Rc::downgrade(&env.borrow().anchor);
    EnvironmentWeakRef {
      env: weak_cell(env),
      anchor,
    }
  }

  pub fn lock(&self) -> Option<RcEnv> {
    self.env.upgrade()
  }

  #[inline(always)]
  pub fn is_alive(&self) -> bool {
    self.anchor.strong_count() > 0
  }
}

impl PartialEq for EnvironmentWeakRef {
  fn eq(&self, other: &EnvironmentWeakRef) -> bool {
    match (self.lock(), other.lock()) {
      (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
      (None, None) => true,
      _ => false,
    }
  }
}

/// Accepts the four parent shapes, recursively for lists.
pub fn check_parent(parent: &Value) -> Result<(), UnilangError> {
  match parent {
    Value::Unit | Value::Environment(_) | Value::WeakEnvironment(_) => Ok(()),
    Value::EnvironmentList(list) => {
      for entry in list {
        check_parent(entry)?;
      }
      Ok(())
    }
    other => Err(UnilangError::type_error(format!(
      "invalid parent specification of kind {:?}",
      other.kind()
    ))),
  }
}

/// Resolves an environment-denoting value to a strong handle.
pub fn resolve_environment(value: &Value) -> Result<RcEnv, UnilangError> {
  match value {
    Value::Environment(env) => Ok(env.clone()),
    Value::WeakEnvironment(weak) => weak
        .lock()
        .ok_or_else(|| UnilangError::type_error("weak environment handle has expired")),
    Value::Shared(cell) => {
      let inner = cell.borrow().clone();
      resolve_environment(&inner)
    }
    other => Err(UnilangError::type_error(format!(
      "invalid environment of kind {:?}",
      other.kind()
    ))),
  }
}

/// Name resolution over the environment graph.
///
/// Returns the first binding in depth-first, left-to-right parent order
/// together with the environment owning it. Revisiting an environment is
/// refused: the revisit is pruned, which both terminates cyclic parent
/// specifications and keeps diamond-shaped graphs linear.
pub fn resolve(
  start: &RcEnv,
  name: &IString,
) -> Result<Option<(RcTerm, RcEnv)>, UnilangError> {
  let mut env = start.clone();
  // Saved redirector continuations, one per partially visited list.
  let mut redirectors: Vec<VecDeque<Value>> = Vec::new();
  let mut visited: Vec<*const ()> = Vec::new();

  'search: loop {
    let key = Rc::as_ptr(&env) as *const ();
    if visited.contains(&key) {
      trace!(name = %name, "pruned revisit during name resolution");
      match next_redirected(&mut redirectors) {
        Some(spec) => match descend(spec, &mut redirectors)? {
          Some(next) => {
            env = next;
            continue 'search;
          }
          None => return Ok(None),
        },
        None => return Ok(None),
      }
    }
    visited.push(key);

    let local_hit = env.borrow().lookup_local(name);
    if let Some(hit) = local_hit {
      return Ok(Some((hit, env)));
    }

    let spec = env.borrow().parent.clone();
    match descend(spec, &mut redirectors)? {
      Some(next) => env = next,
      None => return Ok(None),
    }
  }
}

/// Interprets a parent specification until it yields an environment or the
/// search space is exhausted.
fn descend(
  spec: Value,
  redirectors: &mut Vec<VecDeque<Value>>,
) -> Result<Option<RcEnv>, UnilangError> {
  let mut spec = spec;
  loop {
    match spec {
      Value::Environment(env) => return Ok(Some(env)),
      Value::WeakEnvironment(weak) => match weak.lock() {
        Some(env) => return Ok(Some(env)),
        // Expired parents are a miss; fall through to the redirectors.
        None => match next_redirected(redirectors) {
          Some(next) => spec = next,
          None => return Ok(None),
        },
      },
      Value::EnvironmentList(list) => {
        let mut rest: VecDeque<Value> = list.into();
        match rest.pop_front() {
          Some(first) => {
            // The redirector is installed once per list; it pops one
            // element each time it fires.
            if !rest.is_empty() {
              redirectors.push(rest);
            }
            spec = first;
          }
          None => match next_redirected(redirectors) {
            Some(next) => spec = next,
            None => return Ok(None),
          },
        }
      }
      Value::Unit => match next_redirected(redirectors) {
        Some(next) => spec = next,
        None => return Ok(None),
      },
      Value::Shared(cell) => {
        let inner = cell.borrow().clone();
        spec = inner;
      }
      other => {
        return Err(UnilangError::type_error(format!(
          "invalid parent specification of kind {:?}",
          other.kind()
        )))
      }
    }
  }
}

fn next_redirected(redirectors: &mut Vec<VecDeque<Value>>) -> Option<Value> {
  while let Some(top) = redirectors.last_mut() {
    if let Some(next) = top.pop_front() {
      return Some(next);
    }
    redirectors.pop();
  }
  None
}

/// Overwrites an existing reachable binding; fails with BadIdentifier when
/// the name is bound nowhere in the graph.
pub fn set(start: &RcEnv, name: &IString, value: Term) -> Result<(), UnilangError> {
  match resolve(start, name)? {
    Some((slot, owner)) => {
      if owner.borrow().is_frozen() {
        return Err(UnilangError::nonmodifiable_environment());
      }
      slot.borrow_mut().set_content(value);
      Ok(())
    }
    None => Err(UnilangError::bad_identifier(name)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::rc_cell;
  use crate::core::error::ErrorKind;
  use crate::core::value::Value;

  fn env_with(name: &str, n: i64) -> RcEnv {
    let env = rc_cell(Environment::new());
    env
        .borrow_mut()
        .define(IString::from(name), Term::with_value(Value::Int(n)))
        .unwrap();
    env
  }

  fn resolved_int(start: &RcEnv, name: &str) -> Option<i64> {
    resolve(start, &IString::from(name))
        .unwrap()
        .and_then(|(t, _)| t.borrow().value.try_integer().copied())
  }

  #[test]
  fn lookup_walks_strong_parent_chains() {
    let grandparent = env_with("x", 1);
    let parent = rc_cell(
      Environment::with_parent(Value::Environment(grandparent.clone())).unwrap(),
    );
    let child = rc_cell(
      Environment::with_parent(Value::Environment(parent.clone())).unwrap(),
    );

    assert_eq!(resolved_int(&child, "x"), Some(1));
    let (_, owner) = resolve(&child, &IString::from("x")).unwrap().unwrap();
    assert!(Rc::ptr_eq(&owner, &grandparent));
    assert_eq!(resolved_int(&child, "y"), None);
  }

  #[test]
  fn list_parents_are_searched_left_to_right_depth_first() {
    // left's own parent must be exhausted before right is considered.
    let left_parent = env_with("a", 1);
    let left = rc_cell(
      Environment::with_parent(Value::Environment(left_parent)).unwrap(),
    );
    let right = env_with("a", 2);
    right
        .borrow_mut()
        .define(IString::from("b"), Term::with_value(Value::Int(3)))
        .unwrap();

    let child = rc_cell(
      Environment::with_parent(Value::EnvironmentList(vec![
        Value::Environment(left),
        Value::Environment(right),
      ]))
      .unwrap(),
    );

    assert_eq!(resolved_int(&child, "a"), Some(1)); // depth-first through left
    assert_eq!(resolved_int(&child, "b"), Some(3)); // redirected to right
    assert_eq!(resolved_int(&child, "c"), None);
  }

  #[test]
  fn expired_weak_parent_is_a_miss() {
    let parent = env_with("x", 1);
    let weak = EnvironmentWeakRef::new(&parent);
    let child = rc_cell(
      Environment::with_parent(Value::WeakEnvironment(weak)).unwrap(),
    );

    assert_eq!(resolved_int(&child, "x"), Some(1));
    drop(parent);
    assert_eq!(resolved_int(&child, "x"), None);
  }

  #[test]
  fn cyclic_parent_specifications_terminate() {
    let a = rc_cell(Environment::new());
    let b = rc_cell(
      Environment::with_parent(Value::Environment(a.clone())).unwrap(),
    );
    a.borrow_mut().parent = Value::Environment(b.clone());

    assert!(resolve(&a, &IString::from("missing")).unwrap().is_none());
  }

  #[test]
  fn diamond_graphs_do_not_false_positive_as_cycles() {
    let ground = env_with("g", 7);
    let left = rc_cell(
      Environment::with_parent(Value::Environment(ground.clone())).unwrap(),
    );
    let right = rc_cell(
      Environment::with_parent(Value::Environment(ground.clone())).unwrap(),
    );
    right
        .borrow_mut()
        .define(IString::from("r"), Term::with_value(Value::Int(8)))
        .unwrap();
    let child = rc_cell(
      Environment::with_parent(Value::EnvironmentList(vec![
        Value::Environment(left),
        Value::Environment(right),
      ]))
      .unwrap(),
    );

    assert_eq!(resolved_int(&child, "g"), Some(7));
    assert_eq!(resolved_int(&child, "r"), Some(8));
  }

  #[test]
  fn frozen_environments_reject_all_mutators() {
    let env = env_with("x", 1);
    env.borrow_mut().freeze();

    let name = IString::from("y");
    let define_err = env
        .borrow_mut()
        .define(name.clone(), Term::with_value(Value::Int(2)))
        .unwrap_err();
    assert_eq!(define_err.kind, ErrorKind::NonmodifiableEnvironment);

    let remove_err = env.borrow_mut().remove(&IString::from("x")).unwrap_err();
    assert_eq!(remove_err.kind, ErrorKind::NonmodifiableEnvironment);

    let set_err = set(&env, &IString::from("x"), Term::with_value(Value::Int(3))).unwrap_err();
    assert_eq!(set_err.kind, ErrorKind::NonmodifiableEnvironment);
  }

  #[test]
  fn set_requires_a_reachable_binding() {
    let env = env_with("x", 1);
    set(&env, &IString::from("x"), Term::with_value(Value::Int(5))).unwrap();
    assert_eq!(resolved_int(&env, "x"), Some(5));

    let err = set(&env, &IString::from("nope"), Term::with_value(Value::Int(0))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadIdentifier);
  }

  #[test]
  fn anchor_expires_with_the_environment() {
    let env = rc_cell(Environment::new());
    let weak = EnvironmentWeakRef::new(&env);
    assert!(weak.is_alive());
    drop(env);
    assert!(!weak.is_alive());
  }
}
