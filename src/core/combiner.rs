/*!

Combiners: operatives (fexprs) and the applicatives wrapping them.

A combiner is a wrap count plus a body. Count zero is an operative; each
level above that is one `wrap`, peeling one operand evaluation pass per
level before the underlying body runs. Bodies are either native handlers
`(term, ctx) → status` or user operatives captured by `$vau`.

The application state machine is ArgEval → Bind → Body → TailCall|Return.
ArgEval schedules one reducer per operand, left to right. Bind builds a
fresh environment child of the combiner's static environment and runs the
parameter binder. Body replaces the combining term with a copy of the vau
body and evaluates it in place, which is what makes the final form of a
body a proper tail call: the only frame an application leaves behind is the
mergeable lift-to-return frame, and consecutive tail applications on the
same term share one.

Frames capture their operand handles instead of re-reading the combining
term, so a continuation that replays them finds the operands even after the
term itself was overwritten by a normal return.

*/

use std::{
  fmt::{Debug, Display, Formatter},
  rc::Rc,
};

use crate::{
  abstractions::{rc_cell, IString},
  core::{
    binding::bind_parameters,
    context::{Context, Reducer, Reduction, ReductionStatus},
    environment::{Environment, EnvironmentWeakRef},
    error::UnilangError,
    eval::{eval_reducer, operand_handles},
    term::{RcTerm, Term},
    value::Value,
  },
};

pub type NativeFn   = Rc<dyn Fn(&RcTerm, &mut Context) -> Reduction>;
pub type RcCombiner = Rc<Combiner>;

pub struct Combiner {
  /// Number of wrap levels; zero is an operative.
  pub wrapping: usize,
  /// Diagnostic name; the name a combiner was first bound under.
  pub name    : IString,
  pub body    : CombinerBody,
}

#[derive(Clone)]
pub enum CombinerBody {
  Native(NativeFn),
  Vau(Rc<VauBody>),
}

/// A user operative: the captured halves of a `$vau` form.
pub struct VauBody {
  /// Normalized parameter tree.
  pub formals    : Term,
  /// Name binding the caller's environment, if not `#ignore`.
  pub eformal    : Option<IString>,
  pub body       : Term,
  /// The static environment, held strongly: a closure keeps its scope alive.
  pub environment: Value,
  /// Reference-preserving variant: the result is not lifted to a value.
  pub no_lift    : bool,
}

impl Combiner {
  pub fn native(
    name: impl Into<IString>,
    wrapping: usize,
    f: impl Fn(&RcTerm, &mut Context) -> Reduction + 'static,
  ) -> RcCombiner {
    Rc::new(Combiner {
      wrapping,
      name: name.into(),
      body: CombinerBody::Native(Rc::new(f)),
    })
  }

  pub fn operative(name: impl Into<IString>, vau: VauBody) -> RcCombiner {
    Rc::new(Combiner {
      wrapping: 0,
      name: name.into(),
      body: CombinerBody::Vau(Rc::new(vau)),
    })
  }

  #[inline(always)]
  pub fn is_applicative(&self) -> bool {
    self.wrapping > 0
  }

  #[inline(always)]
  pub fn is_operative(&self) -> bool {
    self.wrapping == 0
  }

  /// Lifts to an applicative: one more operand evaluation pass.
  pub fn wrap(this: &RcCombiner) -> RcCombiner {
    Rc::new(Combiner {
      wrapping: this.wrapping + 1,
      name    : this.name.clone(),
      body    : this.body.clone(),
    })
  }

  /// Exposes the underlying combiner of an applicative.
  pub fn unwrap(this: &RcCombiner) -> Result<RcCombiner, UnilangError> {
    if this.wrapping == 0 {
      return Err(UnilangError::type_error(format!(
        "cannot unwrap the operative '{}'",
        this.name
      )));
    }
    Ok(Rc::new(Combiner {
      wrapping: this.wrapping - 1,
      name    : this.name.clone(),
      body    : this.body.clone(),
    }))
  }
}

/// Combiners are equal when they share a body and a wrap count.
impl PartialEq for Combiner {
  fn eq(&self, other: &Combiner) -> bool {
    self.wrapping == other.wrapping
        && match (&self.body, &other.body) {
          (CombinerBody::Native(a), CombinerBody::Native(b)) => Rc::ptr_eq(a, b),
          (CombinerBody::Vau(a), CombinerBody::Vau(b)) => Rc::ptr_eq(a, b),
          _ => false,
        }
  }
}

impl Display for Combiner {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.is_applicative() {
      write!(f, "#[applicative {}]", self.name)
    } else {
      write!(f, "#[operative {}]", self.name)
    }
  }
}

impl Debug for Combiner {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

/// Drives one application of `comb` to the combining term. `remaining` is
/// the number of operand evaluation passes still owed; each pass schedules
/// per-operand reducers left to right and then re-enters with one less.
pub fn apply_combiner(
  term: &RcTerm,
  comb: &RcCombiner,
  remaining: usize,
  ctx: &mut Context,
) -> Reduction {
  if remaining > 0 {
    let env = ctx.record.clone();
    let head = match term.borrow().first() {
      Some(h) => h.clone(),
      None => return Err(UnilangError::list_type("combination lost its head")),
    };
    let operands = operand_handles(term);

    let t = term.clone();
    let c = comb.clone();
    let e = env.clone();
    let h = head;
    let ops = operands.clone();
    ctx.setup_front(Reducer::step(move |ctx| {
      ctx.record = e.clone();
      // Restore the combination shape from the captured handles; a replayed
      // continuation frame may find the term already overwritten.
      {
        let mut node = t.borrow_mut();
        let mut children = Vec::with_capacity(ops.len() + 1);
        children.push(h.clone());
        children.extend(ops.iter().cloned());
        node.set_content(Term::with_children(children));
      }
      apply_combiner(&t, &c, remaining - 1, ctx)
    }));
    for operand in operands.into_iter().rev() {
      ctx.setup_front(eval_reducer(operand, env.clone()));
    }
    Ok(ReductionStatus::Neutral)
  } else {
    match &comb.body {
      CombinerBody::Native(f) => {
        let name = comb.name.clone();
        f(term, ctx).map_err(|e| e.with_context(format!("in '{}'", name)))
      }
      CombinerBody::Vau(vau) => apply_vau(term, vau, ctx),
    }
  }
}

/// Bind and Body for a user operative.
fn apply_vau(term: &RcTerm, vau: &Rc<VauBody>, ctx: &mut Context) -> Reduction {
  // Bind: fresh environment child of the captured static environment.
  let local = rc_cell(Environment::with_parent(vau.environment.clone())?);
  if let Some(name) = &vau.eformal {
    let caller = Value::WeakEnvironment(EnvironmentWeakRef::new(&ctx.record));
    local
        .borrow_mut()
        .define(name.clone(), Term::with_value(caller))?;
  }
  let operands = rc_cell(Term::with_children(operand_handles(term)));
  bind_parameters(&local, &vau.formals, &operands)?;

  // Body, in tail position: the body replaces the combining term and is
  // evaluated there, so tail calls reuse this very node.
  let body = vau.body.deep_copy();
  term.borrow_mut().set_content(body);
  if !vau.no_lift {
    ctx.setup_front(Reducer::Lift(term.clone()));
  }
  ctx.setup_front(eval_reducer(term.clone(), local));
  Ok(ReductionStatus::Neutral)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::context::ReductionStatus;

  fn noop() -> RcCombiner {
    Combiner::native("noop", 1, |_, _| Ok(ReductionStatus::Retained))
  }

  #[test]
  fn wrap_then_unwrap_is_identity() {
    let applicative = noop();
    let roundtrip = Combiner::wrap(&Combiner::unwrap(&applicative).unwrap());
    assert_eq!(*applicative, *roundtrip);
  }

  #[test]
  fn wrap_nests() {
    let applicative = noop();
    let doubly = Combiner::wrap(&applicative);
    assert_eq!(doubly.wrapping, 2);
    assert_ne!(*applicative, *doubly);
  }

  #[test]
  fn operatives_cannot_be_unwrapped() {
    let operative = Combiner::native("op", 0, |_, _| Ok(ReductionStatus::Retained));
    assert!(Combiner::unwrap(&operative).is_err());
  }
}
