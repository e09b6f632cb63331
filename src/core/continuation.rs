/*!

One-shot continuations.

`call/1cc` snapshots the live half of the evaluation: the pending reducer
deque (reference-counted clones of its entries), the environment record,
and the evaluation root. Invoking the continuation discards whatever is
currently queued, restores the snapshot, and injects the argument into the
resume term — the combining term of the original `call/1cc` application.
The snapshot is consumed by the first invocation; a second one raises
`BadContinuation`.

*/

use std::{
  cell::RefCell,
  collections::VecDeque,
  fmt::{Debug, Formatter},
  rc::Rc,
};

use crate::core::{
  context::{Context, Reducer, Reduction, ReductionStatus},
  environment::RcEnv,
  error::UnilangError,
  reference::lift_to_return,
  term::{MaybeTerm, RcTerm},
};

pub type RcContinuation = Rc<Continuation>;

pub struct Continuation {
  state: RefCell<Option<CapturedState>>,
}

pub(crate) struct CapturedState {
  pub stack : VecDeque<Reducer>,
  pub record: RcEnv,
  pub root  : MaybeTerm,
  /// The term the resume value is injected into.
  pub resume: RcTerm,
}

impl std::fmt::Debug for CapturedState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CapturedState").finish_non_exhaustive()
  }
}

impl Continuation {
  /// Captures the current continuation with `resume` as its entry term.
  pub(crate) fn capture(ctx: &Context, resume: RcTerm) -> RcContinuation {
    Rc::new(Continuation {
      state: RefCell::new(Some(CapturedState {
        stack : ctx.capture_stack(),
        record: ctx.record.clone(),
        root  : ctx.root.clone(),
        resume,
      })),
    })
  }

  fn take(&self) -> Result<CapturedState, UnilangError> {
    self
        .state
        .borrow_mut()
        .take()
        .ok_or_else(UnilangError::bad_continuation)
  }

  /// Whether the single shot has been fired.
  pub fn is_spent(&self) -> bool {
    self.state.borrow().is_none()
  }
}

impl Debug for Continuation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "#[continuation{}]",
      if self.is_spent() { " (spent)" } else { "" }
    )
  }
}

/// Fires the continuation: `term` is the invoking combination whose single
/// operand has already been evaluated.
pub(crate) fn invoke_continuation(
  k: &RcContinuation,
  term: &RcTerm,
  ctx: &mut Context,
) -> Reduction {
  let operand = term
      .borrow()
      .children()
      .get(1)
      .cloned()
      .ok_or_else(|| UnilangError::arity(1, 0))?;
  lift_to_return(&operand)?;

  let state = k.take()?;
  let content = operand.borrow_mut().take();
  state.resume.borrow_mut().set_content(content);

  ctx.unwind();
  ctx.replace_stack(state.stack);
  ctx.record = state.record;
  ctx.root = state.root;
  Ok(ReductionStatus::Neutral)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::abstractions::rc_cell;
  use crate::core::environment::Environment;
  use crate::core::error::ErrorKind;
  use crate::core::term::Term;

  #[test]
  fn a_continuation_fires_exactly_once() {
    let ctx = Context::new(rc_cell(Environment::new()));
    let resume = rc_cell(Term::new());
    let k = Continuation::capture(&ctx, resume);

    assert!(!k.is_spent());
    assert!(k.take().is_ok());
    assert!(k.is_spent());
    let err = k.take().unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadContinuation);
  }
}
