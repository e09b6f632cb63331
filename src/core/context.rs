/*!

The per-evaluation context and the reducer trampoline.

A reducer is a first-class handler `(ctx) → status`. The context keeps a
deque of pending reducers; `rewrite` pops the front and runs it until the
deque drains. Reducers never re-enter the trampoline: to evaluate a
subterm, a reducer pushes a successor and returns, so the deque depth
reflects live continuations only. That is what makes tail calls proper and
lets `call/1cc` capture the whole continuation by cloning the deque.

A `Lift` entry is the one structured reducer: the lift-to-return step of an
application. Pushing a `Lift` for a term that already has one at the front
merges the two, which is exactly the frame elision that keeps tail calls
from accumulating lift frames.

*/

use std::{
  collections::VecDeque,
  rc::Rc,
  sync::{
    atomic::{AtomicBool, Ordering::Relaxed},
    Arc,
  },
};

use tracing::trace;

use crate::core::{
  environment::RcEnv,
  error::UnilangError,
  eval,
  reference::lift_to_return,
  term::{MaybeTerm, RcTerm},
};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum ReductionStatus {
  /// The term is no longer needed.
  Clean,
  /// No progress was made this step.
  #[default]
  Neutral,
  /// The term carries the result.
  Retained,
  /// Re-evaluate the same term.
  Retrying,
}

pub type Reduction = Result<ReductionStatus, UnilangError>;

pub type ReducerFn = dyn Fn(&mut Context) -> Reduction;

#[derive(Clone)]
pub enum Reducer {
  Step(Rc<ReducerFn>),
  /// Lift-to-return frame for an application on `term`; mergeable.
  Lift(RcTerm),
}

impl Reducer {
  pub fn step(f: impl Fn(&mut Context) -> Reduction + 'static) -> Reducer {
    Reducer::Step(Rc::new(f))
  }

  fn run(&self, ctx: &mut Context) -> Reduction {
    match self {
      Reducer::Step(f) => f(ctx),
      Reducer::Lift(term) => {
        lift_to_return(term)?;
        Ok(ReductionStatus::Retained)
      }
    }
  }
}

pub struct Context {
  /// The current environment record.
  pub record        : RcEnv,
  current           : VecDeque<Reducer>,
  pub last_status   : ReductionStatus,
  /// The term currently under reduction.
  pub next_term     : MaybeTerm,
  /// The term being applied, for diagnostics and tail-call elision.
  pub combining_term: MaybeTerm,
  /// The root of the current `evaluate` call; carries the final result.
  pub root          : MaybeTerm,
  /// Opaque source name carried into tail frames for diagnostics.
  pub current_source: String,
  cancel            : Arc<AtomicBool>,
  max_depth         : usize,
}

impl Context {
  pub fn new(record: RcEnv) -> Context {
    Context {
      record,
      current       : VecDeque::new(),
      last_status   : ReductionStatus::Neutral,
      next_term     : None,
      combining_term: None,
      root          : None,
      current_source: String::new(),
      cancel        : Arc::new(AtomicBool::new(false)),
      max_depth     : 0,
    }
  }

  // region Reducer queue

  /// Pushes a reducer to run before everything currently queued. A `Lift`
  /// for a term whose lift frame is already at the front is merged away.
  pub fn setup_front(&mut self, reducer: Reducer) {
    if let (Reducer::Lift(term), Some(Reducer::Lift(front))) =
        (&reducer, self.current.front())
    {
      if Rc::ptr_eq(term, front) {
        return;
      }
    }
    self.current.push_front(reducer);
  }

  #[inline(always)]
  pub fn is_alive(&self) -> bool {
    !self.current.is_empty()
  }

  #[inline(always)]
  pub fn stack_depth(&self) -> usize {
    self.current.len()
  }

  /// High-water mark of the reducer queue, for diagnostics.
  #[inline(always)]
  pub fn max_stack_depth(&self) -> usize {
    self.max_depth
  }

  pub(crate) fn capture_stack(&self) -> VecDeque<Reducer> {
    self.current.clone()
  }

  pub(crate) fn replace_stack(&mut self, stack: VecDeque<Reducer>) {
    self.current = stack;
  }

  /// Discards every pending reducer.
  pub fn unwind(&mut self) {
    self.current.clear();
  }

  // endregion

  // region Cancellation

  /// The host-settable flag checked at every trampoline step.
  pub fn cancel_flag(&self) -> Arc<AtomicBool> {
    self.cancel.clone()
  }

  #[inline(always)]
  pub fn is_cancelled(&self) -> bool {
    self.cancel.load(Relaxed)
  }

  // endregion

  /// Runs the trampoline: applies one reducer at a time until none remain.
  /// A failure unwinds the remaining reducers and is returned to the
  /// caller; cancellation does the same with a `Cancelled` error.
  ///
  /// Re-entrant: a host callback that evaluates from inside a reducer gets
  /// a nested run that drains only its own frames.
  pub fn rewrite(&mut self, reducer: Reducer) -> Reduction {
    let base = self.current.len();
    self.setup_front(reducer);
    while self.current.len() > base {
      let next = match self.current.pop_front() {
        Some(next) => next,
        None => break,
      };
      if self.is_cancelled() {
        self.unwind();
        return Err(UnilangError::cancelled());
      }
      self.max_depth = self.max_depth.max(self.current.len() + 1);
      match next.run(self) {
        Ok(ReductionStatus::Retrying) => {
          // The same reducer goes back to the front for another pass.
          self.current.push_front(next);
          self.last_status = ReductionStatus::Retrying;
        }
        Ok(status) => self.last_status = status,
        Err(e) => {
          trace!(depth = self.current.len(), "unwinding after failure");
          self.unwind();
          return Err(e);
        }
      }
    }
    Ok(self.last_status)
  }

  /// Evaluates `term` in the current environment, driving the trampoline
  /// until the queue drains. On return the result is carried by the root
  /// term (which a one-shot continuation may have replaced).
  pub fn evaluate(&mut self, term: &RcTerm) -> Reduction {
    self.next_term = Some(term.clone());
    self.root = Some(term.clone());
    let reducer = eval::eval_reducer(term.clone(), self.record.clone());
    self.rewrite(reducer)
  }

  /// Exchanges the current environment record.
  pub fn switch_environment(&mut self, env: RcEnv) -> RcEnv {
    std::mem::replace(&mut self.record, env)
  }
}
