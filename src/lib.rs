/*!

An interpreter core for Unilang, a Kernel-family language with first-class
environments, first-class operatives (fexprs) and applicatives, and tagged
term references that give deterministic moves without a tracing collector.

Evaluation is driven by an explicit reducer trampoline, which is what makes
tail calls proper and one-shot continuations possible without copying the
native stack. The engine is single threaded; an [`api::Interpreter`] owns its
root environment and shares nothing with other instances.

*/

pub mod abstractions;
pub mod api;
mod core;
pub mod reader;

// We re-export abstractions that are meant to be used publicly.
pub use abstractions::IString;

pub use core::{
  combiner::{Combiner, CombinerBody, RcCombiner, VauBody},
  context::{Context, Reducer, Reduction, ReductionStatus},
  continuation::{Continuation, RcContinuation},
  environment::{Environment, EnvironmentWeakRef, RcEnv},
  error::{ErrorKind, UnilangError},
  reference::TermReference,
  term::{RcTerm, Term, TermTag, TermTags},
  value::{HostObject, HostValue, Value},
};
