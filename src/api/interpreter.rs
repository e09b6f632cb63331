/*!

The interpreter facade: owns the root environments and the evaluation
context, and exposes the embedder API (evaluation, script and line
execution, builtin registration, cancellation).

Construction installs the primitive ground bindings, evaluates the
standard derivations through the ordinary evaluator, freezes the ground
environment, and finally switches to a fresh user environment chained
above it. Interpreters are independent: nothing is shared between two
instances.

*/

use std::{
  io::{BufRead, Write},
  sync::{atomic::AtomicBool, Arc},
};

use tracing::debug;

use crate::{
  abstractions::{log, rc_cell, RcCell},
  core::{
    context::{Context, Reduction},
    environment::{Environment, RcEnv},
    error::UnilangError,
    forms,
    loader,
    reference::lift_to_return,
    term::{RcTerm, Term},
    value::Value,
  },
  reader,
};

pub struct Interpreter {
  ctx   : Context,
  ground: RcEnv,
  echo  : bool,
}

impl Interpreter {
  /// Builds a fully booted interpreter: primitives, derivations, frozen
  /// ground, fresh user environment.
  pub fn new() -> Result<Interpreter, UnilangError> {
    log::init_logger();
    let ground = rc_cell(Environment::new());
    forms::install_ground(&ground)?;

    let mut ctx = Context::new(ground.clone());
    loader::load_derived_forms(&mut ctx)?;
    ground.borrow_mut().freeze();
    debug!("ground environment loaded and frozen");

    let user = rc_cell(Environment::with_parent(Value::Environment(ground.clone()))?);
    ctx.switch_environment(user);

    Ok(Interpreter {
      ctx,
      ground,
      echo: std::env::var_os("ECHO").is_some(),
    })
  }

  // region Accessors

  /// The frozen ground environment.
  pub fn ground_environment(&self) -> RcEnv {
    self.ground.clone()
  }

  /// The current (user) environment record.
  pub fn environment(&self) -> RcEnv {
    self.ctx.record.clone()
  }

  pub fn context_mut(&mut self) -> &mut Context {
    &mut self.ctx
  }

  /// The host-settable cancellation flag observed by the trampoline.
  pub fn cancel_flag(&self) -> Arc<AtomicBool> {
    self.ctx.cancel_flag()
  }

  // endregion

  /// Installs a host callable as an applicative in the user environment.
  pub fn register_builtin(
    &mut self,
    name: &str,
    f: impl Fn(&RcTerm, &mut Context) -> Reduction + 'static,
  ) -> Result<(), UnilangError> {
    forms::register_strict(&self.ctx.record.clone(), name, f)
  }

  /// Reads every unit in `source`. Parsing is delegated to the reader
  /// collaborator; the core itself only consumes the resulting terms.
  pub fn read_from(&self, source: &str) -> Result<Vec<Term>, UnilangError> {
    reader::parse_all(source)
  }

  /// Evaluates one term to a first-class value.
  pub fn evaluate(&mut self, term: Term) -> Result<Term, UnilangError> {
    let cell: RcCell<Term> = rc_cell(term);
    self.ctx.evaluate(&cell)?;
    // A one-shot continuation may have moved the evaluation root.
    let root = self.ctx.root.clone().unwrap_or(cell);
    lift_to_return(&root)?;
    let snapshot = root.borrow().deep_copy();
    Ok(snapshot)
  }

  /// Evaluates every unit of `line` in order, echoing results when `ECHO`
  /// is set.
  pub fn run_line(&mut self, line: &str) -> Result<(), UnilangError> {
    for unit in self.read_from(line)? {
      let result = self.evaluate(unit)?;
      if self.echo {
        println!("{}", result);
      }
    }
    Ok(())
  }

  /// Runs a script from `path`, where `-` denotes standard input.
  pub fn run_script(&mut self, path: &str) -> Result<(), UnilangError> {
    let source = if path == "-" {
      let mut buffer = String::new();
      std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
          .map_err(|e| UnilangError::type_error(format!("cannot read stdin: {}", e)))?;
      buffer
    } else {
      std::fs::read_to_string(path)
          .map_err(|e| UnilangError::type_error(format!("cannot read '{}': {}", path, e)))?
    };
    if std::env::var_os("UNILANG_NO_SRCINFO").is_none() {
      self.ctx.current_source = path.to_string();
    }
    for unit in self.read_from(&source)? {
      let result = self.evaluate(unit)?;
      if self.echo {
        println!("{}", result);
      }
    }
    Ok(())
  }

  /// The read-eval-print loop: one unit per line, errors reported and
  /// recovered from, `exit` leaves the loop.
  pub fn run_repl(&mut self) {
    let stdin = std::io::stdin();
    loop {
      print!("> ");
      let _ = std::io::stdout().flush();
      let mut line = String::new();
      match stdin.lock().read_line(&mut line) {
        Ok(0) => break,
        Ok(_) => {}
        Err(_) => break,
      }
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      if line == "exit" {
        break;
      }
      match self.read_from(line) {
        Ok(units) => {
          for unit in units {
            match self.evaluate(unit) {
              Ok(result) => println!("{}", result),
              Err(e) => println!("{}", e),
            }
          }
        }
        Err(e) => println!("{}", e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn eval_one(interpreter: &mut Interpreter, source: &str) -> Term {
    let unit = reader::parse_one(source).unwrap();
    interpreter.evaluate(unit).unwrap()
  }

  #[test]
  fn interpreters_are_independent() {
    let mut a = Interpreter::new().unwrap();
    let mut b = Interpreter::new().unwrap();
    eval_one(&mut a, "($def! x 1)");
    let err = reader::parse_one("x")
        .map(|t| b.evaluate(t))
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind, crate::core::error::ErrorKind::BadIdentifier);
    assert_eq!(eval_one(&mut a, "x").value, Value::Int(1));
  }

  #[test]
  fn the_ground_environment_is_frozen() {
    let interpreter = Interpreter::new().unwrap();
    let ground = interpreter.ground_environment();
    assert!(ground.borrow().is_frozen());
  }

  #[test]
  fn host_builtins_are_callable(){
    let mut interpreter = Interpreter::new().unwrap();
    interpreter
        .register_builtin("host-answer", |term, _ctx| {
          crate::core::forms::set_result(term, Value::Int(42))
        })
        .unwrap();
    assert_eq!(eval_one(&mut interpreter, "(host-answer)").value, Value::Int(42));
  }
}
