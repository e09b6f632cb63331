/*!

Basic output and source loading. `display` writes strings raw, `write`
quotes them; `load` reads a file, splices its units into the combining term
and tail-evaluates them in the current environment.

*/

use std::io::Write;

use crate::core::{
  context::{Context, Reducer, Reduction, ReductionStatus},
  environment::RcEnv,
  error::UnilangError,
  eval::eval_reducer,
  reference::ultimate_referent,
  term::RcTerm,
  value::Value,
};

use super::{resolved_string, retain_n, set_result, tail_eval};

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_strict(env, "display", |t, c| output(t, c, false))?;
  super::register_strict(env, "write", |t, c| output(t, c, true))?;
  super::register_strict(env, "newline", |t, _| {
    retain_n(t, 0)?;
    println!();
    set_result(t, Value::Inert)
  })?;
  super::register_strict(env, "puts", |t, _| {
    let operands = retain_n(t, 1)?;
    println!("{}", resolved_string(&operands[0])?);
    set_result(t, Value::Inert)
  })?;
  super::register_strict(env, "load", strict_load)?;
  Ok(())
}

fn output(term: &RcTerm, _ctx: &mut Context, quoted: bool) -> Reduction {
  let operands = retain_n(term, 1)?;
  let target = ultimate_referent(&operands[0]);
  let rendered = {
    let t = target.borrow();
    match (&t.value, quoted) {
      (Value::String(s), false) if t.is_leaf() => s.clone(),
      _ => format!("{}", t),
    }
  };
  print!("{}", rendered);
  let _ = std::io::stdout().flush();
  set_result(term, Value::Inert)
}

/// `(load path)`: the file's units are evaluated in order in the current
/// environment; the last one is in tail position.
fn strict_load(term: &RcTerm, ctx: &mut Context) -> Reduction {
  let operands = retain_n(term, 1)?;
  let path = resolved_string(&operands[0])?;
  let source = std::fs::read_to_string(&path)
      .map_err(|e| UnilangError::type_error(format!("cannot load '{}': {}", path, e)))?;
  let units = crate::reader::parse_all(&source)
      .map_err(|e| e.with_context(format!("while loading '{}'", path)))?;

  ctx.current_source = path;
  if units.is_empty() {
    return set_result(term, Value::Inert);
  }
  let env = ctx.record.clone();
  let mut units: Vec<RcTerm> = units
      .into_iter()
      .map(crate::abstractions::rc_cell)
      .collect();
  let last = units.pop().unwrap_or_else(|| term.clone());
  let t = term.clone();
  let e = env.clone();
  ctx.setup_front(Reducer::step(move |ctx| {
    ctx.record = e.clone();
    let content = last.borrow_mut().take();
    t.borrow_mut().set_content(content);
    tail_eval(ctx, &t, e.clone(), false);
    Ok(ReductionStatus::Neutral)
  }));
  for unit in units.into_iter().rev() {
    ctx.setup_front(eval_reducer(unit, env.clone()));
  }
  Ok(ReductionStatus::Neutral)
}
