/*!

String builtins and the string/symbol bridges, including `desigil`, which
strips the reference/forwarding sigil off a symbol for the derived code
that manufactures binding forms.

*/

use crate::{
  abstractions::IString,
  core::{
    context::{Context, Reduction},
    environment::RcEnv,
    error::UnilangError,
    eval::operand_handles,
    term::RcTerm,
    value::Value,
  },
};

use super::{resolved_string, resolved_symbol, resolved_value, retain_n, set_result};

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_strict(env, "string?", |t, _| {
    let operands = retain_n(t, 1)?;
    let is_string = matches!(resolved_value(&operands[0]), Value::String(_));
    set_result(t, Value::Bool(is_string))
  })?;
  super::register_strict(env, "string-empty?", |t, _| {
    let operands = retain_n(t, 1)?;
    let s = resolved_string(&operands[0])?;
    set_result(t, Value::Bool(s.is_empty()))
  })?;
  super::register_strict(env, "++", strict_concat)?;
  super::register_strict(env, "string=?", |t, _| {
    let operands = retain_n(t, 2)?;
    let a = resolved_string(&operands[0])?;
    let b = resolved_string(&operands[1])?;
    set_result(t, Value::Bool(a == b))
  })?;
  super::register_strict(env, "string-contains?", |t, _| {
    let operands = retain_n(t, 2)?;
    let a = resolved_string(&operands[0])?;
    let b = resolved_string(&operands[1])?;
    set_result(t, Value::Bool(a.contains(&b)))
  })?;
  super::register_strict(env, "string->symbol", |t, _| {
    let operands = retain_n(t, 1)?;
    let s = resolved_string(&operands[0])?;
    set_result(t, Value::Symbol(IString::from(s.as_str())))
  })?;
  super::register_strict(env, "symbol->string", |t, _| {
    let operands = retain_n(t, 1)?;
    let s = resolved_symbol(&operands[0])?;
    set_result(t, Value::String(s.to_string()))
  })?;
  super::register_strict(env, "desigil", |t, _| {
    let operands = retain_n(t, 1)?;
    let s = resolved_symbol(&operands[0])?;
    let stripped = match s.strip_prefix(['&', '%']) {
      Some(rest) => IString::from(rest),
      None => s.clone(),
    };
    set_result(t, Value::Symbol(stripped))
  })?;
  Ok(())
}

fn strict_concat(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let mut out = String::new();
  for operand in operand_handles(term) {
    out.push_str(&resolved_string(&operand)?);
  }
  set_result(term, Value::String(out))
}
