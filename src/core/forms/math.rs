/*!

Arithmetic over the two numeric leaves, exact `i64` and inexact `f64`.

This is deliberately not a numeric tower: exactness is contagious only
downwards (an inexact operand makes the result inexact), quotients fall
back to inexact when they do not divide, and division by an exact zero is
an error.

*/

use std::cmp::Ordering;

use crate::core::{
  context::{Context, Reduction},
  environment::RcEnv,
  error::UnilangError,
  eval::operand_handles,
  term::RcTerm,
  value::Value,
};

use super::{resolved_value, retain_n, set_result};

#[derive(Copy, Clone, PartialEq, Debug)]
enum Number {
  Exact(i64),
  Inexact(f64),
}

impl Number {
  fn value(self) -> Value {
    match self {
      Number::Exact(n) => Value::Int(n),
      Number::Inexact(x) => Value::Double(x),
    }
  }

  fn as_f64(self) -> f64 {
    match self {
      Number::Exact(n) => n as f64,
      Number::Inexact(x) => x,
    }
  }

  fn compare(self, other: Number) -> Option<Ordering> {
    match (self, other) {
      (Number::Exact(a), Number::Exact(b)) => Some(a.cmp(&b)),
      (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    }
  }
}

fn number(t: &RcTerm) -> Result<Number, UnilangError> {
  match resolved_value(t) {
    Value::Int(n) => Ok(Number::Exact(n)),
    Value::Double(x) => Ok(Number::Inexact(x)),
    other => Err(UnilangError::type_error(format!(
      "number expected, found a value of kind {:?}",
      other.kind()
    ))),
  }
}

fn add(a: Number, b: Number) -> Number {
  match (a, b) {
    (Number::Exact(x), Number::Exact(y)) => Number::Exact(x.wrapping_add(y)),
    (x, y) => Number::Inexact(x.as_f64() + y.as_f64()),
  }
}

fn sub(a: Number, b: Number) -> Number {
  match (a, b) {
    (Number::Exact(x), Number::Exact(y)) => Number::Exact(x.wrapping_sub(y)),
    (x, y) => Number::Inexact(x.as_f64() - y.as_f64()),
  }
}

fn mul(a: Number, b: Number) -> Number {
  match (a, b) {
    (Number::Exact(x), Number::Exact(y)) => Number::Exact(x.wrapping_mul(y)),
    (x, y) => Number::Inexact(x.as_f64() * y.as_f64()),
  }
}

fn div(a: Number, b: Number) -> Result<Number, UnilangError> {
  match (a, b) {
    (_, Number::Exact(0)) => Err(UnilangError::type_error("division by zero")),
    (Number::Exact(x), Number::Exact(y)) if x % y == 0 => Ok(Number::Exact(x / y)),
    (x, y) => Ok(Number::Inexact(x.as_f64() / y.as_f64())),
  }
}

pub(super) fn install(env: &RcEnv) -> Result<(), UnilangError> {
  super::register_strict(env, "+", |t, c| fold(t, c, Number::Exact(0), add))?;
  super::register_strict(env, "*", |t, c| fold(t, c, Number::Exact(1), mul))?;
  super::register_strict(env, "-", strict_minus)?;
  super::register_strict(env, "/", strict_divide)?;
  super::register_strict(env, "<?", |t, c| compare(t, c, Ordering::is_lt))?;
  super::register_strict(env, "<=?", |t, c| compare(t, c, Ordering::is_le))?;
  super::register_strict(env, ">?", |t, c| compare(t, c, Ordering::is_gt))?;
  super::register_strict(env, ">=?", |t, c| compare(t, c, Ordering::is_ge))?;
  super::register_strict(env, "=?", |t, c| compare(t, c, Ordering::is_eq))?;
  super::register_strict(env, "zero?", |t, c| test(t, c, |n| n.as_f64() == 0.0))?;
  super::register_strict(env, "positive?", |t, c| test(t, c, |n| n.as_f64() > 0.0))?;
  super::register_strict(env, "negative?", |t, c| test(t, c, |n| n.as_f64() < 0.0))?;
  super::register_strict(env, "add1", |t, c| unary(t, c, |n| add(n, Number::Exact(1))))?;
  super::register_strict(env, "sub1", |t, c| unary(t, c, |n| sub(n, Number::Exact(1))))?;
  super::register_strict(env, "abs", |t, c| {
    unary(t, c, |n| match n {
      Number::Exact(v) => Number::Exact(v.wrapping_abs()),
      Number::Inexact(x) => Number::Inexact(x.abs()),
    })
  })?;
  super::register_strict(env, "max", |t, c| pick(t, c, Ordering::is_ge))?;
  super::register_strict(env, "min", |t, c| pick(t, c, Ordering::is_le))?;
  super::register_strict(env, "div", |t, c| integer_binary(t, c, |a, b| a / b))?;
  super::register_strict(env, "mod", |t, c| integer_binary(t, c, |a, b| a % b))?;
  super::register_strict(env, "number?", |t, _| {
    let operands = retain_n(t, 1)?;
    let is_number = matches!(
      resolved_value(&operands[0]),
      Value::Int(_) | Value::Double(_)
    );
    set_result(t, Value::Bool(is_number))
  })?;
  super::register_strict(env, "integer?", |t, _| {
    let operands = retain_n(t, 1)?;
    let is_integer = match resolved_value(&operands[0]) {
      Value::Int(_) => true,
      Value::Double(x) => x.is_finite() && x.trunc() == x,
      _ => false,
    };
    set_result(t, Value::Bool(is_integer))
  })?;
  super::register_strict(env, "number->string", |t, _| {
    let operands = retain_n(t, 1)?;
    let n = number(&operands[0])?;
    set_result(t, Value::String(format!("{}", n.value())))
  })?;
  super::register_strict(env, "string->number", |t, _| {
    let operands = retain_n(t, 1)?;
    let s = super::resolved_string(&operands[0])?;
    let parsed = s
        .parse::<i64>()
        .map(Value::Int)
        .or_else(|_| s.parse::<f64>().map(Value::Double))
        .map_err(|_| UnilangError::type_error(format!("not a number: '{}'", s)))?;
    set_result(t, parsed)
  })?;
  Ok(())
}

fn fold(
  term: &RcTerm,
  _ctx: &mut Context,
  unit: Number,
  op: impl Fn(Number, Number) -> Number,
) -> Reduction {
  let mut accumulator = unit;
  for operand in operand_handles(term) {
    accumulator = op(accumulator, number(&operand)?);
  }
  set_result(term, accumulator.value())
}

fn strict_minus(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = super::retain_at_least(term, 1)?;
  let mut accumulator = number(&operands[0])?;
  if operands.len() == 1 {
    return set_result(term, sub(Number::Exact(0), accumulator).value());
  }
  for operand in &operands[1..] {
    accumulator = sub(accumulator, number(operand)?);
  }
  set_result(term, accumulator.value())
}

fn strict_divide(term: &RcTerm, _ctx: &mut Context) -> Reduction {
  let operands = super::retain_at_least(term, 2)?;
  let mut accumulator = number(&operands[0])?;
  for operand in &operands[1..] {
    accumulator = div(accumulator, number(operand)?)?;
  }
  set_result(term, accumulator.value())
}

fn compare(
  term: &RcTerm,
  _ctx: &mut Context,
  f: impl Fn(Ordering) -> bool,
) -> Reduction {
  let operands = retain_n(term, 2)?;
  let a = number(&operands[0])?;
  let b = number(&operands[1])?;
  let ordering = a
      .compare(b)
      .ok_or_else(|| UnilangError::type_error("numbers are unordered"))?;
  set_result(term, Value::Bool(f(ordering)))
}

fn test(term: &RcTerm, _ctx: &mut Context, f: impl Fn(Number) -> bool) -> Reduction {
  let operands = retain_n(term, 1)?;
  let n = number(&operands[0])?;
  set_result(term, Value::Bool(f(n)))
}

fn unary(term: &RcTerm, _ctx: &mut Context, f: impl Fn(Number) -> Number) -> Reduction {
  let operands = retain_n(term, 1)?;
  let n = number(&operands[0])?;
  set_result(term, f(n).value())
}

fn pick(term: &RcTerm, _ctx: &mut Context, keep: impl Fn(Ordering) -> bool) -> Reduction {
  let operands = retain_n(term, 2)?;
  let a = number(&operands[0])?;
  let b = number(&operands[1])?;
  let ordering = a
      .compare(b)
      .ok_or_else(|| UnilangError::type_error("numbers are unordered"))?;
  set_result(term, if keep(ordering) { a.value() } else { b.value() })
}

fn integer_binary(
  term: &RcTerm,
  _ctx: &mut Context,
  f: impl Fn(i64, i64) -> i64,
) -> Reduction {
  let operands = retain_n(term, 2)?;
  let a = match resolved_value(&operands[0]) {
    Value::Int(n) => n,
    _ => return Err(UnilangError::type_error("exact integer expected")),
  };
  let b = match resolved_value(&operands[1]) {
    Value::Int(n) => n,
    _ => return Err(UnilangError::type_error("exact integer expected")),
  };
  if b == 0 {
    return Err(UnilangError::type_error("division by zero"));
  }
  set_result(term, Value::Int(f(a, b)))
}
