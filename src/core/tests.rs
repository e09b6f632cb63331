/*!

End-to-end scenarios driving a fully booted interpreter through source
text: literal programs and their observable results.

*/

use rand::Rng;

use crate::{
  api::Interpreter,
  core::{error::ErrorKind, term::Term, value::Value},
  reader,
};

fn interpreter() -> Interpreter {
  Interpreter::new().expect("boot failed")
}

/// Evaluates every unit and returns the last result.
fn eval_all(interpreter: &mut Interpreter, source: &str) -> Result<Term, crate::UnilangError> {
  let units = reader::parse_all(source)?;
  let mut last = Term::with_value(Value::Inert);
  for unit in units {
    last = interpreter.evaluate(unit)?;
  }
  Ok(last)
}

fn eval_display(interpreter: &mut Interpreter, source: &str) -> String {
  format!("{}", eval_all(interpreter, source).unwrap())
}

#[test]
fn wrapped_vau_applies_evaluated_operands() {
  let mut i = interpreter();
  let result = eval_all(&mut i, "((wrap ($vau (x) e x)) 42)").unwrap();
  assert_eq!(result.value, Value::Int(42));
}

#[test]
fn let_binds_and_adds() {
  let mut i = interpreter();
  let result = eval_all(&mut i, "($let ((x 1) (y 2)) (+ x y))").unwrap();
  assert_eq!(result.value, Value::Int(3));
}

#[test]
fn deep_tail_recursion_does_not_grow_the_stack() {
  let mut i = interpreter();
  let program = "($define! f ($lambda (n) ($if (<=? n 1) n (f (- n 1))))) (f 100000)";
  let result = eval_all(&mut i, program).unwrap();
  assert_eq!(result.value, Value::Int(1));
}

#[test]
fn trampoline_depth_is_independent_of_recursion_depth() {
  let depth_after = |n: usize| {
    let mut i = interpreter();
    let program = format!(
      "($define! f ($lambda (n) ($if (<=? n 1) n (f (- n 1))))) (f {})",
      n
    );
    eval_all(&mut i, &program).unwrap();
    i.context_mut().max_stack_depth()
  };
  assert_eq!(depth_after(50), depth_after(5000));
}

#[test]
fn pairs_are_mutable_through_references() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! p (cons 1 2)) (set-first! p 9) (first& p)",
  )
  .unwrap();
  assert_eq!(result.value, Value::Int(9));
}

#[test]
fn one_shot_continuations_resume_once() {
  let mut i = interpreter();
  eval_all(&mut i, "($define! k ())").unwrap();
  let first = eval_all(
    &mut i,
    "(+ 1 (call/1cc ($lambda (c) ($sequence ($set! (get-current-environment) k c) 10))))",
  )
  .unwrap();
  assert_eq!(first.value, Value::Int(11));

  let resumed = eval_all(&mut i, "(k 5)").unwrap();
  assert_eq!(resumed.value, Value::Int(6));

  let err = eval_all(&mut i, "(k 7)").unwrap_err();
  assert_eq!(err.kind, ErrorKind::BadContinuation);
}

#[test]
fn frozen_environments_reject_set() {
  let mut i = interpreter();
  let err = eval_all(
    &mut i,
    "($define! e (make-environment)) (freeze e) ($set! e x 1)",
  )
  .unwrap_err();
  assert_eq!(err.kind, ErrorKind::NonmodifiableEnvironment);
}

#[test]
fn set_assigns_reachable_bindings_in_their_owner() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! x 1)
     ($define! bump ($lambda () ($set! (get-current-environment) x 2)))
     (bump)
     x",
  )
  .unwrap();
  assert_eq!(result.value, Value::Int(2));
}

#[test]
fn derived_conditionals() {
  let mut i = interpreter();
  assert_eq!(
    eval_all(&mut i, "($cond ((<? 2 1) 10) ((<? 1 2) 20))").unwrap().value,
    Value::Int(20)
  );
  assert_eq!(
    eval_all(&mut i, "($when (<? 1 2) 1 2 3)").unwrap().value,
    Value::Int(3)
  );
  assert_eq!(
    eval_all(&mut i, "($unless (<? 1 2) 9)").unwrap().value,
    Value::Inert
  );
  assert_eq!(
    eval_all(&mut i, "($and #t (<? 1 2))").unwrap().value,
    Value::Bool(true)
  );
  assert_eq!(
    eval_all(&mut i, "($or #f (<? 2 1))").unwrap().value,
    Value::Bool(false)
  );
  assert_eq!(eval_all(&mut i, "(not? #f)").unwrap().value, Value::Bool(true));
}

#[test]
fn derived_list_machinery() {
  let mut i = interpreter();
  assert_eq!(
    eval_display(&mut i, "(map1 ($lambda (x) (* x x)) (list 1 2 3))"),
    "(1 4 9)"
  );
  assert_eq!(
    eval_display(&mut i, "(append (list 1 2) (list 3) (list 4))"),
    "(1 2 3 4)"
  );
  assert_eq!(eval_display(&mut i, "(list* 1 2 (list 3 4))"), "(1 2 3 4)");
  assert_eq!(
    eval_all(&mut i, "(foldr1 + 0 (list 1 2 3 4))").unwrap().value,
    Value::Int(10)
  );
  assert_eq!(
    eval_all(&mut i, "(accl (list 1 2 3) null? 0 first& rest& +)")
        .unwrap()
        .value,
    Value::Int(6)
  );
}

#[test]
fn apply_uses_a_fresh_environment_by_default() {
  let mut i = interpreter();
  assert_eq!(
    eval_all(&mut i, "(apply + (list 1 2 3))").unwrap().value,
    Value::Int(6)
  );
}

#[test]
fn letrec_supports_mutual_recursion() {
  let mut i = interpreter();
  let program = "($letrec ((even? ($lambda (n) ($if (=? n 0) #t (odd? (- n 1))))) \
                           (odd? ($lambda (n) ($if (=? n 0) #f (even? (- n 1)))))) \
                   (even? 10))";
  assert_eq!(eval_all(&mut i, program).unwrap().value, Value::Bool(true));
}

#[test]
fn let_star_sees_earlier_bindings() {
  let mut i = interpreter();
  let result = eval_all(&mut i, "($let* ((x 1) (y (+ x 1))) (* x y))").unwrap();
  assert_eq!(result.value, Value::Int(2));
}

#[test]
fn provide_exports_into_the_caller() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($provide! (inc) ($def! inc ($lambda (x) (+ x 1)))) (inc 41)",
  )
  .unwrap();
  assert_eq!(result.value, Value::Int(42));
}

#[test]
fn import_copies_bindings_from_an_environment() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! m ($as-environment ($def! a 5) ($def! b 6)))
     ($import! m a b)
     (+ a b)",
  )
  .unwrap();
  assert_eq!(result.value, Value::Int(11));
}

#[test]
fn equality_ladder() {
  let mut i = interpreter();
  assert_eq!(
    eval_all(&mut i, "(equal? (list 1 2) (list 1 2))").unwrap().value,
    Value::Bool(true)
  );
  assert_eq!(
    eval_all(&mut i, "(eq? (list 1 2) (list 1 2))").unwrap().value,
    Value::Bool(false)
  );
  assert_eq!(
    eval_all(&mut i, "($define! l (list 1 2)) (eq? l l)").unwrap().value,
    Value::Bool(true)
  );
  assert_eq!(
    eval_all(&mut i, "(eqv? 2 2)").unwrap().value,
    Value::Bool(true)
  );
}

#[test]
fn value_category_predicates() {
  let mut i = interpreter();
  eval_all(&mut i, "($define! v 5)").unwrap();
  assert_eq!(eval_all(&mut i, "(reference? v)").unwrap().value, Value::Bool(true));
  assert_eq!(eval_all(&mut i, "(reference? 5)").unwrap().value, Value::Bool(false));
  assert_eq!(eval_all(&mut i, "(modifiable? v)").unwrap().value, Value::Bool(true));
  assert_eq!(
    eval_all(&mut i, "(modifiable? (as-const v))").unwrap().value,
    Value::Bool(false)
  );
  assert_eq!(
    eval_all(&mut i, "(bound-lvalue? ($resolve-identifier v))").unwrap().value,
    Value::Bool(true)
  );
  assert_eq!(eval_all(&mut i, "(unique? (expire v))").unwrap().value, Value::Bool(true));
}

#[test]
fn move_consumes_its_operand_binding() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! a (list 1 2)) ($define! b (move! a)) (list (null? a) b)",
  )
  .unwrap();
  assert_eq!(format!("{}", result), "(#t (1 2))");
}

#[test]
fn dotted_pairs_display() {
  let mut i = interpreter();
  assert_eq!(eval_display(&mut i, "(cons 1 2)"), "(1 . 2)");
  assert_eq!(eval_display(&mut i, "(cons 1 (list 2 3))"), "(1 2 3)");
  assert_eq!(eval_display(&mut i, "(restv (cons 1 2))"), "2");
}

#[test]
fn string_bridges() {
  let mut i = interpreter();
  assert_eq!(
    eval_all(&mut i, "(++ \"foo\" \"bar\")").unwrap().value,
    Value::String("foobar".to_string())
  );
  assert_eq!(
    eval_all(&mut i, "(symbol->string (string->symbol \"x\"))").unwrap().value,
    Value::String("x".to_string())
  );
  assert_eq!(eval_display(&mut i, "(desigil ($quote &x))"), "x");
}

#[test]
fn error_taxonomy_surfaces() {
  let mut i = interpreter();
  assert_eq!(
    eval_all(&mut i, "nope").unwrap_err().kind,
    ErrorKind::BadIdentifier
  );
  assert_eq!(eval_all(&mut i, "(1 2)").unwrap_err().kind, ErrorKind::TypeError);
  assert_eq!(
    eval_all(&mut i, "(cons 1)").unwrap_err().kind,
    ErrorKind::ArityError
  );
  assert_eq!(
    eval_all(&mut i, "(first (list))").unwrap_err().kind,
    ErrorKind::ListTypeError
  );
  assert_eq!(
    eval_all(&mut i, "(/ 1 0)").unwrap_err().kind,
    ErrorKind::TypeError
  );
  assert_eq!(
    eval_all(&mut i, "(raise-invalid-syntax-error \"bad\")").unwrap_err().kind,
    ErrorKind::InvalidSyntax
  );
  assert_eq!(
    eval_all(&mut i, "((wrap ($vau (x y) #ignore x)) 1)").unwrap_err().kind,
    ErrorKind::ArityError
  );
}

#[test]
fn cancellation_aborts_evaluation() {
  let mut i = interpreter();
  i.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
  let err = eval_all(&mut i, "(+ 1 2)").unwrap_err();
  assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[test]
fn assignment_through_nonmodifiable_references_is_rejected() {
  let mut i = interpreter();
  let err = eval_all(
    &mut i,
    "($define! p (cons 1 2)) (set-first! (as-const p) 9)",
  )
  .unwrap_err();
  assert_eq!(err.kind, ErrorKind::ValueCategoryError);
}

#[test]
fn vau_receives_unevaluated_operands() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! $first-token ($vau ((x . )) #ignore x)) ($first-token (a b c))",
  );
  // `x` is bound to the raw symbol `a`, never evaluated.
  assert_eq!(format!("{}", result.unwrap()), "a");
}

#[test]
fn eval_respects_the_target_environment() {
  let mut i = interpreter();
  let result = eval_all(
    &mut i,
    "($define! m ($as-environment ($def! secret 99)))
     (eval ($quote secret) m)",
  )
  .unwrap();
  assert_eq!(result.value, Value::Int(99));
}

// Randomized structural round trip in the spirit of a stress test: deep
// `list` towers evaluate to lists of the expected shape.
#[test]
fn randomized_list_towers_evaluate_to_their_shape() {
  fn build(rng: &mut impl Rng, depth: usize, source: &mut String, count: &mut usize) {
    source.push_str("(list");
    let width = rng.gen_range(1..=4);
    for _ in 0..width {
      if depth > 0 && rng.gen_bool(0.4) {
        source.push(' ');
        build(rng, depth - 1, source, count);
      } else {
        source.push_str(&format!(" {}", rng.gen_range(-100..100)));
      }
      *count += 1;
    }
    source.push(')');
  }

  fn node_count(term: &Term) -> usize {
    term
        .children()
        .iter()
        .map(|c| {
          let child = c.borrow();
          1 + if child.is_branch() { node_count(&child) } else { 0 }
        })
        .sum()
  }

  let mut rng = rand::thread_rng();
  for _ in 0..16 {
    let mut source = String::new();
    let mut expected = 0;
    build(&mut rng, 4, &mut source, &mut expected);

    let mut i = interpreter();
    let result = eval_all(&mut i, &source).unwrap();
    assert!(result.is_list());
    assert_eq!(node_count(&result), expected);
  }
}
