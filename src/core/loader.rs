/*!

The derived forms loader.

After the primitives are installed, this fixed body of Unilang source is
evaluated in the ground environment through the ordinary evaluator; nothing
here has privileged access. Order matters: each derivation uses only
primitives and derivations above it. The interpreter freezes the ground
environment once loading finishes.

*/

use tracing::debug;

use crate::{
  abstractions::rc_cell,
  core::{context::Context, error::UnilangError},
  reader,
};

pub static DERIVED_FORMS_SOURCE: &str = r#"
; Environment access and the identity ladder.
($def! lock-current-environment (wrap ($vau () d (lock-environment d))))
($def! $quote ($vau% (x) #ignore ($move-resolved! x)))
($def! id (wrap ($vau% (%x) #ignore ($move-resolved! x))))
($def! idv (wrap $quote))

; Value category helpers.
($def! $lvalue-identifier?
  ($vau (&s) d (eval (list bound-lvalue? (list $resolve-identifier s)) d)))
($def! forward!
  (wrap ($vau% (%x) #ignore ($if ($lvalue-identifier? x) x (move! x)))))

; Application of an applicative to an operand list.
($def! apply
  (wrap ($vau% (&appv &arg .&opt) #ignore
    (eval% (cons% (unwrap (forward! appv)) (forward! arg))
      ($if (null? opt) (make-environment) (first& opt))))))

; List construction with a spliced tail.
($def! list*%
  (wrap ($vau% (&head .&tail) #ignore
    ($if (null? tail) (forward! head)
      (cons% (forward! head) (apply list*% (forward! tail)))))))
($def! list*
  (wrap ($vau (&head .&tail) #ignore
    ($if (null? tail) head (cons head (apply list* tail))))))

; Definition sugar.
($def! $defv! ($vau (&$f &formals &ef .&body) d
  (eval (list*% $def! $f $vau (forward! formals) ef (forward! body)) d)))
($defv! $defv%! (&$f &formals &ef .&body) d
  (eval (list*% $def! $f $vau% (forward! formals) ef (forward! body)) d))
($def! $lambda ($vau (&formals .&body) d
  (wrap (eval (cons $vau (cons% (forward! formals) (cons% #ignore (forward! body))))
    d))))
($def! $lambda% ($vau (&formals .&body) d
  (wrap (eval (cons $vau% (cons% (forward! formals) (cons% #ignore (forward! body))))
    d))))
($defv! $defl! (&f &formals .&body) d
  (eval (list*% $def! f $lambda (forward! formals) (forward! body)) d))
($defv! $defl%! (&f &formals .&body) d
  (eval (list*% $def! f $lambda% (forward! formals) (forward! body)) d))
($def! $define! $def!)

($defl! not? (&x) (eqv? x #f))

; Mapping and folds.
($defl%! map1 (&appv &l)
  ($if (null? l) ()
    (cons% (appv (first& l)) (map1 appv (rest& l)))))
($defl%! accl (&l &pred? &base &head &tail &sum)
  ($if (pred? l) (forward! base)
    (accl (tail l) pred? (sum (head l) (forward! base)) head tail sum)))
($defl%! accr (&l &pred? &base &head &tail &sum)
  ($if (pred? l) (forward! base)
    (sum (head l) (accr (tail l) pred? (forward! base) head tail sum))))
($defl%! foldr1 (&kons &knil &l) (accr l null? (forward! knil) first& rest& kons))
($defl! list-concat (&x &y) (foldr1 cons% (forward! y) (forward! x)))
($defl! append (.&ls) (foldr1 list-concat () (move! ls)))

; Binding forms.
($defv%! $let (&bindings .&body) d
  (eval% (cons%
    (list*% $lambda (map1 first& bindings) (forward! body))
    (map1 ($lambda% (&b) (first& (rest& b))) bindings)) d))
($defv%! $let% (&bindings .&body) d
  (eval% (cons%
    (list*% $lambda% (map1 first& bindings) (forward! body))
    (map1 ($lambda% (&b) (first& (rest& b))) bindings)) d))
($defv%! $let* (&bindings .&body) d
  ($if (null? bindings)
    (eval% (list% (list*% $lambda () (forward! body))) d)
    (eval% (list% $let (list% (first& bindings))
      (list*% $let* (rest& bindings) (forward! body))) d)))
($defv%! $letrec (&bindings .&body) d
  (eval% (list% $let () (cons% $sequence (cons%
    (list% $def! (map1 first& bindings)
      (cons% list (map1 ($lambda% (&b) (first& (rest& b))) bindings)))
    (forward! body)))) d))

; Conditionals over the boolean lattice.
($defv%! $cond &clauses d
  ($if (null? clauses) #inert
    ($if (eval (first& (first& clauses)) d)
      (eval% (cons% $sequence (rest& (first& clauses))) d)
      (eval% (cons% $cond (rest& clauses)) d))))
($defv%! $when (&test .&body) d
  ($if (eval test d) (eval% (cons% $sequence (forward! body)) d) #inert))
($defv%! $unless (&test .&body) d
  ($if (eval test d) #inert (eval% (cons% $sequence (forward! body)) d)))
($defv%! $and &x d
  ($if (null? x) #t
    ($if (null? (rest& x)) (eval% (first& x) d)
      ($if (eval (first& x) d) (eval% (cons% $and (rest& x)) d) #f))))
($defv%! $or &x d
  ($if (null? x) #f
    ($if (null? (rest& x)) (eval% (first& x) d)
      ($if (eval (first& x) d) #t (eval% (cons% $or (rest& x)) d)))))

; Standard environments and module plumbing.
($defl! make-standard-environment () (lock-current-environment))
($defv! $as-environment (.&body) d
  (eval (list% $let () (cons% $sequence
    (list-concat (forward! body) (list% (list% lock-current-environment))))) d))
($defv! $import! (&e .&symbols) d
  (eval% (list% $set! d symbols (cons% list% symbols)) (eval e d)))
($defv! $provide! (&symbols .&body) d
  (eval% (list*% $import! (list*% $as-environment (forward! body)) symbols) d))
"#;

/// Evaluates the standard derivations in the context's current environment.
pub fn load_derived_forms(ctx: &mut Context) -> Result<(), UnilangError> {
  debug!("loading the standard derivations");
  let units = reader::parse_all(DERIVED_FORMS_SOURCE)?;
  for unit in units {
    let term = rc_cell(unit);
    ctx
        .evaluate(&term)
        .map_err(|e| e.with_context("while loading the standard derivations"))?;
  }
  Ok(())
}
