/*!

The error taxonomy of the evaluator.

Every failure surfaced through the trampoline is a `UnilangError`: a kind
from the fixed taxonomy, a message, and an optional cause forming a
cause → caller chain. Reducers abort on error; `Context::rewrite` unwinds
the remaining stack and hands the error to its caller.

*/

use std::{
  error::Error,
  fmt::{Debug, Display, Formatter},
};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ErrorKind {
  /// Unresolved name, or a cyclic parent specification.
  BadIdentifier,
  /// Malformed parameter tree or special form.
  InvalidSyntax,
  /// A list/pair was expected where a leaf appeared, or vice versa.
  ListTypeError,
  /// Value box mismatch, or a combiner was expected.
  TypeError,
  /// Operand count does not match the parameter tree.
  ArityError,
  /// Assignment through a non-modifiable reference, or to a non-lvalue.
  ValueCategoryError,
  /// Second invocation of a one-shot continuation.
  BadContinuation,
  /// Mutation of a frozen environment.
  NonmodifiableEnvironment,
  /// The cancellation flag was observed.
  Cancelled,
  /// Destructuring arity mismatch while binding.
  ParameterMismatch,
}

impl Display for ErrorKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Debug::fmt(self, f)
  }
}

pub struct UnilangError {
  pub kind   : ErrorKind,
  pub message: String,
  pub cause  : Option<Box<UnilangError>>,
}

impl UnilangError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> UnilangError {
    UnilangError {
      kind,
      message: message.into(),
      cause  : None,
    }
  }

  /// Wraps the error in a caller frame, preserving the cause chain.
  pub fn with_context(self, message: impl Into<String>) -> UnilangError {
    UnilangError {
      kind   : self.kind,
      message: message.into(),
      cause  : Some(Box::new(self)),
    }
  }

  // region Convenience constructors

  pub fn bad_identifier(name: &str) -> UnilangError {
    UnilangError::new(ErrorKind::BadIdentifier, format!("unresolved identifier '{}'", name))
  }

  pub fn invalid_syntax(message: impl Into<String>) -> UnilangError {
    UnilangError::new(ErrorKind::InvalidSyntax, message)
  }

  pub fn list_type(message: impl Into<String>) -> UnilangError {
    UnilangError::new(ErrorKind::ListTypeError, message)
  }

  pub fn type_error(message: impl Into<String>) -> UnilangError {
    UnilangError::new(ErrorKind::TypeError, message)
  }

  pub fn arity(expected: usize, found: usize) -> UnilangError {
    UnilangError::new(
      ErrorKind::ArityError,
      format!("expected {} operand(s), found {}", expected, found),
    )
  }

  pub fn value_category(message: impl Into<String>) -> UnilangError {
    UnilangError::new(ErrorKind::ValueCategoryError, message)
  }

  pub fn bad_continuation() -> UnilangError {
    UnilangError::new(ErrorKind::BadContinuation, "one-shot continuation invoked twice")
  }

  pub fn nonmodifiable_environment() -> UnilangError {
    UnilangError::new(ErrorKind::NonmodifiableEnvironment, "mutation of a frozen environment")
  }

  pub fn cancelled() -> UnilangError {
    UnilangError::new(ErrorKind::Cancelled, "evaluation cancelled")
  }

  pub fn parameter_mismatch(message: impl Into<String>) -> UnilangError {
    UnilangError::new(ErrorKind::ParameterMismatch, message)
  }

  // endregion
}

impl Display for UnilangError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.kind, self.message)
  }
}

impl Debug for UnilangError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)?;
    let mut cause = self.cause.as_deref();
    while let Some(inner) = cause {
      write!(f, "\n  caused by: {}", inner)?;
      cause = inner.cause.as_deref();
    }
    Ok(())
  }
}

impl Error for UnilangError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
  }
}
