/*!

The reader: source text to term trees.

This is the collaborator the core consumes terms from; nothing in the
evaluator depends on it beyond the `Interpreter` entry points and the
derived-forms loader. The surface is s-expressions with `#t`, `#f`,
`#inert`, `#ignore`, symbols, quoted strings, and numeric literals;
comments run from `;` to the end of the line.

*/

use crate::{
  abstractions::IString,
  core::{
    error::UnilangError,
    term::Term,
    value::Value,
  },
};

#[derive(Debug, PartialEq)]
enum Token {
  Open,
  Close,
  Literal(String),
  Atom(String),
}

fn tokenize(source: &str) -> Result<Vec<Token>, UnilangError> {
  let mut tokens = Vec::new();
  let mut chars = source.chars().peekable();

  while let Some(&c) = chars.peek() {
    match c {
      ';' => {
        for c in chars.by_ref() {
          if c == '\n' {
            break;
          }
        }
      }
      '(' => {
        chars.next();
        tokens.push(Token::Open);
      }
      ')' => {
        chars.next();
        tokens.push(Token::Close);
      }
      '"' => {
        chars.next();
        let mut literal = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
          match c {
            '"' => {
              closed = true;
              break;
            }
            '\\' => match chars.next() {
              Some('n') => literal.push('\n'),
              Some('t') => literal.push('\t'),
              Some('r') => literal.push('\r'),
              Some('\\') => literal.push('\\'),
              Some('"') => literal.push('"'),
              Some(other) => {
                return Err(UnilangError::invalid_syntax(format!(
                  "unknown escape '\\{}'",
                  other
                )))
              }
              None => break,
            },
            other => literal.push(other),
          }
        }
        if !closed {
          return Err(UnilangError::invalid_syntax("unterminated string literal"));
        }
        tokens.push(Token::Literal(literal));
      }
      c if c.is_whitespace() => {
        chars.next();
      }
      _ => {
        let mut atom = String::new();
        while let Some(&c) = chars.peek() {
          if c.is_whitespace() || matches!(c, '(' | ')' | ';' | '"') {
            break;
          }
          atom.push(c);
          chars.next();
        }
        tokens.push(Token::Atom(atom));
      }
    }
  }
  Ok(tokens)
}

fn atom_term(atom: &str) -> Term {
  match atom {
    "#t" => return Term::with_value(Value::Bool(true)),
    "#f" => return Term::with_value(Value::Bool(false)),
    "#inert" => return Term::with_value(Value::Inert),
    "#ignore" => return Term::with_value(Value::Ignore),
    _ => {}
  }
  if let Ok(n) = atom.parse::<i64>() {
    return Term::with_value(Value::Int(n));
  }
  if looks_numeric(atom) {
    if let Ok(x) = atom.parse::<f64>() {
      return Term::with_value(Value::Double(x));
    }
  }
  Term::with_value(Value::Symbol(IString::from(atom)))
}

/// Guard against symbols like `-` or `...` parsing as numbers.
fn looks_numeric(atom: &str) -> bool {
  let rest = atom.strip_prefix(['+', '-']).unwrap_or(atom);
  rest.chars().next().map_or(false, |c| c.is_ascii_digit())
}

/// Parses every top-level unit in `source`.
pub fn parse_all(source: &str) -> Result<Vec<Term>, UnilangError> {
  let tokens = tokenize(source)?;
  let mut units = Vec::new();
  let mut stack: Vec<Term> = Vec::new();

  for token in tokens {
    match token {
      Token::Open => stack.push(Term::new()),
      Token::Close => {
        let finished = stack
            .pop()
            .ok_or_else(|| UnilangError::invalid_syntax("unbalanced ')'"))?;
        match stack.last_mut() {
          Some(parent) => parent.add_child(finished),
          None => units.push(finished),
        }
      }
      Token::Literal(s) => {
        let leaf = Term::with_value(Value::String(s));
        match stack.last_mut() {
          Some(parent) => parent.add_child(leaf),
          None => units.push(leaf),
        }
      }
      Token::Atom(atom) => {
        let leaf = atom_term(&atom);
        match stack.last_mut() {
          Some(parent) => parent.add_child(leaf),
          None => units.push(leaf),
        }
      }
    }
  }
  if !stack.is_empty() {
    return Err(UnilangError::invalid_syntax("unbalanced '('"));
  }
  Ok(units)
}

/// Parses exactly one unit.
pub fn parse_one(source: &str) -> Result<Term, UnilangError> {
  let mut units = parse_all(source)?;
  match units.len() {
    1 => Ok(units.remove(0)),
    n => Err(UnilangError::invalid_syntax(format!(
      "expected one unit, found {}",
      n
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::error::ErrorKind;

  #[test]
  fn atoms_classify() {
    assert_eq!(parse_one("42").unwrap().value, Value::Int(42));
    assert_eq!(parse_one("-7").unwrap().value, Value::Int(-7));
    assert_eq!(parse_one("1.5").unwrap().value, Value::Double(1.5));
    assert_eq!(parse_one("#t").unwrap().value, Value::Bool(true));
    assert_eq!(parse_one("#inert").unwrap().value, Value::Inert);
    assert_eq!(parse_one("#ignore").unwrap().value, Value::Ignore);
    assert_eq!(
      parse_one("-").unwrap().value,
      Value::Symbol(IString::from("-"))
    );
    assert_eq!(
      parse_one(".&body").unwrap().value,
      Value::Symbol(IString::from(".&body"))
    );
    assert_eq!(
      parse_one("\"a\\nb\"").unwrap().value,
      Value::String("a\nb".to_string())
    );
  }

  #[test]
  fn lists_nest() {
    let t = parse_one("($if (<=? n 1) n (f (- n 1)))").unwrap();
    assert_eq!(t.count_prefix(), 4);
    assert_eq!(
      t.children()[0].borrow().value,
      Value::Symbol(IString::from("$if"))
    );
    let test = t.children()[1].borrow();
    assert_eq!(test.count_prefix(), 3);
  }

  #[test]
  fn comments_and_units() {
    let units = parse_all("1 ; one\n2 (3 4) ; trailing\n").unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[2].count_prefix(), 2);
  }

  #[test]
  fn unbalanced_input_is_invalid_syntax() {
    assert_eq!(
      parse_all("(1 2").unwrap_err().kind,
      ErrorKind::InvalidSyntax
    );
    assert_eq!(parse_all(")").unwrap_err().kind, ErrorKind::InvalidSyntax);
    assert_eq!(
      parse_all("\"oops").unwrap_err().kind,
      ErrorKind::InvalidSyntax
    );
  }

  #[test]
  fn empty_list_parses_as_leaf() {
    let t = parse_one("()").unwrap();
    assert!(t.is_empty_list());
  }
}
