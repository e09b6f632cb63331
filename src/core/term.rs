/*!

A `Term` is a node in the evaluated tree: an ordered child sequence, a value
box, and a word of tags describing the value category of whatever the node
currently denotes.

The shape of a node determines how the evaluator treats it:

 - **leaf** (no children): a literal, a symbol, or an opaque value;
 - **list** (empty value box): the children are its elements;
 - **branched term with value**: an internal form such as the dotted-pair
   representation, where the trailing value is the improper tail;
 - a branched term whose first child carries the `Sticky` tag is an atom
   with decoration, not a pair. Sticky children are metadata and are skipped
   by list arithmetic (`count_prefix`).

Children are shared `RcCell` handles so that reference values and
subobject views can keep a subterm alive after its parent moves on.

*/

use std::fmt::{Debug, Display, Formatter};

use enumflags2::{bitflags, BitFlags};

use crate::{
  abstractions::{rc_cell, RcCell},
  core::value::Value,
};

pub type RcTerm    = RcCell<Term>;
pub type MaybeTerm = Option<RcTerm>;

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TermTag {
  /// The binding denotes an about-to-be-consumed value (an xvalue).
  Unique,

  /// The referent is read-only through this handle.
  Nonmodifying,

  /// The underlying storage is a prvalue temporary.
  Temporary,

  /// Structural metadata marker; orthogonal to value category.
  Sticky,
}

pub type TermTags = BitFlags<TermTag, u8>;

// region Tag algebra

/// A handle may be moved from iff it is unique and not read-only.
#[inline(always)]
pub fn is_movable(tags: TermTags) -> bool {
  tags.contains(TermTag::Unique) && !tags.contains(TermTag::Nonmodifying)
}

/// Tags of the term viewed as an lvalue: Temporary does not survive naming.
#[inline(always)]
pub fn l_value_tags(tags: TermTags) -> TermTags {
  tags & !TermTag::Temporary
}

/// Propagation keeps constness but drops uniqueness and temporariness.
#[inline(always)]
pub fn propagate_to(dst: TermTags, src: TermTags) -> TermTags {
  dst | (src & TermTag::Nonmodifying)
}

/// Clears Temporary when a term becomes a stored first-class value.
#[inline(always)]
pub fn ensure_value_tags(tags: TermTags) -> TermTags {
  tags & !TermTag::Temporary
}

// endregion

pub struct Term {
  children : Vec<RcTerm>,
  pub value: Value,
  pub tags : TermTags,
}

impl Term {
  // region Construction

  /// The empty list.
  pub fn new() -> Term {
    Term {
      children: Vec::new(),
      value   : Value::Unit,
      tags    : TermTags::empty(),
    }
  }

  /// A leaf holding the given value.
  pub fn with_value(value: Value) -> Term {
    Term {
      children: Vec::new(),
      value,
      tags    : TermTags::empty(),
    }
  }

  /// A list of the given elements.
  pub fn with_children(children: Vec<RcTerm>) -> Term {
    Term {
      children,
      value: Value::Unit,
      tags : TermTags::empty(),
    }
  }

  /// A branched term with both children and a value.
  pub fn with_content(children: Vec<RcTerm>, value: Value) -> Term {
    Term {
      children,
      value,
      tags: TermTags::empty(),
    }
  }

  // endregion

  // region Accessors and predicates

  #[inline(always)]
  pub fn children(&self) -> &[RcTerm] {
    &self.children
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.children.len()
  }

  #[inline(always)]
  pub fn first(&self) -> Option<&RcTerm> {
    self.children.first()
  }

  #[inline(always)]
  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  #[inline(always)]
  pub fn is_branch(&self) -> bool {
    !self.children.is_empty()
  }

  #[inline(always)]
  pub fn is_list(&self) -> bool {
    matches!(self.value, Value::Unit)
  }

  /// The empty list: a leaf with an empty value box.
  #[inline(always)]
  pub fn is_empty_list(&self) -> bool {
    self.is_leaf() && self.is_list()
  }

  /// A pair is a branched term whose first child is not metadata.
  #[inline(always)]
  pub fn is_pair(&self) -> bool {
    match self.children.first() {
      Some(first) => !first.borrow().tags.contains(TermTag::Sticky),
      None => false,
    }
  }

  /// Number of leading non-sticky children. Children past that are
  /// invisible metadata and take no part in list arithmetic.
  pub fn count_prefix(&self) -> usize {
    self.children
        .iter()
        .take_while(|c| !c.borrow().tags.contains(TermTag::Sticky))
        .count()
  }

  /// The symbol this term names, if it is a token leaf.
  #[inline(always)]
  pub fn symbol(&self) -> Option<&crate::abstractions::IString> {
    if self.is_leaf() {
      self.value.try_symbol()
    } else {
      None
    }
  }

  // endregion

  // region Mutation

  pub fn add_child(&mut self, child: Term) {
    self.children.push(rc_cell(child));
  }

  pub fn add_child_shared(&mut self, child: RcTerm) {
    self.children.push(child);
  }

  /// Removes and returns the first child. The caller must have checked that
  /// the head is structural, not metadata.
  pub fn remove_head(&mut self) -> RcTerm {
    self.assert_branch();
    debug_assert!(
      !self.children[0].borrow().tags.contains(TermTag::Sticky),
      "remove_head on a sticky head"
    );
    self.children.remove(0)
  }

  /// Head removal without the metadata precondition, for the combining
  /// dispatch which deliberately discards sticky and empty-list heads.
  pub(crate) fn remove_head_unchecked(&mut self) -> RcTerm {
    self.assert_branch();
    self.children.remove(0)
  }

  /// Empties the value box and the child sequence of this node only;
  /// shared subterms survive through their other handles.
  pub fn clear(&mut self) {
    self.value = Value::Unit;
    self.children.clear();
  }

  /// Assigns children, value, and tags from `other`.
  pub fn set_content(&mut self, other: Term) {
    self.children = other.children;
    self.value    = other.value;
    self.tags     = other.tags;
  }

  /// Transfers this node's content out, leaving the empty list behind.
  pub fn take(&mut self) -> Term {
    Term {
      children: std::mem::take(&mut self.children),
      value   : std::mem::replace(&mut self.value, Value::Unit),
      tags    : std::mem::replace(&mut self.tags, TermTags::empty()),
    }
  }

  // endregion

  /// Structure-preserving deep copy: fresh cells all the way down, value
  /// boxes cloned (shared values stay shared).
  pub fn deep_copy(&self) -> Term {
    Term {
      children: self
          .children
          .iter()
          .map(|c| rc_cell(c.borrow().deep_copy()))
          .collect(),
      value: self.value.clone(),
      tags : self.tags,
    }
  }

  // region Checked invariants

  #[inline(always)]
  pub fn assert_branch(&self) {
    debug_assert!(self.is_branch(), "branched term expected");
  }

  #[inline(always)]
  pub fn assert_value_tags(&self) {
    debug_assert!(
      !self.tags.contains(TermTag::Temporary),
      "first-class value with a Temporary tag"
    );
  }

  // endregion
}

impl Default for Term {
  fn default() -> Term {
    Term::new()
  }
}

/// Equality is structural: same tags, same value, children pairwise equal.
impl PartialEq for Term {
  fn eq(&self, other: &Term) -> bool {
    self.tags == other.tags
        && self.value == other.value
        && self.children.len() == other.children.len()
        && self
            .children
            .iter()
            .zip(other.children.iter())
            .all(|(a, b)| *a.borrow() == *b.borrow())
  }
}

impl Display for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.is_leaf() {
      return Display::fmt(&self.value, f);
    }
    write!(f, "(")?;
    let prefix = self.count_prefix();
    for (i, child) in self.children.iter().take(prefix).enumerate() {
      if i > 0 {
        write!(f, " ")?;
      }
      Display::fmt(&*child.borrow(), f)?;
    }
    if !self.is_list() {
      write!(f, " . {}", self.value)?;
    }
    write!(f, ")")
  }
}

impl Debug for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn leaf_int(n: i64) -> Term {
    Term::with_value(Value::Int(n))
  }

  #[test]
  fn shape_predicates() {
    let empty = Term::new();
    assert!(empty.is_leaf());
    assert!(empty.is_list());
    assert!(empty.is_empty_list());
    assert!(!empty.is_pair());

    let mut list = Term::new();
    list.add_child(leaf_int(1));
    list.add_child(leaf_int(2));
    assert!(list.is_branch());
    assert!(list.is_list());
    assert!(list.is_pair());
    assert_eq!(list.count_prefix(), 2);

    let pair = Term::with_content(vec![rc_cell(leaf_int(1))], Value::Int(2));
    assert!(pair.is_branch());
    assert!(!pair.is_list());
    assert!(pair.is_pair());
  }

  #[test]
  fn leaf_iff_not_branch() {
    for t in [Term::new(), leaf_int(3), {
      let mut l = Term::new();
      l.add_child(leaf_int(1));
      l
    }] {
      assert_ne!(t.is_leaf(), t.is_branch());
      assert_eq!(t.is_list(), matches!(t.value, Value::Unit));
    }
  }

  #[test]
  fn sticky_children_are_invisible_to_list_arithmetic() {
    let mut t = Term::new();
    t.add_child(leaf_int(1));
    let mut meta = leaf_int(99);
    meta.tags |= TermTag::Sticky;
    t.add_child(meta);

    assert_eq!(t.len(), 2);
    assert_eq!(t.count_prefix(), 1);

    // A branched term whose head is sticky is a decorated atom, not a pair.
    let mut decorated = Term::with_value(Value::Int(5));
    let mut deco = Term::new();
    deco.tags |= TermTag::Sticky;
    decorated.add_child(deco);
    assert!(!decorated.is_pair());
    assert_eq!(decorated.count_prefix(), 0);
  }

  #[test]
  fn deep_copy_is_structurally_equal_and_disjoint() {
    let mut t = Term::new();
    t.add_child(leaf_int(1));
    t.add_child(leaf_int(2));
    let copy = t.deep_copy();
    assert_eq!(t, copy);

    // Mutating the copy must not touch the original.
    copy.children()[0].borrow_mut().value = Value::Int(42);
    assert_eq!(*t.children()[0].borrow(), leaf_int(1));
  }

  #[test]
  fn movable_implies_modifiable() {
    // Exhaustive over the 16 tag combinations.
    for bits in 0u8..16 {
      let tags = TermTags::from_bits_truncate(bits);
      if is_movable(tags) {
        assert!(!tags.contains(TermTag::Nonmodifying));
      }
    }
  }

  #[test]
  fn tag_algebra() {
    let tags = TermTag::Unique | TermTag::Temporary;
    assert_eq!(l_value_tags(tags), TermTags::from(TermTag::Unique));
    assert_eq!(ensure_value_tags(tags), TermTags::from(TermTag::Unique));

    let dst = TermTags::from(TermTag::Unique);
    let src = TermTag::Nonmodifying | TermTag::Temporary;
    let out = propagate_to(dst, src);
    assert!(out.contains(TermTag::Unique));
    assert!(out.contains(TermTag::Nonmodifying));
    assert!(!out.contains(TermTag::Temporary));
  }

  #[test]
  fn take_leaves_empty_list() {
    let mut t = Term::with_value(Value::Int(9));
    t.tags |= TermTag::Temporary;
    let taken = t.take();
    assert!(t.is_empty_list());
    assert!(t.tags.is_empty());
    assert_eq!(taken.value, Value::Int(9));
  }
}
