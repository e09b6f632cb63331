/*!

Reference counted pointers with mutable state, and complementary weak pointers.

The engine relies on reference counting instead of a tracing collector, so
almost every shared structure is an `RcCell`: term nodes, environments, the
captured state of a one-shot continuation. `WeakCell` complements it where an
owning link would create a cycle.

*/

use std::{
  cell::RefCell,
  rc::{Rc, Weak},
};

pub type RcCell<T>   = Rc<RefCell<T>>;
pub type WeakCell<T> = Weak<RefCell<T>>;

/// Wraps a value in a fresh reference counted cell.
#[inline(always)]
pub fn rc_cell<T>(value: T) -> RcCell<T> {
  Rc::new(RefCell::new(value))
}

/// Downgrades a cell to its weak counterpart.
#[inline(always)]
pub fn weak_cell<T>(cell: &RcCell<T>) -> WeakCell<T> {
  Rc::downgrade(cell)
}
