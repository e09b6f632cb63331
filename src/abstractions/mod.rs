/*!

Types/type aliases that abstract over the implementing backing type.

The `IString` interned string type is the motivating example. Several
external crates could provide it; this module redirects to whichever
implementation is chosen, currently `string_cache::DefaultAtom`. Likewise
the `log` module encapsulates the logging backend, and `rccell` fixes the
shared-ownership vocabulary (`RcCell`/`WeakCell`) used for terms and
environments throughout the engine.

*/

mod rccell;

// Logging
pub mod log;

// Interned string. `DefaultAtom` is a global cache that can be used across threads.
pub use string_cache::DefaultAtom as IString;

// Reference counted cells with interior mutability, and complementary weak cells.
pub use rccell::{rc_cell, weak_cell, RcCell, WeakCell};
