//! The hard-core reactive primitives: `Cell`, `Derived`, `Effect`, and
//! `Batch`. Dependency-free by design — everything above this crate
//! (`StateMap`, `Hub`, `Client`) is built out of these four.

mod batch;
mod cell;
mod context;
mod derived;
mod effect;

pub use batch::{batch, BatchScope};
pub use cell::{Cell, Unsubscribe};
pub use derived::Derived;
pub use effect::Effect;
