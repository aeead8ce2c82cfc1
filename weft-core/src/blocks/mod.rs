//! Control-flow blocks built on the effect tree.
//!
//! - [`key_block`](crate::Runtime::key_block): re-creates its content when an
//!   asynchronously computed key changes.
//! - [`component`](crate::Runtime::component): swaps its content when the
//!   component to render changes, deferring the swap under a fork.

mod component;
mod key;
