//! Runtime call bridge.
//!
//! Builds native trampolines from a [`glot_manifest::Method`] so foreign
//! callees can be invoked through a uniform C callback and vice versa:
//!
//! * [`JitCallback`] — a native function matching the method signature that
//!   packs its arguments into a [`Parameters`] cell buffer and forwards to
//!   a uniform handler.
//! * [`JitCall`] — a uniform `fn(params, ret)` entry that unpacks a cell
//!   buffer and performs the native call.
//!
//! Arguments occupy one 8-byte cell each; anything wider than 64 bits
//! passed by value is rejected at generation time.

mod call;
mod callback;
mod types;

pub use call::{CallFunction, JitCall};
pub use callback::{CallbackHandler, JitCallback};
pub use types::{
    default_hidden_param, CellBuffer, HiddenParam, JitError, Parameters, ReturnBuffer, ReturnValue,
};
