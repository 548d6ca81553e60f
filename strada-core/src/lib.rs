//! Strada core value model
//!
//! - `value`: the heterogeneous, reference-counted tagged record every
//!   Strada script variable ultimately is.
//! - `array` / `dict`: the two built-in container bodies a Value of kind
//!   Array or Hash owns.
//!
//! This crate has no threads, no I/O, and no regex: it is the small,
//! auditable foundation `strada-runtime` builds the rest of the language
//! on top of. Compiled code only ever sees `Value*` (the `ValuePtr` alias
//! below); the safe `Value` wrapper is an internal convenience for writing
//! operator bodies without hand-rolling refcount arithmetic at every call
//! site, in the same spirit as the teacher's `value_to_stack_value` /
//! `stack_value_to_value` boundary-conversion pair.

pub mod array;
pub mod dict;
pub mod value;

pub use array::ArrayBody;
pub use dict::DictBody;
pub use value::{Value, ValueKind, ValuePtr};
