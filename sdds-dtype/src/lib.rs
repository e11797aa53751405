//! The SDDS scalar type system.
//!
//! Every field of a dataset holds values of one [`SType`]. Single values travel as [`Value`]
//! cells and whole columns or arrays as [`TypedBuffer`]s; both convert between numeric types on
//! request and refuse to mix numbers with text.

pub use buffer::*;
pub use long_double::*;
pub use stype::*;
pub use value::*;

mod buffer;
pub mod escape;
pub mod format;
mod long_double;
mod stype;
pub mod units;
mod value;

static_assertions::assert_eq_size!(LongDouble, f64);
