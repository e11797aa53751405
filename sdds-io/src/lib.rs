//! Stream adapters for SDDS data: byte orders, binary encoders and decoders, and the
//! file, stdio and in-memory streams that datasets read from and write to.

pub use byte_order::*;
pub use decoder::*;
pub use encoder::*;
pub use env::*;
pub use scalar::*;
pub use stream::*;

mod byte_order;
mod decoder;
mod encoder;
mod env;
pub mod f80;
mod scalar;
mod stream;
