//! Transport buffering and frame-level I/O.
//!
//! [`BufferedStream`] owns the read accumulator and the bounded write
//! queue; [`WebSocketCodec`] layers frame decoding and encoding on top.

mod framed;
pub mod stream;

pub use framed::WebSocketCodec;
pub use stream::{BufferedStream, ReadStatus};
