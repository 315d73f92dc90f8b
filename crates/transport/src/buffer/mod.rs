//! Buffers owned by a way.
//!
//! - [`ByteBuffer`]: the fixed capacity buffer between the framer and the socket
//! - [`LineBuilder`]: the accumulator for one start line or header line

mod byte_buffer;
mod line_builder;

pub use byte_buffer::BufferState;
pub use byte_buffer::ByteBuffer;
pub use line_builder::LineBuilder;
