//! Framing of HTTP/1.x messages.
//!
//! The codecs never own a buffer: the ways hand them lines and byte windows
//! and they report how far they got.
//!
//! - [`header`]: start lines, header lines and the choice of body framing
//! - [`body`]: sized, chunked and close delimited bodies in both directions

pub mod body;
pub mod header;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::{HeaderDecoder, HeaderEncoder, HeaderSeries};
