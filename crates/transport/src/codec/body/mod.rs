//! Body framing for both directions.
//!
//! # Components
//!
//! ## Decoders
//! - [`PayloadDecoder`]: appends the body of an inbound message to its entity buffer,
//!   sized, chunked, close delimited or empty
//!
//! ## Encoders
//! - [`PayloadEncoder`]: wraps the entity channel of an outbound message and writes
//!   framed bytes straight into the socket buffer
//!
//! Both sides report progress with [`PayloadItem`](crate::protocol::PayloadItem).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
