//! Start lines and header lines.
//!
//! - [`HeaderDecoder`]: parses the collected head of an inbound message with
//!   `httparse`, and picks the framing of its body with [`parse_payload`]
//! - [`HeaderEncoder`]: writes the start line of an outbound message and
//!   materializes its [`HeaderSeries`]

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_decoder::is_keep_alive;
pub use header_decoder::parse_payload;
pub use header_encoder::HeaderEncoder;
pub use header_encoder::HeaderSeries;
