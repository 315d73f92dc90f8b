//! Core HTTP protocol abstractions shared by both directions of a connection.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): the unit the transport moves
//!   - [`Message`]: a request or response head plus an optional entity
//!   - [`PayloadItem`]: progress reported by body encoders and decoders
//!   - [`PayloadSize`]: the framing chosen for a body
//!
//! - **Request Processing** ([`request`]): [`RequestHeader`] wraps `http::Request<()>`
//!
//! - **Response Processing** ([`response`]): [`ResponseHead`] aliases `http::Response<()>`
//!
//! - **Entities** ([`entity`]): [`Entity`] and [`EntityChannelType`]
//!
//! - **Error Handling** ([`error`]):
//!   - [`TransportError`]: Top-level error type
//!   - [`ParseError`]: inbound framing errors
//!   - [`SendError`]: outbound errors

mod message;
pub use message::Message;
pub use message::MessageHead;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub(crate) use response::response_allows_body;

mod entity;
pub use entity::BoxError;
pub use entity::Entity;
pub use entity::EntityChannelType;
pub(crate) use entity::EntitySource;

mod error;
pub use error::ParseError;
pub use error::SendError;
pub use error::TransportError;
