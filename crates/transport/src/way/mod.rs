//! The two directions of a connection.
//!
//! A way owns a byte buffer, a line builder and a FIFO of messages, and moves
//! exactly one message at a time through
//! `Idle -> Start -> Headers -> Body -> End -> Idle`:
//!
//! - [`OutboundWay`]: frames queued messages into its buffer and drains the buffer into the socket
//! - [`InboundWay`]: fills its buffer from the socket and parses it into messages
//!
//! Neither way ever blocks. When the socket or an entity can't make progress
//! the way records an interest in its [`IoState`] and returns; the caller is
//! expected to select it again once the interest is ready.

mod inbound;
mod outbound;

pub use inbound::InboundWay;
pub use outbound::OutboundWay;

/// Where the current message of a way stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// No current message
    Idle,
    /// Start line
    Start,
    /// Header lines, up to and including the blank line
    Headers,
    /// Entity bytes
    Body,
    /// Every byte of the message is framed, waiting for completion
    End,
}

/// What a way is doing with its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoState {
    /// Nothing to do
    Idle,
    /// Waiting for readiness of the socket or the entity, see [`WayInterest`]
    Interest,
    /// Inside `on_selected`, or selected and able to go on
    Processing,
}

/// What an outbound way in [`IoState::Interest`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WayInterest {
    None,
    /// the socket accepting more bytes
    Socket,
    /// the entity channel producing more bytes
    Entity,
}
