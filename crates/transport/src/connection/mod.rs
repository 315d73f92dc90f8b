//! Connections and the application's handles on them.
//!
//! # Components
//!
//! - [`Socket`]: the non-blocking socket a connection runs over
//! - `Connection`: the socket, an inbound and an outbound way and the
//!   persistence flag, pumped by the [`Reactor`](crate::reactor::Reactor)
//! - [`ConnectionHandle`], [`MessageSender`], [`MessageReceiver`]: the message
//!   queue interface the application uses
//!
//! # Closing
//!
//! A connection starts persistent and stops being so when an inbound message
//! is not keep-alive or an outbound message announces `Connection: close` or
//! is close delimited. It then closes once every received request is
//! answered (server) or every sent request has its response (client). It also
//! closes when the peer ends its stream and nothing is left to send, when the
//! application drops its sender, or on [`MessageSender::close`].
//!
//! A socket or framing error fails the connection: the message being sent gets
//! [`Delivery::Failed`], the queued ones [`Delivery::Discarded`], and the
//! receiver gets the error as its last item.

mod handle;
mod http_connection;
mod socket;

pub use handle::ConnectionHandle;
pub use handle::Delivery;
pub use handle::DeliveryReceipt;
pub use handle::MessageReceiver;
pub use handle::MessageSender;
pub(crate) use http_connection::Connection;
pub use http_connection::PUMP_BUDGET;
pub use socket::Socket;

#[cfg(test)]
pub(crate) use socket::MockSocket;

/// Which side of the exchange a connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// reads requests, sends responses
    Server,
    /// sends requests, reads responses
    Client,
}
