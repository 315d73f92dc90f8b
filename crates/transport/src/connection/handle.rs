//! The application's side of a connection: the message queue interface.
//!
//! - [`MessageSender`]: enqueues outbound messages, each answered by a [`DeliveryReceipt`]
//! - [`MessageReceiver`]: a [`Stream`] of the inbound messages, ending when the connection closes
//! - [`ConnectionHandle`]: both of them, as returned by
//!   [`ReactorHandle::register`](crate::reactor::ReactorHandle::register)

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use triomphe::Arc;

use crate::protocol::{Message, TransportError};

/// How an enqueued message ended.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// every byte of the message was handed to the socket
    Sent,
    /// the connection failed while the message was going out
    Failed(Arc<TransportError>),
    /// the connection closed before the message was started
    Discarded,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

pub(crate) type Envelope = (Message, oneshot::Sender<Delivery>);

pub(crate) type Incoming = Result<Message, Arc<TransportError>>;

/// Creates the handle of connection `id` and the connection's ends of its queues.
pub(crate) fn channel(
    id: u64,
    token: CancellationToken,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<Envelope>, mpsc::UnboundedSender<Incoming>) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded();
    let (incoming_tx, incoming_rx) = mpsc::unbounded();

    let handle = ConnectionHandle {
        sender: MessageSender { id, tx: outgoing_tx, token },
        receiver: MessageReceiver { id, rx: incoming_rx },
    };
    (handle, outgoing_rx, incoming_tx)
}

/// Enqueues messages on one connection.
///
/// Clones share the queue; the connection notices when the last one is dropped.
#[derive(Debug, Clone)]
pub struct MessageSender {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
    token: CancellationToken,
}

impl MessageSender {
    /// The id the reactor gave the connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues `message` behind the ones enqueued before it.
    ///
    /// The receipt resolves once the message is sent, or fails with the
    /// connection. Enqueuing on a closed connection fails at once.
    pub fn enqueue(&self, message: impl Into<Message>) -> DeliveryReceipt {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self.tx.unbounded_send((message.into(), tx)) {
            let (_, tx) = e.into_inner();
            let _ = tx.send(Delivery::Failed(Arc::new(TransportError::Closed)));
        }
        DeliveryReceipt { rx }
    }

    /// Asks the reactor to close the connection, from any thread.
    ///
    /// Messages not sent yet are discarded.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }
}

/// Resolves to the [`Delivery`] of one enqueued message.
#[derive(Debug)]
#[must_use = "the receipt reports whether the message was sent"]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<Delivery>,
}

impl Future for DeliveryReceipt {
    type Output = Delivery;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a connection dropped without settling never started the message
        self.rx.poll_unpin(cx).map(|delivery| delivery.unwrap_or(Delivery::Discarded))
    }
}

/// The inbound messages of one connection, in arrival order.
///
/// A failed connection yields its error as the last item.
#[derive(Debug)]
pub struct MessageReceiver {
    id: u64,
    rx: mpsc::UnboundedReceiver<Incoming>,
}

impl MessageReceiver {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Stream for MessageReceiver {
    type Item = Result<Message, Arc<TransportError>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

/// Both queues of a registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    sender: MessageSender,
    receiver: MessageReceiver,
}

impl ConnectionHandle {
    pub fn id(&self) -> u64 {
        self.sender.id
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn enqueue(&self, message: impl Into<Message>) -> DeliveryReceipt {
        self.sender.enqueue(message)
    }

    pub fn close(&self) {
        self.sender.close();
    }

    pub fn into_split(self) -> (MessageSender, MessageReceiver) {
        (self.sender, self.receiver)
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Message, Arc<TransportError>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}
