//! A reactor driven HTTP/1.x message transport.
//!
//! This crate moves HTTP/1.0 and HTTP/1.1 messages between the application
//! and non-blocking sockets. Many connections share one reactor task; none of
//! them ever blocks it, and none of them can stall the others.
//!
//! # Features
//!
//! - Sized, chunked and close delimited bodies, chosen per message
//! - Pipelined requests and responses, strictly in order
//! - Entities from memory, files, blocking readers, async readers and `http_body::Body`s
//! - Blocking entity sources read on a bounded worker pool
//! - Backpressure from the socket or the entity is never an error
//!
//! # Architecture
//!
//! - [`reactor`]: the task that polls every connection
//! - [`connection`]: a socket with its two ways, and the application's handles
//! - [`way`]: the inbound and outbound state machines
//! - [`codec`]: start lines, header lines and body framing
//! - [`channel`]: the channels that drive outbound entity sources
//! - [`buffer`]: the byte buffer and the line builder of a way
//! - [`protocol`]: messages, entities and errors
//! - [`config`]: limits and sizes
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use http::Response;
//! use micro_transport::config::TransportConfig;
//! use micro_transport::connection::Role;
//! use micro_transport::protocol::Entity;
//! use micro_transport::reactor::Reactor;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (reactor, handle) = Reactor::new(TransportConfig::default());
//!     tokio::spawn(reactor.run());
//!
//!     info!(port = 8080, "start listening");
//!     let listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(listener) => listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     loop {
//!         let Ok((stream, _)) = listener.accept().await else { continue };
//!         let Ok(mut connection) = handle.register(stream, Role::Server) else { break };
//!
//!         tokio::spawn(async move {
//!             while let Some(Ok(_request)) = connection.next().await {
//!                 let response = Response::new(Entity::from_bytes("Hello World!"));
//!                 if !connection.enqueue(response).await.is_sent() {
//!                     warn!("response not sent");
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod reactor;
pub mod way;

mod utils;
pub(crate) use utils::ensure;
