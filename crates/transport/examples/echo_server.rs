//! Answers every request with its own body.
//!
//! ```text
//! cargo run --example echo_server
//! curl -d 'hello' http://127.0.0.1:8080/
//! ```

use futures::StreamExt;
use http::{Response, StatusCode, header};
use micro_transport::config::TransportConfig;
use micro_transport::connection::{ConnectionHandle, Role};
use micro_transport::protocol::{Entity, Message};
use micro_transport::reactor::Reactor;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let (reactor, handle) = Reactor::new(TransportConfig::default());
    let reactor = tokio::spawn(reactor.run());

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        tokio::select! {
            accepted = tcp_listener.accept() => {
                let (tcp_stream, remote_addr) = match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                };

                match handle.register(tcp_stream, Role::Server) {
                    Ok(connection) => {
                        info!(%remote_addr, connection = connection.id(), "accepted");
                        tokio::spawn(echo(connection));
                    }
                    Err(e) => {
                        error!(cause = %e, "register connection error");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    handle.shutdown();
    if let Err(e) = reactor.await {
        error!(cause = %e, "reactor task panicked");
    }
}

async fn echo(mut connection: ConnectionHandle) {
    while let Some(received) = connection.next().await {
        let request = match received {
            Ok(request) => request,
            Err(e) => {
                warn!(cause = %e, "connection failed");
                return;
            }
        };

        let response = echo_response(request);
        let delivery = connection.enqueue(response).await;
        if !delivery.is_sent() {
            warn!(?delivery, "response not sent");
            return;
        }
    }
}

fn echo_response(mut request: Message) -> Message {
    let content_type = request.headers().get(header::CONTENT_TYPE).cloned();

    let mut response = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = content_type {
        response = response.header(header::CONTENT_TYPE, content_type);
    }

    let body = request.take_entity().and_then(Entity::into_bytes).unwrap_or_default();
    match response.body(Entity::from_bytes(body)) {
        Ok(response) => Message::from(response),
        Err(e) => {
            error!(cause = %e, "build response error");
            Message::from(Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(()).unwrap_or_default())
        }
    }
}
