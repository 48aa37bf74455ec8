//! WebSocket transport.
//!
//! A [`Connector`] dials the chat server. Each dialled socket is owned by one
//! task running [`run_socket`], which turns socket activity into
//! [`SessionEvent`]s tagged with the attempt number and writes outbound text
//! it receives over a channel. Dropping the channel sender closes the socket.
//!
//! Event order per socket is always:
//!
//! ```text
//! SocketOpened, SocketFrame*, [SocketError], SocketClosed
//! ```
//!
//! or, when the handshake fails, `SocketError, SocketClosed`.

use std::{future::Future, sync::Arc};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use murmur_core::SessionEvent;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, trace};

use crate::error::TransportError;

/// Dials WebSocket connections.
pub trait Connector: Send + Sync + 'static {
    /// Established socket.
    type Socket: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Send
        + Unpin
        + 'static;

    /// Open a socket to `url`.
    fn connect(&self, url: &str)
    -> impl Future<Output = Result<Self::Socket, TransportError>> + Send;
}

/// Production connector over TCP, with TLS for `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Socket, TransportError>> + Send {
        let url = url.to_string();
        async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect { url: url.clone(), reason: e.to_string() })?;
            Ok(socket)
        }
    }
}

/// Drive one socket until it closes.
pub(crate) async fn run_socket<C: Connector>(
    connector: Arc<C>,
    attempt: u64,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let socket = match connector.connect(&url).await {
        Ok(socket) => socket,
        Err(e) => {
            let reason = e.to_string();
            debug!(attempt, %reason, "connect failed");
            let _ = events.send(SessionEvent::SocketError { attempt, reason: reason.clone() });
            let _ = events.send(SessionEvent::SocketClosed { attempt, reason });
            return;
        },
    };
    if events.send(SessionEvent::SocketOpened { attempt }).is_err() {
        return;
    }

    let (mut write, mut read) = socket.split();
    let reason = loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(text) => {
                    trace!(attempt, %text, "sending frame");
                    if let Err(e) = write.send(Message::text(text)).await {
                        let reason = TransportError::Socket { reason: e.to_string() }.to_string();
                        let _ = events.send(SessionEvent::SocketError { attempt, reason: reason.clone() });
                        break reason;
                    }
                },
                None => {
                    // Close requested by the session.
                    let _ = write.close().await;
                    break "closed by client".to_string();
                },
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SessionEvent::SocketFrame { attempt, text: text.to_string() });
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| format!("closed by server ({}): {}", u16::from(f.code), f.reason),
                    );
                },
                Some(Ok(other)) => trace!(attempt, ?other, "ignoring non-text frame"),
                Some(Err(e)) => {
                    let reason = TransportError::Socket { reason: e.to_string() }.to_string();
                    let _ = events.send(SessionEvent::SocketError { attempt, reason: reason.clone() });
                    break reason;
                },
                None => break "connection closed".to_string(),
            },
        }
    };

    debug!(attempt, %reason, "socket finished");
    let _ = events.send(SessionEvent::SocketClosed { attempt, reason });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    #[tokio::test]
    async fn dials_plain_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept_async(stream).await.unwrap()
        });

        let url = format!("ws://127.0.0.1:{port}/chat/amy");
        assert!(TungsteniteConnector.connect(&url).await.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn secure_urls_attempt_a_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept and hang up before any handshake completes.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let url = format!("wss://127.0.0.1:{port}/chat/amy");
        let Err(TransportError::Connect { reason, .. }) = TungsteniteConnector.connect(&url).await
        else {
            panic!("handshake against a closed stream succeeded");
        };
        assert!(!reason.contains("TLS support not compiled in"), "{reason}");
    }
}
