//! Turmoil-backed connector and status source.
//!
//! Inside a turmoil host the tokio clock is virtual, so the production
//! `SystemEnv` and `ChatClient` run unchanged; only the socket layer and the
//! status endpoint are swapped out.

use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use murmur_client::{Connector, FetchError, StatusSource, TransportError};
use tokio_tungstenite::{WebSocketStream, client_async, tungstenite::http::Uri};
use turmoil::net::TcpStream;

/// Default port when the address has none.
const DEFAULT_WS_PORT: u16 = 80;

/// Dials `ws://host:port/...` over turmoil's simulated TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimConnector;

impl Connector for SimConnector {
    type Socket = WebSocketStream<TcpStream>;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Socket, TransportError>> + Send {
        let url = url.to_string();
        async move {
            let failed = |reason: String| TransportError::Connect { url: url.clone(), reason };

            let uri = url.parse::<Uri>().map_err(|e| failed(e.to_string()))?;
            let host = uri.host().ok_or_else(|| failed("address has no host".to_string()))?;
            let port = uri.port_u16().unwrap_or(DEFAULT_WS_PORT);

            let stream =
                TcpStream::connect((host, port)).await.map_err(|e| failed(e.to_string()))?;
            let (socket, _response) =
                client_async(url.as_str(), stream).await.map_err(|e| failed(e.to_string()))?;
            Ok(socket)
        }
    }
}

/// Status source whose answer the test controls.
#[derive(Debug, Clone)]
pub struct ScriptedStatus {
    body: Arc<Mutex<Result<String, FetchError>>>,
}

impl ScriptedStatus {
    /// Answer every fetch with `body`.
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: Arc::new(Mutex::new(Ok(body.into()))) }
    }

    /// Change the answer for subsequent fetches.
    pub fn set(&self, answer: Result<String, FetchError>) {
        *self.body.lock().unwrap_or_else(PoisonError::into_inner) = answer;
    }
}

impl StatusSource for ScriptedStatus {
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send {
        let answer = self.body.lock().unwrap_or_else(PoisonError::into_inner).clone();
        async move { answer }
    }
}
