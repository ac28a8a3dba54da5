//! Socket.IO connection establishment.
//!
//! Opens the WebSocket transport directly (no HTTP long-polling phase),
//! waits for the Engine.IO open packet and joins the default namespace.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{parse_frame, OpenInfo, Packet, CONNECT_FRAME, PONG_FRAME};

/// A live WebSocket to the telemetry source.
pub type TelemetryStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound on the open + namespace connect exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket.IO path and query for the WebSocket transport.
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// An established Socket.IO session.
pub struct TelemetryLink {
    pub stream: TelemetryStream,
    pub open: OpenInfo,
}

/// Errors from the telemetry transport.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to establish the WebSocket.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The WebSocket opened but the Socket.IO handshake did not complete.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server refused the namespace connect.
    #[error("Namespace connect refused: {0}")]
    Refused(String),
}

/// WebSocket endpoint for a Socket.IO server URL.
///
/// `http://host:3001` becomes `ws://host:3001/socket.io/?EIO=4&transport=websocket`.
/// URLs that already name a `/socket.io` path are only scheme-mapped.
pub fn socket_io_endpoint(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        url.to_string()
    };

    if url.contains("/socket.io") {
        url
    } else {
        format!("{url}{SOCKET_IO_PATH}")
    }
}

/// Connect to the Socket.IO server at `url` and join the default namespace.
pub async fn open(url: &str) -> Result<TelemetryLink, TelemetryError> {
    let endpoint = socket_io_endpoint(url);

    let (mut stream, _response) = connect_async(endpoint.as_str())
        .await
        .map_err(|e| {
            TelemetryError::Connection(format!("Failed to connect to {endpoint}: {e}"))
        })?;

    let open = match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(TelemetryError::Handshake(format!(
                "no response within {}s",
                HANDSHAKE_TIMEOUT.as_secs()
            )))
        }
    };

    tracing::info!(url = %endpoint, sid = %open.sid, "Connected to telemetry source");
    Ok(TelemetryLink { stream, open })
}

async fn handshake(stream: &mut TelemetryStream) -> Result<OpenInfo, TelemetryError> {
    let open = loop {
        match next_packet(stream).await? {
            Packet::Open(info) => break info,
            other => tracing::trace!(?other, "Ignoring packet before open"),
        }
    };

    send(stream, CONNECT_FRAME).await?;

    loop {
        match next_packet(stream).await? {
            Packet::Connected => return Ok(open),
            Packet::ConnectError(message) => return Err(TelemetryError::Refused(message)),
            Packet::Ping => send(stream, PONG_FRAME).await?,
            Packet::Close | Packet::Disconnected => {
                return Err(TelemetryError::Handshake("server closed the session".into()))
            }
            other => tracing::trace!(?other, "Ignoring packet before namespace connect"),
        }
    }
}

async fn next_packet(stream: &mut TelemetryStream) -> Result<Packet, TelemetryError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return parse_frame(&text).map_err(|e| TelemetryError::Handshake(e.to_string()))
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(TelemetryError::Handshake("WebSocket closed".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TelemetryError::Handshake(e.to_string())),
        }
    }
}

async fn send(stream: &mut TelemetryStream, frame: &str) -> Result<(), TelemetryError> {
    stream
        .send(Message::Text(frame.to_string()))
        .await
        .map_err(|e| TelemetryError::Handshake(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_maps_to_websocket_transport() {
        assert_eq!(
            socket_io_endpoint("http://localhost:3001"),
            "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_io_endpoint("https://bench.example/"),
            "wss://bench.example/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_io_endpoint("ws://127.0.0.1:9000"),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn explicit_socket_io_path_is_kept() {
        assert_eq!(
            socket_io_endpoint("http://h:1/socket.io/?EIO=4&transport=websocket"),
            "ws://h:1/socket.io/?EIO=4&transport=websocket"
        );
    }
}
