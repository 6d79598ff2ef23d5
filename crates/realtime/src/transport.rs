use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ConnectionError;

pub type InboundFrames = mpsc::UnboundedReceiver<Result<String, ConnectionError>>;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Cloneable handle to one live socket. Dropping every clone does not close
/// the socket; call [`SocketHandle::close`].
#[derive(Debug, Clone)]
pub struct SocketHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl SocketHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, text: String) -> Result<(), ConnectionError> {
        if self.cancel.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        self.outbound
            .send(text)
            .map_err(|_| ConnectionError::Closed)
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }

    pub fn closed_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A freshly established socket: the handle plus the stream of inbound text
/// frames. The stream ends when the socket closes.
#[derive(Debug)]
pub struct SocketConnection {
    pub handle: SocketHandle,
    pub inbound: InboundFrames,
}

/// The IO side of a [`SocketConnection`], driven by a transport task.
#[derive(Debug)]
pub struct SocketPeer {
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub inbound: mpsc::UnboundedSender<Result<String, ConnectionError>>,
    pub cancel: CancellationToken,
}

impl SocketConnection {
    pub fn pair() -> (SocketConnection, SocketPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let connection = SocketConnection {
            handle: SocketHandle {
                id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
                outbound: outbound_tx,
                cancel: cancel.clone(),
            },
            inbound: inbound_rx,
        };
        let peer = SocketPeer {
            outbound: outbound_rx,
            inbound: inbound_tx,
            cancel,
        };
        (connection, peer)
    }
}

/// Opens authenticated sockets to the backend.
pub trait SocketTransport: Send + Sync + 'static {
    fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> impl Future<Output = Result<SocketConnection, ConnectionError>> + Send;
}

/// WebSocket transport over `tokio-tungstenite`, sending the bearer token in
/// the `Authorization` header.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl SocketTransport for WebSocketTransport {
    async fn connect(&self, url: &str, token: &str) -> Result<SocketConnection, ConnectionError> {
        let mut request = url
            .into_client_request()
            .map_err(|error| ConnectionError::InvalidUrl(error.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|error| ConnectionError::AuthenticationFailed(error.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_websocket_error)?;

        let (connection, peer) = SocketConnection::pair();
        tokio::spawn(run_socket(stream, peer));
        Ok(connection)
    }
}

fn map_websocket_error(error: WsError) -> ConnectionError {
    if let WsError::Http(response) = &error {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return ConnectionError::AuthenticationFailed(format!("server rejected token ({status})"));
        }
    }

    let message = error.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("dns")
        || lower.contains("resolve")
        || lower.contains("failed to lookup")
    {
        ConnectionError::DnsResolutionFailed(message)
    } else if lower.contains("tls") || lower.contains("certificate") {
        ConnectionError::TlsHandshakeFailed(message)
    } else {
        ConnectionError::TransportError(message)
    }
}

async fn run_socket(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, mut peer: SocketPeer) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = peer.cancel.cancelled() => {
                if let Err(error) = sink.send(Message::Close(None)).await {
                    debug!(error = %error, "close frame not sent");
                }
                break;
            }
            outgoing = peer.outbound.recv() => {
                let Some(text) = outgoing else { break };
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    let _ = peer.inbound.send(Err(map_websocket_error(error)));
                    break;
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if peer.inbound.send(Ok(text.as_str().to_owned())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if peer.inbound.send(Ok(text)).is_err() {
                            break;
                        }
                    }
                    Err(error) => warn!(error = %error, "dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    let _ = peer.inbound.send(Err(map_websocket_error(error)));
                    break;
                }
            },
        }
    }

    peer.cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn pair_links_handle_and_peer() {
        let (connection, mut peer) = SocketConnection::pair();
        let SocketConnection {
            handle,
            mut inbound,
        } = connection;

        handle.send("ping".to_string()).unwrap();
        assert_eq!(peer.outbound.recv().await.as_deref(), Some("ping"));

        peer.inbound.send(Ok("pong".to_string())).unwrap();
        assert_eq!(inbound.recv().await.unwrap().unwrap(), "pong");

        handle.close();
        assert!(peer.cancel.is_cancelled());
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send("late".to_string()),
            Err(ConnectionError::Closed)
        ));
    }

    #[test]
    fn handles_get_distinct_ids() {
        let (first, _peer_one) = SocketConnection::pair();
        let (second, _peer_two) = SocketConnection::pair();
        assert_ne!(first.handle.id(), second.handle.id());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rejects_invalid_urls() {
        let result = WebSocketTransport.connect("not a url", "token").await;
        assert!(matches!(result, Err(ConnectionError::InvalidUrl(_))));
    }
}
