//! Transport abstraction and the direct WebSocket transport.
//!
//! A transport moves whole frames; framing within a frame (length prefix,
//! encryption) belongs to the session layer. WebSocket's own message
//! boundaries carry one frame per binary message.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{NetError, NetResult};

/// A bidirectional frame transport.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()>;

    /// Receive one frame. `TransportLost` when the peer is gone.
    async fn recv_frame(&mut self) -> NetResult<Vec<u8>>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> NetResult<()>;

    /// Split into independently owned read and write halves, so a task
    /// can await inbound frames while another part sends.
    fn into_split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// Receiving half of a split transport.
#[async_trait]
pub trait TransportReader: Send {
    /// Receive one frame. `TransportLost` when the peer is gone.
    async fn recv_frame(&mut self) -> NetResult<Vec<u8>>;
}

/// Sending half of a split transport.
#[async_trait]
pub trait TransportWriter: Send {
    /// Send one frame.
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> NetResult<()>;
}

enum WsStream {
    Client(WebSocketStream<MaybeTlsStream<TcpStream>>),
    Server(WebSocketStream<TcpStream>),
}

/// Direct WebSocket transport, client or accepted side.
pub struct WsTransport {
    stream: WsStream,
    closed: bool,
}

impl WsTransport {
    /// Connect to a WebSocket endpoint URL.
    pub async fn connect(url: &str) -> NetResult<Self> {
        url::Url::parse(url).map_err(|e| NetError::InvalidUrl(format!("{url}: {e}")))?;
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| NetError::Transport(format!("connect {url}: {e}")))?;
        debug!(url, "websocket connected");
        Ok(Self { stream: WsStream::Client(stream), closed: false })
    }

    async fn send_message(&mut self, message: Message) -> NetResult<()> {
        let result = match &mut self.stream {
            WsStream::Client(ws) => ws.send(message).await,
            WsStream::Server(ws) => ws.send(message).await,
        };
        result.map_err(|e| NetError::Transport(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        match &mut self.stream {
            WsStream::Client(ws) => ws.next().await,
            WsStream::Server(ws) => ws.next().await,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        self.send_message(Message::Binary(bytes)).await
    }

    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        loop {
            match self.next_message().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(NetError::TransportLost),
                Some(Ok(other)) => {
                    return Err(NetError::Transport(format!(
                        "unexpected websocket message: {other:?}"
                    )))
                }
                Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
            }
        }
    }

    async fn close(&mut self) -> NetResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.send_message(Message::Close(None)).await;
        Ok(())
    }

    fn into_split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        match self.stream {
            WsStream::Client(ws) => {
                let (sink, stream) = ws.split();
                (
                    Box::new(WsReadHalf::Client(stream)),
                    Box::new(WsWriteHalf::Client { sink, closed: self.closed }),
                )
            }
            WsStream::Server(ws) => {
                let (sink, stream) = ws.split();
                (
                    Box::new(WsReadHalf::Server(stream)),
                    Box::new(WsWriteHalf::Server { sink, closed: self.closed }),
                )
            }
        }
    }
}

/// Receiving half of a split WebSocket transport.
pub enum WsReadHalf {
    Client(futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>),
    Server(futures::stream::SplitStream<WebSocketStream<TcpStream>>),
}

/// Sending half of a split WebSocket transport.
pub enum WsWriteHalf {
    Client {
        sink: futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
        closed: bool,
    },
    Server {
        sink: futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
        closed: bool,
    },
}

#[async_trait]
impl TransportReader for WsReadHalf {
    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        loop {
            let next = match self {
                WsReadHalf::Client(stream) => stream.next().await,
                WsReadHalf::Server(stream) => stream.next().await,
            };
            match next {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(NetError::TransportLost),
                Some(Ok(other)) => {
                    return Err(NetError::Transport(format!(
                        "unexpected websocket message: {other:?}"
                    )))
                }
                Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl TransportWriter for WsWriteHalf {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        let result = match self {
            WsWriteHalf::Client { sink, .. } => sink.send(Message::Binary(bytes)).await,
            WsWriteHalf::Server { sink, .. } => sink.send(Message::Binary(bytes)).await,
        };
        result.map_err(|e| NetError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> NetResult<()> {
        match self {
            WsWriteHalf::Client { sink, closed } => {
                if !*closed {
                    *closed = true;
                    let _ = sink.send(Message::Close(None)).await;
                }
            }
            WsWriteHalf::Server { sink, closed } => {
                if !*closed {
                    *closed = true;
                    let _ = sink.send(Message::Close(None)).await;
                }
            }
        }
        Ok(())
    }
}

/// Accepting side of the direct WebSocket transport.
pub struct WsListener {
    listener: TcpListener,
}

impl WsListener {
    /// Bind a listener, e.g. on `127.0.0.1:0`.
    pub async fn bind(addr: &str) -> NetResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetError::Transport(format!("bind {addr}: {e}")))?;
        Ok(Self { listener })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> NetResult<std::net::SocketAddr> {
        self.listener.local_addr().map_err(|e| NetError::Transport(e.to_string()))
    }

    /// The `ws://` URL peers can connect to.
    pub fn local_url(&self) -> NetResult<String> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// Accept one inbound transport.
    pub async fn accept(&self) -> NetResult<WsTransport> {
        let (socket, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| NetError::Transport(format!("accept: {e}")))?;
        let stream = accept_async(socket)
            .await
            .map_err(|e| NetError::Transport(format!("upgrade from {peer}: {e}")))?;
        debug!(%peer, "websocket accepted");
        Ok(WsTransport { stream: WsStream::Server(stream), closed: false })
    }
}

/// In-process transport over bounded channels.
///
/// Test double with the same semantics as a socket transport: dropping one
/// end surfaces `TransportLost` on the other.
pub struct MemoryTransport {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    closed: bool,
}

/// Create a connected pair of in-process transports.
pub fn memory_transport_pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel(64);
    let (b_tx, a_rx) = mpsc::channel(64);
    (
        MemoryTransport { tx: a_tx, rx: a_rx, closed: false },
        MemoryTransport { tx: b_tx, rx: b_rx, closed: false },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        if self.closed {
            return Err(NetError::TransportLost);
        }
        self.tx.send(bytes).await.map_err(|_| NetError::TransportLost)
    }

    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        if self.closed {
            return Err(NetError::TransportLost);
        }
        self.rx.recv().await.ok_or(NetError::TransportLost)
    }

    async fn close(&mut self) -> NetResult<()> {
        self.closed = true;
        Ok(())
    }

    fn into_split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        (
            Box::new(MemoryReader { rx: self.rx, closed: self.closed }),
            Box::new(MemoryWriter { tx: self.tx, closed: self.closed }),
        )
    }
}

/// Receiving half of a split [`MemoryTransport`].
pub struct MemoryReader {
    rx: mpsc::Receiver<Vec<u8>>,
    closed: bool,
}

/// Sending half of a split [`MemoryTransport`].
pub struct MemoryWriter {
    tx: mpsc::Sender<Vec<u8>>,
    closed: bool,
}

#[async_trait]
impl TransportReader for MemoryReader {
    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        if self.closed {
            return Err(NetError::TransportLost);
        }
        self.rx.recv().await.ok_or(NetError::TransportLost)
    }
}

#[async_trait]
impl TransportWriter for MemoryWriter {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        if self.closed {
            return Err(NetError::TransportLost);
        }
        self.tx.send(bytes).await.map_err(|_| NetError::TransportLost)
    }

    async fn close(&mut self) -> NetResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pair_moves_frames_both_ways() {
        let (mut a, mut b) = memory_transport_pair();
        a.send_frame(b"to b".to_vec()).await.unwrap();
        b.send_frame(b"to a".to_vec()).await.unwrap();
        assert_eq!(b.recv_frame().await.unwrap(), b"to b");
        assert_eq!(a.recv_frame().await.unwrap(), b"to a");
    }

    #[tokio::test]
    async fn dropped_peer_is_transport_lost() {
        let (mut a, b) = memory_transport_pair();
        drop(b);
        assert!(matches!(a.recv_frame().await, Err(NetError::TransportLost)));
    }

    #[tokio::test]
    async fn websocket_round_trip() {
        let listener = WsListener::bind("127.0.0.1:0").await.unwrap();
        let url = listener.local_url().unwrap();

        let server = tokio::spawn(async move {
            let mut transport = listener.accept().await.unwrap();
            let frame = transport.recv_frame().await.unwrap();
            transport.send_frame(frame).await.unwrap();
        });

        let mut client = WsTransport::connect(&url).await.unwrap();
        client.send_frame(b"echo me".to_vec()).await.unwrap();
        assert_eq!(client.recv_frame().await.unwrap(), b"echo me");
        server.await.unwrap();
    }
}
