//! Relay transport and relay service.
//!
//! Both endpoints connect to the relay as WebSocket clients, register
//! under their exchange public key, and answer a signed authentication
//! challenge. An initiator then issues a `communication_request` naming
//! the target key; once the relay links the two registrations it signals
//! `communication_ready` to both sides and forwards frames verbatim from
//! then on, at which point the normal session handshake runs over the
//! relayed stream.
//!
//! The hand-over window between `communication_request` and the ready
//! signal is racy: the peer may start its handshake before our ready
//! signal arrives. [`RelayTransport`] buffers any early inbound frame and
//! replays it as the first `recv_frame` result.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parley_crypto::{hex_string, random_token, verify, PublicKey, SignKeypair};
use parley_wire::{decode_command, RelayCommand};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{NetError, NetResult};
use crate::transport::{Transport, TransportReader, TransportWriter};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn encode_relay(command: &RelayCommand) -> NetResult<Vec<u8>> {
    serde_json::to_vec(command).map_err(|e| NetError::Relay(e.to_string()))
}

// =============================================================================
// Client transport
// =============================================================================

/// Client side of a relayed session stream.
pub struct RelayTransport {
    sink: SplitSink<ClientWs, Message>,
    stream: SplitStream<ClientWs>,
    /// Frames that raced past the hand-over signal.
    buffered: VecDeque<Vec<u8>>,
    public_key: PublicKey,
    closed: bool,
}

impl RelayTransport {
    /// Connect to a relay, register, and pass the authentication
    /// challenge.
    pub async fn connect(
        relay_url: &str,
        public_key: PublicKey,
        sign_keypair: &SignKeypair,
    ) -> NetResult<Self> {
        let (ws, _) = connect_async(relay_url)
            .await
            .map_err(|e| NetError::Relay(format!("connect {relay_url}: {e}")))?;
        let (sink, stream) = ws.split();
        let mut transport = Self {
            sink,
            stream,
            buffered: VecDeque::new(),
            public_key,
            closed: false,
        };

        transport
            .send_command(&RelayCommand::Register {
                public_key,
                sign_key: sign_keypair.public(),
            })
            .await?;

        match transport.recv_command().await? {
            RelayCommand::AuthenticationRequest { challenge } => {
                let signature = sign_keypair.sign(challenge.as_bytes());
                transport
                    .send_command(&RelayCommand::AuthenticationResponse { signature })
                    .await?;
            }
            other => return Err(NetError::Relay(format!("expected challenge, got {other:?}"))),
        }
        match transport.recv_command().await? {
            RelayCommand::AuthenticationSuccess => {}
            other => return Err(NetError::Relay(format!("authentication refused: {other:?}"))),
        }
        debug!(key = %public_key, "registered with relay");
        Ok(transport)
    }

    /// Ask the relay to link this client to a registered target, then wait
    /// for the hand-over signal. Early frames from the peer are buffered.
    pub async fn open_to(&mut self, target: PublicKey) -> NetResult<()> {
        self.send_command(&RelayCommand::CommunicationRequest {
            source_public_key: self.public_key,
            target_public_key: target,
        })
        .await?;
        self.wait_ready().await
    }

    /// Wait for an initiator to be linked to us, buffering early frames.
    pub async fn wait_incoming(&mut self) -> NetResult<()> {
        self.wait_ready().await
    }

    async fn wait_ready(&mut self) -> NetResult<()> {
        loop {
            let bytes = self.recv_raw().await?;
            if let Ok(RelayCommand::CommunicationReady) = decode_command::<RelayCommand>(&bytes) {
                return Ok(());
            }
            // The peer's handshake opener won the race against the ready
            // signal; keep it for the first post-hand-over read.
            self.buffered.push_back(bytes);
        }
    }

    async fn send_command(&mut self, command: &RelayCommand) -> NetResult<()> {
        let bytes = encode_relay(command)?;
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| NetError::Relay(e.to_string()))
    }

    async fn recv_command(&mut self) -> NetResult<RelayCommand> {
        let bytes = self.recv_raw().await?;
        decode_command(&bytes).map_err(|e| NetError::Relay(e.to_string()))
    }

    async fn recv_raw(&mut self) -> NetResult<Vec<u8>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(NetError::TransportLost),
                Some(Ok(other)) => {
                    return Err(NetError::Relay(format!("unexpected message: {other:?}")))
                }
                Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| NetError::Transport(e.to_string()))
    }

    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        if let Some(buffered) = self.buffered.pop_front() {
            return Ok(buffered);
        }
        self.recv_raw().await
    }

    async fn close(&mut self) -> NetResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.sink.send(Message::Close(None)).await;
        Ok(())
    }

    fn into_split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        (
            Box::new(RelayReadHalf { stream: self.stream, buffered: self.buffered }),
            Box::new(RelayWriteHalf { sink: self.sink, closed: self.closed }),
        )
    }
}

/// Receiving half of a split [`RelayTransport`].
pub struct RelayReadHalf {
    stream: SplitStream<ClientWs>,
    buffered: VecDeque<Vec<u8>>,
}

/// Sending half of a split [`RelayTransport`].
pub struct RelayWriteHalf {
    sink: SplitSink<ClientWs, Message>,
    closed: bool,
}

#[async_trait]
impl TransportReader for RelayReadHalf {
    async fn recv_frame(&mut self) -> NetResult<Vec<u8>> {
        if let Some(buffered) = self.buffered.pop_front() {
            return Ok(buffered);
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(NetError::TransportLost),
                Some(Ok(other)) => {
                    return Err(NetError::Relay(format!("unexpected message: {other:?}")))
                }
                Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl TransportWriter for RelayWriteHalf {
    async fn send_frame(&mut self, bytes: Vec<u8>) -> NetResult<()> {
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| NetError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> NetResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.sink.send(Message::Close(None)).await;
        Ok(())
    }
}

// =============================================================================
// Relay service
// =============================================================================

struct Registrant {
    /// Outbound queue towards this client's socket.
    out: mpsc::Sender<Vec<u8>>,
    /// Forwarding destination once linked.
    peer: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
}

type Registry = Arc<Mutex<HashMap<PublicKey, Registrant>>>;

/// A relay service forwarding frames between registered clients.
pub struct RelayServer {
    listener: TcpListener,
    registry: Registry,
}

impl RelayServer {
    /// Bind the relay on an address, e.g. `127.0.0.1:0`.
    pub async fn bind(addr: &str) -> NetResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetError::Transport(format!("bind {addr}: {e}")))?;
        Ok(Self { listener, registry: Arc::new(Mutex::new(HashMap::new())) })
    }

    /// The `ws://` URL clients connect to.
    pub fn local_url(&self) -> NetResult<String> {
        let addr = self.listener.local_addr().map_err(|e| NetError::Transport(e.to_string()))?;
        Ok(format!("ws://{addr}"))
    }

    /// Accept and serve clients until the task is dropped.
    pub async fn run(self) {
        info!("relay accepting clients");
        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(socket, registry).await {
                            debug!(%peer, error = %e, "relay client ended");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "relay accept failed");
                    return;
                }
            }
        }
    }
}

async fn serve_client(socket: TcpStream, registry: Registry) -> NetResult<()> {
    let ws = accept_async(socket)
        .await
        .map_err(|e| NetError::Transport(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    // Registration and challenge, before anything is forwarded.
    let (public_key, sign_key) = match next_command(&mut stream).await? {
        RelayCommand::Register { public_key, sign_key } => (public_key, sign_key),
        other => return Err(NetError::Relay(format!("expected register, got {other:?}"))),
    };
    let challenge = hex_string(&random_token());
    send_binary(&mut sink, encode_relay(&RelayCommand::AuthenticationRequest {
        challenge: challenge.clone(),
    })?)
    .await?;
    match next_command(&mut stream).await? {
        RelayCommand::AuthenticationResponse { signature } => {
            verify(&sign_key, challenge.as_bytes(), &signature)
                .map_err(|_| NetError::Relay("challenge signature invalid".into()))?;
        }
        other => return Err(NetError::Relay(format!("expected signature, got {other:?}"))),
    }
    send_binary(&mut sink, encode_relay(&RelayCommand::AuthenticationSuccess)?).await?;

    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(64);
    let peer: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>> = Arc::new(Mutex::new(None));
    registry
        .lock()
        .expect("registry lock")
        .insert(public_key, Registrant { out: out_tx.clone(), peer: peer.clone() });
    debug!(key = %public_key, "relay client registered");

    // Writer half: everything queued for this client goes to its socket.
    let writer = tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if sink.send(Message::Binary(bytes)).await.is_err() {
                return;
            }
        }
    });

    // Reader half: link requests until linked, forwarding afterwards.
    let result = relay_loop(&mut stream, &registry, &out_tx, &peer).await;

    registry.lock().expect("registry lock").remove(&public_key);
    drop(out_tx);
    writer.abort();
    result
}

async fn relay_loop(
    stream: &mut SplitStream<WebSocketStream<TcpStream>>,
    registry: &Registry,
    own_out: &mpsc::Sender<Vec<u8>>,
    peer: &Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
) -> NetResult<()> {
    loop {
        let bytes = match stream.next().await {
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(_)) | None => return Ok(()),
            Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
        };

        let linked = peer.lock().expect("peer lock").clone();
        if let Some(destination) = linked {
            if destination.send(bytes).await.is_err() {
                return Err(NetError::TransportLost);
            }
            continue;
        }

        match decode_command::<RelayCommand>(&bytes) {
            Ok(RelayCommand::CommunicationRequest { target_public_key, .. }) => {
                let Some((target_out, target_peer)) = ({
                    let registry = registry.lock().expect("registry lock");
                    registry
                        .get(&target_public_key)
                        .map(|r| (r.out.clone(), r.peer.clone()))
                }) else {
                    return Err(NetError::Relay(format!(
                        "communication_request for unregistered key {target_public_key}"
                    )));
                };

                // Link both directions, then signal both sides.
                *peer.lock().expect("peer lock") = Some(target_out.clone());
                *target_peer.lock().expect("peer lock") = Some(own_out.clone());

                let ready = encode_relay(&RelayCommand::CommunicationReady)?;
                target_out.send(ready.clone()).await.map_err(|_| NetError::TransportLost)?;
                own_out.send(ready).await.map_err(|_| NetError::TransportLost)?;
                debug!(target = %target_public_key, "relay link established");
            }
            Ok(other) => {
                return Err(NetError::Relay(format!("unexpected command while unlinked: {other:?}")))
            }
            Err(_) => {
                return Err(NetError::Relay("frame before communication_ready".into()));
            }
        }
    }
}

async fn next_command(
    stream: &mut SplitStream<WebSocketStream<TcpStream>>,
) -> NetResult<RelayCommand> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(bytes))) => {
                return decode_command(&bytes).map_err(|e| NetError::Relay(e.to_string()))
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(_)) | None => return Err(NetError::TransportLost),
            Some(Err(e)) => return Err(NetError::Transport(e.to_string())),
        }
    }
}

async fn send_binary(
    sink: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    bytes: Vec<u8>,
) -> NetResult<()> {
    sink.send(Message::Binary(bytes)).await.map_err(|e| NetError::Transport(e.to_string()))
}
