//! Browser channel over WebSocket.
//!
//! An acceptor thread hands connected browsers to a shared client list; a
//! reader thread polls them (non-blocking) for capability announcements and
//! apply verdicts.
//!
//! ```text
//! hub → client  {"type":"connected"}
//! client → hub  {"type":"capabilities","capabilities":"Baseline ..."}
//! hub → client  {"type":"applyUpdates","id":3,"updates":[...]}
//! client → hub  {"type":"applied","id":3,"success":true}
//! hub → client  {"type":"refreshAsset","url":"/css/site.css"}
//! ```

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::DeltaChannel;
use crate::core::{CapabilitySet, UpdateRecord};
use crate::error::TransportError;
use crate::handlers::BrowserRefresh;

const NAME: &str = "browser";

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const VERDICT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum HubMessage {
    Connected,
    ApplyUpdates { id: u64, updates: Vec<UpdateRecord> },
    RefreshAsset { url: String },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ClientMessage {
    Capabilities { capabilities: String },
    Applied { id: u64, success: bool },
}

struct BrowserClient {
    ws: WebSocket<TcpStream>,
    capabilities: Option<CapabilitySet>,
}

type Pending = Arc<Mutex<FxHashMap<u64, oneshot::Sender<bool>>>>;

/// WebSocket server shared by every connected browser.
pub struct BrowserHub {
    port: u16,
    clients: Arc<Mutex<Vec<BrowserClient>>>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl BrowserHub {
    /// Bind near `base_port` and start the acceptor and reader threads.
    pub fn start(base_port: u16) -> Result<Arc<Self>> {
        let (listener, port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let hub = Arc::new(Self {
            port,
            clients: Arc::new(Mutex::new(Vec::new())),
            pending: Arc::new(Mutex::new(FxHashMap::default())),
            next_id: AtomicU64::new(1),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let clients = Arc::clone(&hub.clients);
        let closed = Arc::clone(&hub.closed);
        std::thread::spawn(move || accept_loop(listener, clients, closed));

        let clients = Arc::clone(&hub.clients);
        let pending = Arc::clone(&hub.pending);
        let closed = Arc::clone(&hub.closed);
        std::thread::spawn(move || reader_loop(clients, pending, closed));

        crate::debug!("browser"; "listening on ws://127.0.0.1:{}", port);
        Ok(hub)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop both threads and disconnect every browser.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut clients = self.clients.lock();
        for client in clients.iter_mut() {
            let _ = client.ws.close(None);
            let _ = client.ws.flush();
        }
        clients.clear();
        self.pending.lock().clear();
    }

    /// Send to every client, dropping the ones that fail. Returns how many
    /// clients received it.
    fn broadcast(&self, message: &HubMessage) -> Result<usize, TransportError> {
        let text = serde_json::to_string(message)?;
        let mut clients = self.clients.lock();
        clients.retain_mut(|client| match client.ws.send(Message::Text(text.clone().into())) {
            Ok(()) => true,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                true
            }
            Err(e) => {
                crate::debug!("browser"; "dropping client: {}", e);
                false
            }
        });
        Ok(clients.len())
    }
}

#[async_trait]
impl DeltaChannel for BrowserHub {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn connect(&self, _cancel: &CancellationToken) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed(NAME))
        } else {
            Ok(())
        }
    }

    /// Waits until a browser announces its capabilities.
    async fn capabilities(&self) -> Result<CapabilitySet, TransportError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed(NAME));
            }
            let announced = self
                .clients
                .lock()
                .iter()
                .find_map(|client| client.capabilities.clone());
            if let Some(capabilities) = announced {
                return Ok(capabilities);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Broadcast the batch and answer with the first verdict received.
    async fn apply(&self, updates: &[UpdateRecord]) -> Result<bool, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(NAME));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let message = HubMessage::ApplyUpdates {
            id,
            updates: updates.to_vec(),
        };
        let delivered = match self.broadcast(&message) {
            Ok(delivered) => delivered,
            Err(err) => {
                self.pending.lock().remove(&id);
                return Err(err);
            }
        };
        if delivered == 0 {
            self.pending.lock().remove(&id);
            crate::debug!("browser"; "no connected browsers");
            return Ok(false);
        }

        let verdict = tokio::time::timeout(VERDICT_TIMEOUT, rx).await;
        self.pending.lock().remove(&id);
        match verdict {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) => Err(TransportError::Closed(NAME)),
            Err(_) => Err(TransportError::Protocol(format!(
                "no browser acknowledged update {id} within {}s",
                VERDICT_TIMEOUT.as_secs()
            ))),
        }
    }
}

impl BrowserRefresh for BrowserHub {
    fn refresh_asset(&self, url: &str) {
        let message = HubMessage::RefreshAsset {
            url: url.to_string(),
        };
        match self.broadcast(&message) {
            Ok(n) => crate::debug!("browser"; "refresh {} sent to {} client(s)", url, n),
            Err(e) => crate::debug!("browser"; "refresh {} failed: {}", url, e),
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    clients: Arc<Mutex<Vec<BrowserClient>>>,
    closed: Arc<AtomicBool>,
) {
    while !closed.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                crate::debug!("browser"; "client connected: {}", addr);
                // Blocking during the handshake, non-blocking afterwards.
                let _ = stream.set_nonblocking(false);
                match tungstenite::accept(stream) {
                    Ok(mut ws) => {
                        let hello = serde_json::to_string(&HubMessage::Connected)
                            .unwrap_or_default();
                        if ws.send(Message::Text(hello.into())).is_err() {
                            continue;
                        }
                        let _ = ws.get_ref().set_nonblocking(true);
                        clients.lock().push(BrowserClient {
                            ws,
                            capabilities: None,
                        });
                    }
                    Err(e) => crate::debug!("browser"; "handshake failed: {}", e),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                crate::debug!("browser"; "accept error: {}", e);
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn reader_loop(clients: Arc<Mutex<Vec<BrowserClient>>>, pending: Pending, closed: Arc<AtomicBool>) {
    while !closed.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);

        let mut clients = clients.lock();
        let mut disconnected = Vec::new();

        for (i, client) in clients.iter_mut().enumerate() {
            let _ = client.ws.flush();
            loop {
                match client.ws.read() {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Capabilities { capabilities }) => {
                            client.capabilities = Some(CapabilitySet::parse(&capabilities));
                        }
                        Ok(ClientMessage::Applied { id, success }) => {
                            if let Some(tx) = pending.lock().remove(&id) {
                                let _ = tx.send(success);
                            }
                        }
                        Err(e) => crate::debug!("browser"; "ignoring message: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        disconnected.push(i);
                        break;
                    }
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        break;
                    }
                    Err(_) => {
                        disconnected.push(i);
                        break;
                    }
                }
            }
        }

        for i in disconnected.into_iter().rev() {
            clients.remove(i);
        }
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(format!("127.0.0.1:{port}")) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind WebSocket server after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
