//! In-process agent channel.
//!
//! Newline-delimited JSON over TCP. One request, one response line:
//!
//! ```text
//! → {"type":"capabilities"}
//! ← {"capabilities":"Baseline AddMethodToExistingType"}
//! → {"type":"apply","updates":[...]}
//! ← {"applied":true}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::DeltaChannel;
use crate::core::{CapabilitySet, UpdateRecord};
use crate::error::TransportError;

const NAME: &str = "agent";
const CONNECT_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum AgentRequest<'a> {
    Capabilities,
    Apply { updates: &'a [UpdateRecord] },
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// TCP client for the agent loaded into the running application.
pub struct AgentClient {
    addr: String,
    connect_timeout: Duration,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

/// One request/response exchange. Unless it completes, the connection is
/// dropped so a late reply can never answer the next request.
struct Exchange<'a> {
    conn: MutexGuard<'a, Option<BufReader<TcpStream>>>,
    completed: bool,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.completed && self.conn.take().is_some() {
            crate::debug!("agent"; "dropping connection after an interrupted request");
        }
    }
}

impl AgentClient {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Shut the connection down. A later request reconnects.
    pub async fn close(&self) {
        if let Some(mut conn) = self.conn.lock().await.take() {
            let _ = conn.get_mut().shutdown().await;
        }
    }

    /// Retries until the agent listens, the timeout elapses or `cancel` fires.
    async fn open(&self, cancel: &CancellationToken) -> Result<BufReader<TcpStream>, TransportError> {
        let deadline = tokio::time::Instant::now() + self.connect_timeout;
        let stream = loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Closed(NAME)),
                attempt = TcpStream::connect(&self.addr) => attempt,
            };
            match attempt {
                Ok(stream) => break stream,
                Err(err) if tokio::time::Instant::now() >= deadline => return Err(err.into()),
                Err(_) => tokio::time::sleep(CONNECT_RETRY).await,
            }
        };
        stream.set_nodelay(true)?;
        crate::debug!("agent"; "connected to {}", self.addr);
        Ok(BufReader::new(stream))
    }

    async fn request(&self, request: &AgentRequest<'_>) -> Result<AgentResponse, TransportError> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let mut exchange = Exchange {
            conn: self.conn.lock().await,
            completed: false,
        };
        if exchange.conn.is_none() {
            *exchange.conn = Some(self.open(&CancellationToken::new()).await?);
        }
        let conn = exchange.conn.as_mut().ok_or(TransportError::NotConnected(NAME))?;

        let result = async {
            conn.get_mut().write_all(&line).await?;
            conn.get_mut().flush().await?;
            let mut reply = String::new();
            if conn.read_line(&mut reply).await? == 0 {
                return Err(TransportError::Closed(NAME));
            }
            Ok(serde_json::from_str::<AgentResponse>(&reply)?)
        }
        .await;

        // A broken stream is never reused.
        exchange.completed = !matches!(result, Err(TransportError::Io(_) | TransportError::Closed(_)));
        result
    }
}

#[async_trait]
impl DeltaChannel for AgentClient {
    fn name(&self) -> &'static str {
        NAME
    }

    /// Reuses a live connection; appliers of every backend share it.
    async fn connect(&self, cancel: &CancellationToken) -> Result<(), TransportError> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(self.open(cancel).await?);
        }
        Ok(())
    }

    async fn capabilities(&self) -> Result<CapabilitySet, TransportError> {
        let response = self.request(&AgentRequest::Capabilities).await?;
        if let Some(error) = response.error {
            return Err(TransportError::Protocol(error));
        }
        response
            .capabilities
            .map(|caps| CapabilitySet::parse(&caps))
            .ok_or_else(|| TransportError::Protocol("missing `capabilities` in reply".into()))
    }

    async fn apply(&self, updates: &[UpdateRecord]) -> Result<bool, TransportError> {
        let response = self.request(&AgentRequest::Apply { updates }).await?;
        if let Some(error) = &response.error {
            crate::debug!("agent"; "update rejected: {}", error);
        }
        response
            .applied
            .ok_or_else(|| TransportError::Protocol("missing `applied` in reply".into()))
    }
}
