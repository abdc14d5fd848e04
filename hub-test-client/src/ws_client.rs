use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub event_type: String,
    pub body: Value,
    pub received_at: Instant,
}

pub struct Connection {
    pub label: String,
    pub connection_id: String,
    writer: SplitSink<WsStream, Message>,
    event_rx: mpsc::UnboundedReceiver<Envelope>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Connect and wait for the hub's `connection` greeting, which carries our id.
    pub async fn establish(socket_url: &str, label: String, timeout: Duration) -> Result<Self> {
        let (stream, _response) = tokio_tungstenite::connect_async(socket_url)
            .await
            .with_context(|| format!("Failed to connect to {}", socket_url))?;
        let (writer, mut reader) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_label = label.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(body) => {
                            let envelope = Envelope {
                                event_type: body["type"].as_str().unwrap_or_default().to_string(),
                                body,
                                received_at: Instant::now(),
                            };
                            if tx.send(envelope).is_err() {
                                debug!("Receiver dropped for {}", reader_label);
                                break;
                            }
                        }
                        Err(e) => warn!("Unparseable envelope for {}: {}", reader_label, e),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Server closed socket for {}", reader_label);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Socket error for {}: {}", reader_label, e);
                        break;
                    }
                }
            }
        });

        let mut connection = Self {
            label,
            connection_id: String::new(),
            writer,
            event_rx: rx,
            _handle: handle,
        };

        let greeting = connection.wait_for_event("connection", timeout).await?;
        connection.connection_id = greeting.body["id"]
            .as_str()
            .context("No id in connection envelope")?
            .to_string();

        Ok(connection)
    }

    pub async fn send_json(&mut self, payload: &Value) -> Result<()> {
        self.writer
            .send(Message::text(payload.to_string()))
            .await
            .with_context(|| format!("Failed to send payload for {}", self.label))
    }

    pub async fn send_raw(&mut self, raw: &str) -> Result<()> {
        self.writer
            .send(Message::text(raw.to_string()))
            .await
            .with_context(|| format!("Failed to send raw frame for {}", self.label))
    }

    pub async fn wait_for_event(
        &mut self,
        event_type: &str,
        timeout: Duration,
    ) -> Result<Envelope> {
        self.wait_for(|envelope| envelope.event_type == event_type, timeout)
            .await
            .with_context(|| format!("{} waiting for event: {}", self.label, event_type))
    }

    /// Wait for an envelope of `event_type` whose `data` equals `payload`.
    pub async fn wait_for_payload(
        &mut self,
        event_type: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Envelope> {
        self.wait_for(
            |envelope| envelope.event_type == event_type && &envelope.body["data"] == payload,
            timeout,
        )
        .await
        .with_context(|| format!("{} waiting for {} carrying {}", self.label, event_type, payload))
    }

    /// Fail if any envelope at all arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.event_rx.recv()).await {
            Ok(Some(envelope)) => {
                anyhow::bail!("{} received unexpected {} envelope", self.label, envelope.event_type)
            }
            Ok(None) => anyhow::bail!("Socket closed for {}", self.label),
            Err(_) => Ok(()),
        }
    }

    /// Discard everything received so far.
    pub fn drain(&mut self) {
        while self.event_rx.try_recv().is_ok() {}
    }

    pub async fn close(mut self) -> Result<()> {
        self.writer
            .send(Message::Close(None))
            .await
            .with_context(|| format!("Failed to close socket for {}", self.label))
    }

    async fn wait_for<F>(&mut self, mut matches: F, timeout: Duration) -> Result<Envelope>
    where
        F: FnMut(&Envelope) -> bool,
    {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout");
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(envelope)) if matches(&envelope) => {
                    return Ok(envelope);
                }
                Ok(Some(_)) => {
                    // Not the one we want, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("Socket closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout");
                }
            }
        }
    }
}
