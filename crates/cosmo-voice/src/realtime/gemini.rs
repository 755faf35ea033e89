//! Gemini Live transport over `tokio-tungstenite`.

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{
    ClientMessage, LiveConfig, Outbound, RealtimeLink, RealtimeTransport, ServerEvent,
    parse_server_message,
};
use crate::error::VoiceError;

/// Public BidiGenerateContent endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens live sessions against the Gemini API.
#[derive(Clone)]
pub struct GeminiLiveTransport {
    api_key: String,
    endpoint: String,
}

impl GeminiLiveTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Point at a different WebSocket endpoint (proxies, local fakes).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{separator}key={}", self.endpoint, self.api_key)
    }
}

impl fmt::Debug for GeminiLiveTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiLiveTransport")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl RealtimeTransport for GeminiLiveTransport {
    async fn connect(&self, config: &LiveConfig) -> Result<RealtimeLink, VoiceError> {
        tracing::debug!(endpoint = %self.endpoint, model = %config.model, "Connecting realtime session");

        let (mut ws, _response) = connect_async(self.url())
            .await
            .map_err(|e| VoiceError::ConnectError(e.to_string()))?;

        let setup = ClientMessage::setup(config).to_json()?;
        ws.send(Message::Text(setup))
            .await
            .map_err(|e| VoiceError::ConnectError(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(ws, outbound_rx, events_tx));

        Ok(RealtimeLink {
            outbound: outbound_tx,
            events: events_rx,
        })
    }
}

/// Pump one socket until it closes or the link is dropped.
async fn drive(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut outbound_open = true;

    loop {
        tokio::select! {
            request = outbound.recv(), if outbound_open => match request {
                Some(Outbound::Media(blob)) => {
                    let json = match ClientMessage::media(blob).to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping unencodable media chunk");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        let _ = events.send(ServerEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) => {
                    tracing::debug!("Closing realtime session");
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Close handshake failed");
                    }
                    // Keep reading until the server answers the close.
                    outbound_open = false;
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },

            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => dispatch(&text),
                        Err(_) => {
                            tracing::debug!("Ignoring non-UTF-8 binary frame");
                            None
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                            .unwrap_or_default();
                        let _ = events.send(ServerEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        let _ = events.send(ServerEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = events.send(ServerEvent::Closed {
                            code: None,
                            reason: String::new(),
                        });
                        break;
                    }
                };

                if let Some(event) = event {
                    if events.send(event).is_err() {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("Realtime driver stopped");
}

fn dispatch(raw: &str) -> Option<ServerEvent> {
    match parse_server_message(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed server message");
            None
        }
    }
}
