//! WebSocket patch source
//!
//! The live push channel: connects to the server's patch feed and decodes
//! each frame as one patch batch (JSON, text or binary frames). Transport
//! failures terminate the stream with an error; a server-initiated close
//! ends it quietly. Reconnection is the sync client caller's decision, not
//! this adapter's.

use futures_util::stream::{self, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::source::{Source, SourceError, SourceStream};
use crate::patch::PatchBatch;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Patch source backed by a WebSocket feed
pub struct WebSocketSource {
    url: String,
}

enum FeedState {
    Connect(String),
    Open(WsStream),
    Done,
}

impl WebSocketSource {
    /// Create a source for the feed at `url` (ws:// or wss://)
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The configured feed URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Source for WebSocketSource {
    fn subscribe(&self) -> SourceStream {
        // Connection label for correlating log lines across one subscription
        let conn = format!("conn-{}", &Uuid::new_v4().to_string()[..8]);
        let url = self.url.clone();

        Box::pin(stream::unfold(
            FeedState::Connect(url),
            move |mut state| {
                let conn = conn.clone();
                async move {
                    loop {
                        match state {
                            FeedState::Connect(url) => {
                                debug!(conn = %conn, url = %url, "connecting to patch feed");
                                match connect_async(&url).await {
                                    Ok((ws, _response)) => {
                                        info!(conn = %conn, "connected to patch feed");
                                        state = FeedState::Open(ws);
                                    }
                                    Err(e) => {
                                        return Some((
                                            Err(SourceError::Transport(format!(
                                                "failed to connect to {}: {}",
                                                url, e
                                            ))),
                                            FeedState::Done,
                                        ));
                                    }
                                }
                            }
                            FeedState::Open(mut ws) => match ws.next().await {
                                Some(Ok(Message::Text(text))) => {
                                    return Some(match decode(text.as_bytes()) {
                                        Ok(batch) => (Ok(batch), FeedState::Open(ws)),
                                        Err(e) => (Err(e), FeedState::Done),
                                    });
                                }
                                Some(Ok(Message::Binary(data))) => {
                                    return Some(match decode(&data) {
                                        Ok(batch) => (Ok(batch), FeedState::Open(ws)),
                                        Err(e) => (Err(e), FeedState::Done),
                                    });
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!(conn = %conn, "patch feed closed by server");
                                    return None;
                                }
                                Some(Ok(_)) => {
                                    // ping/pong chatter
                                    state = FeedState::Open(ws);
                                }
                                Some(Err(e)) => {
                                    return Some((
                                        Err(SourceError::Transport(e.to_string())),
                                        FeedState::Done,
                                    ));
                                }
                            },
                            FeedState::Done => return None,
                        }
                    }
                }
            },
        ))
    }
}

fn decode(data: &[u8]) -> Result<PatchBatch, SourceError> {
    serde_json::from_slice(data).map_err(|e| SourceError::Decode(e.to_string()))
}
