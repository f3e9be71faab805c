//! Voice WebSocket client: connects, frames JSON, and classifies closes.

pub mod heartbeat;

use crate::{
    constants::VOICE_GATEWAY_VERSION,
    error::{Error, Result},
    model::{CloseCode, Event},
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream,
    WebSocketStream,
};
use tracing::debug;
use url::Url;

/// The underlying TLS-capable WebSocket stream type backing [`GatewayClient`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected voice gateway WebSocket, framing JSON voice-gateway events.
pub struct GatewayClient {
    stream: WsStream,
}

impl GatewayClient {
    /// Dials `wss://{endpoint}?v=8` and returns once the TLS/WS handshake completes.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let url = build_url(endpoint)?;
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Sends one control-plane event as a text frame.
    pub async fn send(&mut self, event: &Event) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Awaits the next event, paired with the frame's `s` (control
    /// sequence) field when present. Resolves to `Ok(None)` on ping/pong
    /// frames, which tungstenite answers internally and which carry no
    /// event.
    pub async fn recv(&mut self) -> Result<Option<(Event, Option<u64>)>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(payload))) => {
                let value: serde_json::Value = serde_json::from_str(&payload).map_err(|e| {
                    debug!(%payload, "unparsable voice gateway frame");
                    e
                })?;
                let seq = value.get("s").and_then(serde_json::Value::as_u64);
                let event = serde_json::from_value(value)?;
                Ok(Some((event, seq)))
            },
            Some(Ok(Message::Binary(_))) => {
                Err(Error::Protocol("voice gateway does not send binary frames"))
            },
            Some(Ok(Message::Close(Some(frame)))) => {
                let code = CloseCode::from_u16(u16::from(frame.code));
                Err(Error::RemoteClose(code, Some(frame.reason.to_string())))
            },
            Some(Ok(Message::Close(None))) => {
                Err(Error::RemoteClose(CloseCode::Other(1000), None))
            },
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::RemoteClose(CloseCode::Other(1000), None)),
        }
    }
}

fn build_url(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim_end_matches(":443").trim_end_matches('/');
    Url::parse(&format!("wss://{trimmed}/?v={VOICE_GATEWAY_VERSION}"))
        .map_err(|_| Error::EndpointUrl)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_versioned_url() {
        let url = build_url("voice.example.com:443").unwrap();
        assert_eq!(url.as_str(), "wss://voice.example.com/?v=8");
    }

    #[test]
    fn strips_trailing_slash_and_port() {
        let url = build_url("voice.example.com:443/").unwrap();
        assert_eq!(url.as_str(), "wss://voice.example.com/?v=8");
    }
}
