//! A minimal WebSocket client speaking the hub's envelope protocol, used by
//! integration tests in place of a browser/SDK client.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;
use wire::Envelope;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct EnvelopeWsClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl EnvelopeWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = envelope.encode()?;
        self.write.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    /// Wait for the next decodable envelope, skipping ping/pong control
    /// frames.
    pub async fn recv(&mut self) -> Result<Envelope, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(Envelope::decode(&bytes)?),
                Some(Ok(Message::Text(text))) => return Ok(Envelope::decode(text.as_bytes())?),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
