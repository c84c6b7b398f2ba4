//! A thin WebSocket client for exercising a running `services/server`
//! instance end to end, generalized from `rt-test-utils`'s
//! `MockWsClient` (`tokio-tungstenite` connect + split sink/stream) from the
//! fixed forwarder/receiver protocol to the generic [`rs_protocol::Frame`]
//! wire format.

use futures_util::{SinkExt, StreamExt};
use rs_protocol::Frame;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct MockDuplexClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockDuplexClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Connects presenting a bearer session token, for exercising §4.8
    /// session recovery (S2: reconnect-with-token binds to the existing
    /// `clientId`).
    pub async fn connect_with_token(
        url: &str,
        token: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        use tokio_tungstenite::tungstenite::handshake::client::generate_key;
        use tokio_tungstenite::tungstenite::http::Request;
        let uri: tokio_tungstenite::tungstenite::http::Uri = url.parse()?;
        let host = uri.host().unwrap_or("localhost").to_owned();
        let host_header = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        let request = Request::builder()
            .uri(url)
            .header("Host", host_header)
            .header("Authorization", format!("Bearer {token}"))
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Encodes via [`rs_protocol::encode`] and sends as a binary frame —
    /// the same wire shape the server's read pump expects (a leading
    /// compression-flag byte, never raw JSON text).
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = rs_protocol::encode(frame, false)?;
        self.write.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    /// Reads the next binary frame and decodes it via [`rs_protocol::decode`],
    /// skipping transport-level ping/pong/text control frames rather than
    /// surfacing them as protocol frames. The server's write pump only ever
    /// emits `Message::Binary`.
    pub async fn recv_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    let frame = rs_protocol::decode(&bytes)?;
                    return Ok(frame);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
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
