//! [`Transport`] implementation backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};

use super::config::CloseHandler;
use super::error::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, TransportError};
use super::frame::{Frame, MessageKind};
use super::traits::{DialRequest, FrameSink, FrameStream, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials real WebSocket endpoints over TCP, with TLS for `wss://` URLs.
#[non_exhaustive]
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    type Sink = TungsteniteSink;
    type Stream = TungsteniteStream;

    async fn dial(
        &self,
        request: &DialRequest,
    ) -> Result<(Self::Sink, Self::Stream), TransportError> {
        let connector = request.tls.clone().map(Connector::Rustls);
        let (ws_stream, _) =
            connect_async_tls_with_config(request.url.as_str(), None, false, connector).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %request.url, "WebSocket handshake completed");

        let (write, read) = ws_stream.split();
        Ok((
            TungsteniteSink { write },
            TungsteniteStream {
                read,
                close_handler: request.close_handler.clone(),
            },
        ))
    }
}

pub struct TungsteniteSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame.kind {
            MessageKind::Text => {
                let text = String::from_utf8(frame.payload).map_err(TransportError::other)?;
                Message::text(text)
            }
            MessageKind::Binary => Message::binary(frame.payload),
        };
        self.write.send(message).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write.close().await?;
        Ok(())
    }
}

pub struct TungsteniteStream {
    read: SplitStream<WsStream>,
    close_handler: Option<CloseHandler>,
}

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn receive_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::text(text.as_str())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Frame::binary(bytes.to_vec())),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                    DialRequest::notify_close(self.close_handler.as_ref(), code, &reason);
                    return Err(TransportError::closed(code, reason));
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite; raw frames never surface on read.
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::closed(CLOSE_ABNORMAL, "stream ended")),
            }
        }
    }
}
