// WebSocket subscription client: reads envelope frames from a relay and
// republishes them onto a local bounded buffer for the application.
use futures_util::StreamExt;
use relay_wire::Envelope;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("dialing {url}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("reading from remote")]
    Read(#[source] tungstenite::Error),
    #[error("received non-text frame: {kind}")]
    NonTextFrame { kind: &'static str },
    #[error("decoding remote envelope")]
    Decode(#[from] relay_wire::Error),
    #[error("remote closed the connection with status {code}")]
    AbnormalClose { code: u16 },
    #[error("cancelled while waiting for a frame")]
    Cancelled,
    #[error("cancelled before a received envelope could be buffered")]
    CancelledBeforeDelivery,
}

/// Handle for one subscription connection.
///
/// [`Subscription::connect`] returns the handle plus the read end of the
/// local buffer. The buffer is the application's view of the stream: it is
/// filled by [`Subscription::receive`] and closed exactly once when that
/// call returns. A new `connect` is required to resubscribe.
#[derive(Debug)]
pub struct Subscription {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    buffer: mpsc::Sender<Envelope>,
}

impl Subscription {
    /// Dials the remote subscribe endpoint.
    pub async fn connect(
        url: &str,
        buffer_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<Envelope>)> {
        let (stream, _response) =
            connect_async(url).await.map_err(|source| ClientError::Connect {
                url: url.to_string(),
                source,
            })?;
        // tokio channels require capacity >= 1.
        let (tx, rx) = mpsc::channel(buffer_capacity.max(1));
        Ok((Self { stream, buffer: tx }, rx))
    }

    /// Runs the receive loop until the remote closes, an error occurs, or
    /// the token is cancelled.
    ///
    /// Consumes the handle: the connection is torn down when this returns,
    /// so the loop runs exactly once per subscription. Unlike the server's
    /// fan-out, enqueueing into the local buffer may block until the
    /// application drains it; a single producer and one buffer make
    /// backpressure safe here, and no client-observed message is dropped.
    pub async fn receive(mut self, cancel: CancellationToken) -> Result<()> {
        let result = self.run(&cancel).await;
        // Close with a "client closing" status on every exit path. The
        // peer may already be gone, so closing is best-effort.
        let close = CloseFrame {
            code: CloseCode::Normal,
            reason: "client closing".into(),
        };
        if let Err(err) = self.stream.close(Some(close)).await {
            tracing::debug!(error = %err, "websocket close failed");
        }
        // Dropping `self.buffer` here closes the local buffer exactly once.
        result
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => return Err(ClientError::Cancelled),
                message = self.stream.next() => message,
            };
            let message = match message {
                None => return Ok(()),
                Some(Ok(message)) => message,
                // The close handshake already completed; not a failure.
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(()),
                Some(Err(err)) => return Err(ClientError::Read(err)),
            };
            match message {
                Message::Text(text) => {
                    let envelope = Envelope::from_json(text.as_str())?;
                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(ClientError::CancelledBeforeDelivery);
                        }
                        sent = self.buffer.send(envelope) => {
                            if sent.is_err() {
                                // Application dropped its receiver; nothing
                                // left to deliver to.
                                return Ok(());
                            }
                        }
                    }
                }
                Message::Close(frame) => {
                    return match frame {
                        Some(frame) if frame.code != CloseCode::Normal => {
                            Err(ClientError::AbnormalClose {
                                code: frame.code.into(),
                            })
                        }
                        _ => Ok(()),
                    };
                }
                // Control frames are answered by tungstenite internally.
                Message::Ping(_) | Message::Pong(_) => {}
                other => {
                    return Err(ClientError::NonTextFrame {
                        kind: frame_kind(&other),
                    });
                }
            }
        }
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw",
    }
}
