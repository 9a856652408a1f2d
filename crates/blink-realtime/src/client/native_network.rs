use crate::error::{RealtimeError, Result};
use crate::traits::{Connector, Transport, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

/// Opens native WebSockets with `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Transport> {
        tracing::debug!("[Realtime] Opening {}", url);
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(map_handshake_error)?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, out_rx) = async_channel::unbounded::<String>();
        let (in_tx, in_rx) = async_channel::unbounded::<TransportEvent>();

        tokio::spawn(async move {
            while let Ok(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!("[Realtime] Write failed: {}", e);
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let closed = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx
                            .send(TransportEvent::Text(text.as_str().to_owned()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if in_tx.send(TransportEvent::Text(text)).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => tracing::warn!("[Realtime] Ignoring non-UTF-8 binary message"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_owned(),
                            },
                            None => TransportEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        }
                    }
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                }
            };
            let _ = in_tx.send(closed).await;
        });

        Ok(Transport {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// A 401/403 on the upgrade request is an authentication failure.
fn map_handshake_error(err: tungstenite::Error) -> RealtimeError {
    if let tungstenite::Error::Http(response) = &err {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return RealtimeError::Unauthenticated;
        }
    }
    RealtimeError::from(err)
}
