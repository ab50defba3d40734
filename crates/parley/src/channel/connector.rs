//! Opening realtime connections.

use std::future::Future;
use std::pin::Pin;

use futures::future::ready;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::error::{Error, Result};

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;
/// Incoming text frames. Ends when the peer closes the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open, bidirectional text-frame connection.
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Connection>> + Send + 'a>>;

/// Opens connections for a [`RealtimeChannel`](super::RealtimeChannel).
pub trait Connector: Send + Sync {
    fn connect(&self) -> ConnectFuture<'_>;
}

/// WebSocket connector. The auth token travels as a `token` query parameter.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    token: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }

    /// The URL to dial, with the token percent-encoded into the query.
    pub fn url(&self) -> Result<String> {
        let Some(token) = &self.token else {
            return Ok(self.url.clone());
        };
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| Error::config(format!("invalid realtime URL {}: {e}", self.url)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            let url = self.url()?;
            let (ws, _response) = connect_async(url.as_str()).await?;
            debug!("WebSocket connected to {}", self.url);
            let (sink, stream) = ws.split();

            let sink = sink
                .with(|text: String| ready(Ok::<_, tungstenite::Error>(Message::Text(text.into()))))
                .sink_map_err(Error::from);

            let stream = stream
                .take_while(|msg| ready(!matches!(msg, Ok(Message::Close(_)))))
                .filter_map(|msg| {
                    ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                        Ok(Message::Binary(bytes)) => Some(
                            String::from_utf8(bytes.to_vec())
                                .map_err(|e| Error::Decode(format!("non-UTF-8 frame: {e}"))),
                        ),
                        Ok(_) => None,
                        Err(e) => Some(Err(Error::from(e))),
                    })
                });

            Ok(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

/// In-memory connector for tests: each `connect` hands out the next queued
/// connection, then hangs once the queue is empty.
#[cfg(test)]
pub(crate) mod memory {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::channel::mpsc;

    use super::*;

    /// The test's end of one connection.
    pub struct Peer {
        /// Frames the channel sent.
        pub outbound: mpsc::UnboundedReceiver<String>,
        /// Push frames to the channel; drop to close the connection.
        pub inbound: mpsc::UnboundedSender<Result<String>>,
    }

    #[derive(Default)]
    pub struct MemoryConnector {
        queued: Mutex<VecDeque<Result<Connection>>>,
        pub connects: AtomicUsize,
    }

    impl MemoryConnector {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue one connection and return the test's end of it.
        pub fn queue(&self) -> Peer {
            let (out_tx, out_rx) = mpsc::unbounded::<String>();
            let (in_tx, in_rx) = mpsc::unbounded::<Result<String>>();
            let connection = Connection {
                sink: Box::pin(out_tx.sink_map_err(|e| Error::channel(e.to_string()))),
                stream: Box::pin(in_rx),
            };
            self.queued.lock().unwrap().push_back(Ok(connection));
            Peer {
                outbound: out_rx,
                inbound: in_tx,
            }
        }

        /// Queue one failed connection attempt.
        pub fn queue_failure(&self, reason: &str) {
            self.queued
                .lock()
                .unwrap()
                .push_back(Err(Error::channel(reason.to_string())));
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl Connector for MemoryConnector {
        fn connect(&self) -> ConnectFuture<'_> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self.queued.lock().unwrap().pop_front();
            Box::pin(async move {
                match next {
                    Some(result) => result,
                    None => futures::future::pending().await,
                }
            })
        }
    }
}
