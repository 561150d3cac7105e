//! In-memory sockets for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::transport::{ConnectFuture, Connector, FrameSink, FrameStream};

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Plan {
    Accept,
    AcceptAfter(Duration),
    Hang,
    Refuse,
}

/// Server side of one accepted in-memory socket.
pub(crate) struct MockPeer {
    outbound: mpsc::UnboundedReceiver<tungstenite::Message>,
    inbound: mpsc::UnboundedSender<Result<tungstenite::Message, tungstenite::Error>>,
}

impl MockPeer {
    pub(crate) fn push_text(&self, text: &str) {
        let _ = self
            .inbound
            .send(Ok(tungstenite::Message::Text(text.into())));
    }

    /// Next text frame the client wrote, skipping pings and closes.
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
                .await
                .ok()??;
            if let tungstenite::Message::Text(t) = msg {
                return Some(t.as_str().to_string());
            }
        }
    }

    /// Text frames already written, without waiting.
    pub(crate) fn drain_texts(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            if let tungstenite::Message::Text(t) = msg {
                texts.push(t.as_str().to_string());
            }
        }
        texts
    }
}

/// Connector following a queue of [`Plan`]s, then a fallback plan.
pub(crate) struct MockConnector {
    plans: Mutex<VecDeque<Plan>>,
    fallback: Plan,
    urls: Mutex<Vec<String>>,
    peers: Mutex<Vec<Option<MockPeer>>>,
}

impl MockConnector {
    pub(crate) fn new(fallback: Plan) -> Self {
        Self::with_plans([], fallback)
    }

    pub(crate) fn with_plans(plans: impl IntoIterator<Item = Plan>, fallback: Plan) -> Self {
        Self {
            plans: Mutex::new(plans.into_iter().collect()),
            fallback,
            urls: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn accepted(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Borrows accepted peer `idx` for a quick push.
    pub(crate) fn peer(&self, idx: usize) -> PeerRef<'_> {
        PeerRef {
            connector: self,
            idx,
        }
    }

    pub(crate) fn take_peer(&self, idx: usize) -> MockPeer {
        self.peers.lock().unwrap()[idx]
            .take()
            .expect("peer already taken")
    }

    fn accept(&self) -> (FrameSink, FrameStream) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(Some(MockPeer {
            outbound: out_rx,
            inbound: in_tx,
        }));

        let sink = sink::unfold(
            out_tx,
            |tx: mpsc::UnboundedSender<tungstenite::Message>, msg: tungstenite::Message| async move {
                tx.send(msg)
                    .map_err(|_| tungstenite::Error::ConnectionClosed)?;
                Ok::<_, tungstenite::Error>(tx)
            },
        );
        let stream = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        (Box::pin(sink) as FrameSink, Box::pin(stream) as FrameStream)
    }
}

pub(crate) struct PeerRef<'a> {
    connector: &'a MockConnector,
    idx: usize,
}

impl PeerRef<'_> {
    pub(crate) fn push_text(&self, text: &str) {
        let peers = self.connector.peers.lock().unwrap();
        if let Some(peer) = peers[self.idx].as_ref() {
            peer.push_text(text);
        }
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, url: &'a str) -> ConnectFuture<'a> {
        self.urls.lock().unwrap().push(url.to_string());
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match plan {
            Plan::Accept => {
                let pair = self.accept();
                Box::pin(async move { Ok(pair) })
            }
            Plan::AcceptAfter(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(self.accept())
            }),
            Plan::Hang => Box::pin(futures_util::future::pending()),
            Plan::Refuse => Box::pin(async { Err(tungstenite::Error::ConnectionClosed) }),
        }
    }
}
