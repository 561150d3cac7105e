//! WebSocket write pump: the only task that writes to the socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::{EventCallback, TransportEvent};

/// Why the write pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteExit {
    /// Local close or end of queue; a close frame went out.
    Closed,
    /// The socket rejected a frame.
    Failed,
}

/// Forwards queued frames to the socket in queue order.
///
/// Frames already queued when `cancel` fires are still flushed. A rejected
/// write is reported through `on_event` and cancels the handle, which stops
/// the read pump. Exactly one close frame is written on the way out.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    on_event: EventCallback,
    cancel: CancellationToken,
) -> WriteExit
where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let mut written: u64 = 0;
    loop {
        let frame = tokio::select! {
            biased;
            frame = queue.recv() => frame,
            _ = cancel.cancelled() => None,
        };
        let Some(frame) = frame else { break };

        let is_close = matches!(frame, Message::Close(_));
        if let Err(e) = sink.send(frame).await {
            warn!(written, error = %e, "chat frame write failed");
            on_event(TransportEvent::Error(format!("write failed: {e}")));
            cancel.cancel();
            return WriteExit::Failed;
        }
        written += 1;
        trace!(written, "frame written");

        if is_close {
            debug!(written, "close frame written");
            return WriteExit::Closed;
        }
    }

    debug!(written, "write pump stopping");
    let _ = sink.send(Message::Close(None)).await;
    WriteExit::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recording_sink(
        tx: mpsc::UnboundedSender<Message>,
    ) -> impl SinkExt<Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    fn broken_sink() -> impl SinkExt<Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold((), |(), _msg: Message| async move {
            Err::<(), _>(tungstenite::Error::ConnectionClosed)
        }))
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<TransportEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let cb: EventCallback = Arc::new(move |ev| s.lock().unwrap().push(ev));
        (cb, seen)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn cancel_sends_one_close_frame() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (cb, seen) = recorder();
        let cancel = CancellationToken::new();
        let (_queue_tx, queue_rx) = mpsc::channel(16);

        let c = cancel.clone();
        let handle =
            tokio::spawn(async move { write_pump(recording_sink(sink_tx), queue_rx, cb, c).await });

        cancel.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        assert_eq!(exit, WriteExit::Closed);
        let sent = drain(&mut sink_rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Message::Close(None)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_frames_flush_in_order_before_close() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (cb, _seen) = recorder();
        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(16);

        queue_tx.send(Message::Text("a".into())).await.unwrap();
        queue_tx.send(Message::Text("b".into())).await.unwrap();
        cancel.cancel();

        let exit = write_pump(recording_sink(sink_tx), queue_rx, cb, cancel).await;

        assert_eq!(exit, WriteExit::Closed);
        let sent = drain(&mut sink_rx);
        let texts: Vec<&str> = sent
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["a", "b"]);
        assert!(matches!(sent.last(), Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn queued_close_frame_is_not_doubled() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (cb, _seen) = recorder();
        let (queue_tx, queue_rx) = mpsc::channel(16);

        queue_tx.send(Message::Text("bye".into())).await.unwrap();
        queue_tx.send(Message::Close(None)).await.unwrap();

        let exit = write_pump(recording_sink(sink_tx), queue_rx, cb, CancellationToken::new()).await;

        assert_eq!(exit, WriteExit::Closed);
        let sent = drain(&mut sink_rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent.iter().filter(|m| matches!(m, Message::Close(_))).count(),
            1
        );
    }

    #[tokio::test]
    async fn rejected_write_reports_error_and_cancels() {
        let (cb, seen) = recorder();
        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(16);
        queue_tx.send(Message::Text("lost".into())).await.unwrap();

        let exit = write_pump(broken_sink(), queue_rx, cb, cancel.clone()).await;

        assert_eq!(exit, WriteExit::Failed);
        assert!(cancel.is_cancelled());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], TransportEvent::Error(e) if e.starts_with("write failed")));
    }
}
