//! WebSocket read pump: hands inbound frames to the supervisor.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::clock::deadline_after;
use crate::transport::{EventCallback, TransportEvent};

/// Reads frames until the stream ends, errors, closes or is cancelled.
///
/// Text frames are delivered in arrival order through `on_event`. With a
/// `read_deadline`, any inbound frame (pongs included) pushes the deadline
/// forward; silence past it is treated as a dead connection.
pub(crate) async fn read_pump<S>(
    mut read: S,
    on_event: &EventCallback,
    write_tx: &mpsc::Sender<tungstenite::Message>,
    read_deadline: Option<Duration>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let wait = read_deadline.unwrap_or_default();
    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline, if read_deadline.is_some() => {
                warn!("read deadline elapsed, connection dead");
                on_event(TransportEvent::Error("read deadline elapsed".into()));
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(deadline_after(tokio::time::Instant::now(), wait));

                        match msg {
                            tungstenite::Message::Text(text) => {
                                on_event(TransportEvent::Frame(text.as_str().to_string()));
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break;
                            }
                            _ => debug!("ignoring non-text frame"),
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        on_event(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }
}
