//! One client's streaming session.
//!
//! Two pumps run over the split WebSocket until either side gives up: the
//! writer polls the file on a fixed interval and pushes filtered lines,
//! the reader drains client frames purely to notice the disconnect. A
//! single-use cancellation token is the shared liveness signal: whichever
//! pump fails first cancels it, and the other winds down. The writer
//! checks it before every cycle rather than being interrupted, so its
//! termination latency is bounded by one poll interval.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use tailcast_tail::{FileCursor, FileReader, Patterns, PositionStore};

use crate::{FILE_POLL_INTERVAL, IDLE_BACKOFF, WRITE_WAIT};

/// Timing knobs for a session.
///
/// The defaults are the served behavior; tests shrink them to keep
/// real-time waits short.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub idle_backoff: Duration,
    pub write_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: FILE_POLL_INTERVAL,
            idle_backoff: IDLE_BACKOFF,
            write_wait: WRITE_WAIT,
        }
    }
}

/// Runs a streaming session to completion.
///
/// Returns when both pumps have exited — on client disconnect, client
/// error, or a failed push. The writer sends a close frame on its way out;
/// dropping the halves afterwards closes the socket exactly once.
pub async fn run(
    ws: WebSocketStream<TcpStream>,
    reader: FileReader,
    patterns: Arc<Patterns>,
    store: Arc<PositionStore>,
    client: String,
    start: FileCursor,
    config: SessionConfig,
) {
    let (write, read) = ws.split();
    let disconnected = CancellationToken::new();

    tracing::info!(client = %client, offset = start.offset, "streaming session started");

    tokio::join!(
        writer_pump(
            write,
            &reader,
            &patterns,
            &store,
            &client,
            start,
            &config,
            &disconnected,
        ),
        reader_pump(read, &client, &disconnected),
    );

    tracing::info!(client = %client, "streaming session ended");
}

/// Polls the file and pushes filtered lines to the client.
///
/// After every cycle — data, idle, or transient read error — the advanced
/// offset is written back to the position store so a reconnect from the
/// same identity resumes where this session left off.
#[allow(clippy::too_many_arguments)]
async fn writer_pump<S>(
    mut write: S,
    reader: &FileReader,
    patterns: &Patterns,
    store: &PositionStore,
    client: &str,
    mut cursor: FileCursor,
    config: &SessionConfig,
    disconnected: &CancellationToken,
) where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !disconnected.is_cancelled() {
        poll.tick().await;
        if disconnected.is_cancelled() {
            break;
        }

        let delta = match reader.read_if_modified(&cursor) {
            Ok((delta, next)) => {
                cursor = next;
                delta
            }
            Err(e) => {
                // Transient: the next tick retries with the same cursor.
                tracing::warn!(client, error = %e, "poll failed, no data this cycle");
                None
            }
        };

        match delta {
            Some(bytes) if !bytes.is_empty() => {
                for line in patterns.filter_lines(&bytes) {
                    let mut text = String::from_utf8_lossy(line).into_owned();
                    text.push('\n');
                    let sent = tokio::time::timeout(
                        config.write_wait,
                        write.send(Message::Text(text.into())),
                    )
                    .await;
                    match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::info!(client, error = %e, "push failed, closing session");
                            disconnected.cancel();
                            break;
                        }
                        Err(_) => {
                            tracing::info!(client, "push timed out, closing session");
                            disconnected.cancel();
                            break;
                        }
                    }
                }
            }
            _ => {
                // Nothing new: back off before resuming the regular ticks.
                tokio::time::sleep(config.idle_backoff).await;
            }
        }

        store.set(client, cursor.offset);
    }

    let _ = write.send(Message::Close(None)).await;
    tracing::debug!(client, "writer pump stopped");
}

/// Drains client frames until the connection dies.
///
/// There is no client-to-server command protocol: frames are logged and
/// dropped. Any read error, including a clean close, cancels the shared
/// token so the writer winds down on its next check; a writer-side cancel
/// wakes this pump out of its blocking receive.
async fn reader_pump<S>(mut read: S, client: &str, disconnected: &CancellationToken)
where
    S: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = disconnected.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(client, ?frame, "client sent close");
                        break;
                    }
                    Some(Ok(msg)) => {
                        tracing::debug!(client, len = msg.len(), "client frame ignored");
                    }
                    Some(Err(e)) => {
                        tracing::debug!(client, error = %e, "client read error");
                        break;
                    }
                    None => {
                        tracing::debug!(client, "client stream ended");
                        break;
                    }
                }
            }
        }
    }

    disconnected.cancel();
    tracing::debug!(client, "reader pump stopped");
}
