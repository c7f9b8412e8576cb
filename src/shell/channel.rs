use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::error::TetherError;
use crate::event::{Dispatcher, Event};

/// Why the inbound read loop ended.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Disconnect {
    /// The peer closed or reset the connection.
    Peer,
    /// The session was cancelled locally.
    Cancelled,
}

/// Pump newline-delimited JSON events from the connection into the
/// dispatcher until the peer goes away or the session is cancelled.
///
/// A frame that fails to parse is logged and skipped; it never tears the
/// connection down.
pub(crate) async fn read_events(
    read_half: OwnedReadHalf,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
) -> Disconnect {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::Cancelled,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => {
                        trace!(event = %event.name, "Received event");
                        dispatcher.dispatch(event);
                    }
                    Err(e) => error!("Invalid event frame: {}", e),
                }
            }
            Ok(None) => return Disconnect::Peer,
            Err(e) if is_disconnect(&e) => return Disconnect::Peer,
            Err(e) => error!("Failed to read event frame: {}", e),
        }
    }
}

/// Encode an event and write it as one newline-terminated frame.
///
/// The connection lock is held for the whole write, so concurrent senders
/// never interleave frames.
pub(crate) async fn write_frame(
    conn: &Mutex<Option<OwnedWriteHalf>>,
    event: &Event,
) -> Result<(), TetherError> {
    let mut data = serde_json::to_vec(event)?;
    data.push(b'\n');

    let mut guard = conn.lock().await;
    let writer = guard.as_mut().ok_or(TetherError::NotConnected)?;
    writer.write_all(&data).await?;
    Ok(())
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
