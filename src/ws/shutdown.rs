//! Close handshake completion shared by the client and hub loops.
//!
//! tungstenite queues its reply to a peer's Close frame and only writes it
//! on the next flush or read. Dropping the socket right after seeing Close
//! resets the connection instead of closing it cleanly.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};

/// How long to wait for the peer to finish the close handshake.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Flushes any queued close reply, then reads until the peer hangs up.
///
/// Call this after a Close frame was received or sent. Frames still
/// arriving are discarded. Returns once the stream ends, errors, or
/// [`CLOSE_GRACE`] elapses.
pub async fn finish_close<S, R, M, E>(ws_tx: &mut S, ws_rx: &mut R)
where
    S: Sink<M> + Unpin,
    R: Stream<Item = Result<M, E>> + Unpin,
{
    let _ = ws_tx.flush().await;
    let drain = async { while let Some(Ok(_)) = ws_rx.next().await {} };
    if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
        tracing::debug!("peer did not finish close handshake in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};

    #[tokio::test]
    async fn returns_when_stream_ends() {
        let mut tx = sink::drain::<u8>();
        let mut rx = stream::iter(vec![Ok::<u8, ()>(1), Ok(2)]);
        let done = tokio::time::timeout(CLOSE_GRACE / 2, finish_close(&mut tx, &mut rx)).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn stops_at_first_error() {
        let mut tx = sink::drain::<u8>();
        let mut rx = stream::iter(vec![Err::<u8, ()>(()), Ok(1)]).chain(stream::pending());
        let done = tokio::time::timeout(CLOSE_GRACE / 2, finish_close(&mut tx, &mut rx)).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_grace_period() {
        let mut tx = sink::drain::<u8>();
        let mut rx = stream::pending::<Result<u8, ()>>();
        let started = tokio::time::Instant::now();
        finish_close(&mut tx, &mut rx).await;
        assert!(started.elapsed() >= CLOSE_GRACE);
    }
}
