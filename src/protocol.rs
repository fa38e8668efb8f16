// src/protocol.rs
//! Framed I/O helpers and the per-connection batch protocol.
//!
//! The wire protocol per connection is a sequence of batch messages followed
//! by one trailer:
//!
//! ```text
//! Batch:   [u16 big-endian payload length][payload: concatenated bet records]
//! Ack:     7 ASCII bytes "success", one per stored batch
//! Trailer: a zero-length batch, then [u16 big-endian agency id]
//! ```
//!
//! [`read_exactly`] and [`write_exactly`] are generic over the tokio I/O
//! traits so the state machine runs identically against a `TcpStream` and an
//! in-memory `tokio::io::duplex` pipe in tests.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::bet::{Bet, DecodeError};
use crate::metrics::Metrics;
use crate::store::Store;

/// Per-batch acknowledgement token.
pub const ACK: &[u8; 7] = b"success";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("batch declared {declared} payload bytes but only {got} arrived")]
    TruncatedBatch { declared: usize, got: usize },
    #[error("batch payload does not decode cleanly: {0}")]
    BadBatch(#[from] DecodeError),
    #[error("short write: wrote {wrote} of {expected} bytes")]
    ShortWrite { expected: usize, wrote: usize },
    #[error("expected 2-byte agency id, got {got} bytes")]
    MissingAgencyId { got: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("store append failed: {0}")]
    Store(#[source] anyhow::Error),
}

/// Read until `buf` is full, an error occurs, or the stream ends.
///
/// Returns the number of bytes actually read; a count below `buf.len()` means
/// end-of-stream, which the caller must treat as a short read.
pub async fn read_exactly<R>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Write all of `buf`, retrying partial writes.
///
/// Returns the number of bytes actually written; a count below `buf.len()`
/// only occurs if the sink stops accepting bytes without erroring.
pub async fn write_exactly<W>(w: &mut W, buf: &[u8]) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        let n = w.write(&buf[written..]).await?;
        if n == 0 {
            break;
        }
        written += n;
    }
    Ok(written)
}

/// Run the batch phase of one agency connection.
///
/// Loops `header -> payload -> decode -> persist -> ack` until the client
/// sends a zero-length batch, then reads the 2-byte agency id trailer and
/// returns it. Any short read/write, truncated batch, undecodable payload, or
/// transport error fails the connection; nothing at this layer retries beyond
/// the byte-level loops above.
///
/// A short ack write aborts the connection rather than continuing: the client
/// cannot tell a lost ack from a lost batch, so carrying on would leave the
/// two sides disagreeing about what was stored.
pub async fn run_batch_phase<S>(
    conn: &mut S,
    store: &Store,
    metrics: &Metrics,
) -> Result<u16, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let mut header = [0u8; 2];
        let n = read_exactly(conn, &mut header).await?;
        if n < header.len() {
            return Err(ProtocolError::ShortRead {
                expected: header.len(),
                got: n,
            });
        }

        let declared = u16::from_be_bytes(header) as usize;
        if declared == 0 {
            break;
        }

        let mut payload = vec![0u8; declared];
        let n = read_exactly(conn, &mut payload).await?;
        if n < declared {
            return Err(ProtocolError::TruncatedBatch { declared, got: n });
        }

        let mut bets = Vec::new();
        let mut consumed = 0;
        while consumed < payload.len() {
            // A truncated record inside a fully received payload can never be
            // completed, so Incomplete is just as fatal as Malformed here.
            let (bet, len) = Bet::decode(&payload[consumed..])?;
            bets.push(bet);
            consumed += len;
        }
        debug!("batch: {} bets in {} bytes", bets.len(), declared);

        store.append(&bets).await.map_err(ProtocolError::Store)?;
        metrics.add_bets(bets.len() as u64);
        metrics.inc_batches();

        let wrote = write_exactly(conn, ACK).await?;
        if wrote < ACK.len() {
            return Err(ProtocolError::ShortWrite {
                expected: ACK.len(),
                wrote,
            });
        }
    }

    let mut trailer = [0u8; 2];
    let n = read_exactly(conn, &mut trailer).await?;
    if n < trailer.len() {
        return Err(ProtocolError::MissingAgencyId { got: n });
    }
    Ok(u16::from_be_bytes(trailer))
}
