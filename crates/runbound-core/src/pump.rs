//! Child output forwarding

use runbound_api::StreamKind;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const PUMP_BUFFER: usize = 8 * 1024;

/// Forward everything `reader` produces to `writer`, verbatim and in order.
///
/// Each chunk is whatever the pipe has available (so a prompt without a
/// trailing newline is not held back) and is flushed before the next read.
/// Returns the number of bytes forwarded once `reader` reaches EOF.
pub async fn forward_stream<R, W>(reader: R, mut writer: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::with_capacity(PUMP_BUFFER, reader);
    let mut total = 0u64;

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        writer.write_all(chunk).await?;
        writer.flush().await?;
        reader.consume(len);
        total += len as u64;
    }

    Ok(total)
}

/// One running pump task bound to a child output pipe
pub struct StreamPump {
    kind: StreamKind,
    handle: JoinHandle<io::Result<u64>>,
}

impl StreamPump {
    pub fn spawn<R, W>(kind: StreamKind, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(forward_stream(reader, writer));
        Self { kind, handle }
    }

    /// Wait for the pipe to reach EOF, but not past `deadline`; a pump still
    /// running then is aborted. Returns the bytes forwarded, if it finished.
    pub async fn drain_until(mut self, deadline: Instant) -> Option<u64> {
        match tokio::time::timeout_at(deadline, &mut self.handle).await {
            Ok(Ok(Ok(bytes))) => {
                debug!(stream = %self.kind, bytes = bytes, "Pump reached end of stream");
                Some(bytes)
            }
            Ok(Ok(Err(e))) => {
                warn!(stream = %self.kind, error = %e, "Pump stopped on I/O error");
                None
            }
            Ok(Err(e)) => {
                warn!(stream = %self.kind, error = %e, "Pump task failed");
                None
            }
            Err(_) => {
                warn!(stream = %self.kind, "Pipe still open after drain timeout, abandoning");
                self.handle.abort();
                None
            }
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}
