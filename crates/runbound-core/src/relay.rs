//! Console input forwarding

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Copy `input` to `sink` one line at a time, terminating every line with
/// `\n` and flushing after each.
///
/// Ends when `input` reaches EOF (the sink is shut down so the child sees
/// EOF too) or when the child has closed its end. Returns the number of
/// lines delivered.
pub async fn relay_lines<R, W>(mut input: R, mut sink: W) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    let mut lines = 0u64;

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            sink.shutdown().await.or_else(ignore_broken_pipe)?;
            return Ok(lines);
        }
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }

        let delivered = async {
            sink.write_all(&line).await?;
            sink.flush().await
        }
        .await;

        match delivered {
            Ok(()) => lines += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(lines = lines, "Child closed its stdin");
                return Ok(lines);
            }
            Err(e) => return Err(e),
        }
    }
}

fn ignore_broken_pipe(e: io::Error) -> io::Result<()> {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e)
    }
}

/// The standing task that feeds console input to the child.
///
/// It never decides on its own to stop while input keeps arriving; the
/// supervisor aborts it at shutdown. An in-flight console read is abandoned
/// rather than drained.
pub struct InputRelay {
    handle: JoinHandle<()>,
}

impl InputRelay {
    pub fn start<R, W>(input: R, sink: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match relay_lines(input, sink).await {
                Ok(lines) => debug!(lines = lines, "Input relay finished"),
                Err(e) => warn!(error = %e, "Input relay stopped on I/O error"),
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the relay without waiting for it
    pub fn abort(&self) {
        self.handle.abort();
    }
}
