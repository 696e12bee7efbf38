//! The supervisor's own standard streams

use runbound_host_api::BoxedWriter;
use tokio::io::{AsyncBufRead, BufReader};

pub type BoxedLineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Where relayed child I/O comes from and goes to
pub struct Console {
    pub input: BoxedLineReader,
    pub output: BoxedWriter,
    pub error: BoxedWriter,
}

impl Console {
    pub fn new(input: BoxedLineReader, output: BoxedWriter, error: BoxedWriter) -> Self {
        Self {
            input,
            output,
            error,
        }
    }

    /// The process's stdin, stdout and stderr.
    ///
    /// Reads from tokio's stdin block a pool thread that cannot be
    /// interrupted, so a runtime holding this console must be shut down in
    /// the background rather than dropped.
    pub fn process() -> Self {
        Self::new(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
            Box::new(tokio::io::stderr()),
        )
    }
}
