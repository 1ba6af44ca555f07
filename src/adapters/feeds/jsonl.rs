//! JSON Lines Order Feed - Line-delimited Order Event Source
//!
//! Reads one `OrderEvent` per line from any async reader (stdin, a file,
//! a socket). Blank lines are ignored; lines that fail to decode are
//! logged and counted, never fatal, so one bad event cannot stall the
//! ledger.
//!
//! Line shape: `{"stream": "acct-1", "order": {"id": "...", "status": "open", ...}}`.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, warn};

use crate::ports::order_feed::{OrderEvent, OrderEventSource};

/// Order event source over a line-delimited JSON reader.
pub struct JsonlFeed<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> JsonlFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }
}

impl JsonlFeed<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Feed reading from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> OrderEventSource for JsonlFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_event(&mut self) -> anyhow::Result<Option<OrderEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<OrderEvent>(line) {
                Ok(event) => {
                    debug!(line = self.line_no, stream = %event.stream, "Order event read");
                    return Ok(Some(event));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        line = self.line_no,
                        error = %e,
                        "Skipping malformed order event"
                    );
                }
            }
        }
        Ok(None)
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}
