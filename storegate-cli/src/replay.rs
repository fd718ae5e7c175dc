//! Feeding recorded events into the pipeline and printing what reaches the
//! store.

use std::io::Write;
use storegate_core::{Event, PipelineHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Store-apply function printing each event as one JSON line on stdout.
pub fn stdout_store(event: Event) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, &event)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Counts from a replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub dispatched: u64,
    pub skipped: u64,
}

/// Dispatch every JSON line of `input` in order.
///
/// Blank lines are ignored and lines that are not JSON objects are skipped
/// with a warning. An object without a `kind` is still dispatched; the
/// pipeline turns it into an `ERROR_OCCURRED` event.
pub async fn feed<R>(handle: &PipelineHandle, input: R) -> std::io::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut summary = ReplaySummary::default();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(event) => {
                debug!(line = line_no, kind = %event.kind, "Dispatching event");
                handle.dispatch(event).await;
                summary.dispatched += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed input line");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}
