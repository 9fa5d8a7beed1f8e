//! Reassembles generated text from a chunked, newline-delimited event body.
//!
//! Chunk boundaries are arbitrary: a record (or a multi-byte character) may
//! be split across chunks, so bytes after the last newline are carried over.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio::sync::mpsc;

use super::cancel::CancellationToken;
use super::events::{StreamEvent, parse_record};
use crate::error::{AppError, Result};

#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and drain every complete line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// The unterminated fragment left at end of stream, if any.
    fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending);
        (!rest.trim().is_empty()).then(|| rest.into_owned())
    }
}

async fn next_chunk<S, B, E>(mut body: Pin<&mut S>, cancel: &CancellationToken) -> Result<Option<B>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    E: Into<AppError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::cancelled()),
        chunk = body.next() => chunk.transpose().map_err(Into::into),
    }
}

/// Lazily yield text deltas in arrival order.
///
/// The body is owned by the returned stream and dropped with it, whether it
/// ran to completion, failed, or was abandoned early.
pub fn deltas<S, B, E>(body: S, cancel: CancellationToken) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<AppError>,
{
    async_stream::try_stream! {
        let mut body = std::pin::pin!(body);
        let mut lines = LineBuffer::default();

        while let Some(chunk) = next_chunk(body.as_mut(), &cancel).await? {
            for line in lines.push(chunk.as_ref()) {
                if let Some(StreamEvent::TextDelta(delta)) = parse_record(&line) {
                    yield delta;
                }
            }
        }

        if let Some(rest) = lines.finish() {
            if let Some(StreamEvent::TextDelta(delta)) = parse_record(&rest) {
                yield delta;
            }
        }
    }
}

/// Fold the body into the full generated text.
///
/// When `progress` is given, the accumulated text is sent after every delta.
pub async fn consume<S, B, E>(
    body: S,
    progress: Option<&mpsc::UnboundedSender<String>>,
    cancel: &CancellationToken,
) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<AppError>,
{
    let deltas = deltas(body, cancel.clone());
    let mut deltas = std::pin::pin!(deltas);
    let mut result = String::new();

    while let Some(delta) = deltas.next().await {
        result.push_str(&delta?);
        if let Some(tx) = progress {
            // receiver may have gone away; the text is still returned
            let _ = tx.send(result.clone());
        }
    }

    Ok(result)
}
