//! JSON-lines encoding for the record-delimited transport.

use futures::Stream;
use futures_util::StreamExt;
use std::pin::Pin;

use crate::error::GeminiError;
use crate::types::events::{EventStream, StreamEvent};

/// Encode a single event as one JSON line, newline included.
pub fn encode_event(event: &StreamEvent) -> Result<String, GeminiError> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

/// Encode an event stream as a stream of JSON lines.
///
/// Serialization failure for one event drops that event with a log line
/// rather than corrupting the framing; the sentinel still terminates the
/// output because it serializes unconditionally.
pub fn encode_stream(events: EventStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(events.filter_map(|event| async move {
        match encode_event(&event) {
            Ok(line) => Some(line),
            Err(error) => {
                tracing::error!(%error, seq = event.seq, "failed to encode event, dropping");
                None
            }
        }
    }))
}
