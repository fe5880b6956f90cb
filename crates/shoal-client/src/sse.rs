//! Server-Sent Events decoding
//!
//! The coordinator frames every event as `data: <json>\n\n` with no `event:`
//! or `id:` fields. Network chunks split frames arbitrarily, so decoding
//! buffers bytes, cuts them into lines, and emits an `OperationEvent` each
//! time a blank line terminates a data frame.

use shoal_core::OperationEvent;
use tracing::debug;

#[derive(Default)]
pub(crate) struct EventBuffer {
    bytes: Vec<u8>,
    data: String,
}

impl EventBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk from the wire; returns every event completed by it, in
    /// arrival order. Unparseable frames are dropped, matching the reader's
    /// contract that correctness never depends on any single event.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<OperationEvent> {
        self.bytes.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.bytes.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.bytes.drain(..=pos).collect();
            let line = match std::str::from_utf8(&raw[..pos]) {
                Ok(line) => line.trim_end_matches('\r'),
                Err(e) => {
                    debug!(error = %e, "skipping non-utf8 line in event stream");
                    continue;
                }
            };

            if line.is_empty() {
                if !self.data.is_empty() {
                    match serde_json::from_str::<OperationEvent>(&self.data) {
                        Ok(event) => events.push(event),
                        Err(e) => debug!(error = %e, "skipping unparseable event"),
                    }
                    self.data.clear();
                }
            } else if let Some(payload) = line.strip_prefix("data: ") {
                self.data = payload.to_string();
            }
            // comments and other SSE fields are ignored
        }

        events
    }
}
