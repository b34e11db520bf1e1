use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use super::{ChunkStream, LlmError, StreamChunk};

/// Turns one provider's `data:` payloads into stream chunks.
pub(crate) trait EventParser: Send + 'static {
    fn on_data(&mut self, data: &str) -> Result<Vec<StreamChunk>, LlmError>;
    /// Called once when the byte stream ends, to flush anything still buffered.
    fn on_end(&mut self) -> Vec<StreamChunk>;
}

/// Splits a byte stream into server-sent-event `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a UTF-8 sequence split
/// across network chunks is decoded intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            payloads.extend(data_payload(&line[..pos]));
        }
        payloads
    }

    /// Drains a final line that arrived without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.to_string(),
        Err(_) => String::from_utf8_lossy(line).into_owned(),
    };
    let data = line.trim().strip_prefix("data:")?.trim_start();
    (!data.is_empty()).then(|| data.to_string())
}

struct State<P> {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    parser: P,
    pending: VecDeque<StreamChunk>,
    finished: bool,
}

pub(crate) fn chunk_stream<P: EventParser>(response: reqwest::Response, parser: P) -> ChunkStream {
    let bytes = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed();
    decode(bytes, parser)
}

pub(crate) fn decode<P: EventParser>(
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    parser: P,
) -> ChunkStream {
    let state = State {
        bytes,
        decoder: SseDecoder::default(),
        parser,
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    for data in state.decoder.push(&bytes) {
                        match state.parser.on_data(&data) {
                            Ok(chunks) => state.pending.extend(chunks),
                            Err(error) => {
                                state.finished = true;
                                return Some((Err(error), state));
                            }
                        }
                    }
                }
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Http(error)), state));
                }
                None => {
                    state.finished = true;
                    if let Some(data) = state.decoder.finish() {
                        match state.parser.on_data(&data) {
                            Ok(chunks) => state.pending.extend(chunks),
                            Err(error) => return Some((Err(error), state)),
                        }
                    }
                    let tail = state.parser.on_end();
                    state.pending.extend(tail);
                }
            }
        }
    })
    .boxed()
}
